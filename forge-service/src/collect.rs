// Output Collector
// Heuristic discovery of produced artifacts after a successful run

use crate::message::{Artifact, RunRequest};
use crate::stage::StageKind;
use crate::staging::staged_path;
use crate::vfs::VirtualFs;

/// Probe the staging directory for this run's outputs.
///
/// With a declared output name, exactly that one path is probed.
/// Otherwise the stage's fixed candidate set is tried: the primary
/// input's base name crossed with the stage's expected output
/// extensions. Bytes of every hit are moved out of the filesystem into
/// the returned artifacts; an empty result is not an error.
pub fn collect_outputs(fs: &mut VirtualFs, kind: StageKind, run: &RunRequest) -> Vec<Artifact> {
    if let Some(out) = &run.declared_output {
        return match fs.take(&staged_path(out)) {
            Ok(bytes) => vec![Artifact::new(out.clone(), bytes)],
            Err(_) => Vec::new(),
        };
    }

    let base = kind.base_name(&run.primary_name);
    let mut artifacts = Vec::new();
    for ext in kind.output_extensions() {
        let name = format!("{}{}", base, ext);
        if let Ok(bytes) = fs.take(&staged_path(&name)) {
            artifacts.push(Artifact::new(name, bytes));
        }
    }
    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::WORKING_DIR;

    fn fs_with(files: &[(&str, &[u8])]) -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.mkdir(WORKING_DIR).unwrap();
        for (name, bytes) in files {
            fs.write(&staged_path(name), bytes.to_vec()).unwrap();
        }
        fs
    }

    #[test]
    fn test_geometry_probe_collects_only_existing_candidates() {
        let mut fs = fs_with(&[
            ("test.map", b"source"),
            ("test.bsp", b"compiled"),
            ("unrelated.bsp", b"other"),
        ]);
        let run = RunRequest::new("test.map", Vec::new());

        let artifacts = collect_outputs(&mut fs, StageKind::Geometry, &run);

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "test.bsp");
        assert_eq!(artifacts[0].bytes, b"compiled");
        // Bytes moved out of the unit's filesystem.
        assert!(!fs.exists("/working/test.bsp"));
        assert!(fs.exists("/working/unrelated.bsp"));
    }

    #[test]
    fn test_zero_candidates_is_not_an_error() {
        let mut fs = fs_with(&[("test.map", b"source")]);
        let run = RunRequest::new("test.map", Vec::new());

        assert!(collect_outputs(&mut fs, StageKind::Geometry, &run).is_empty());
    }

    #[test]
    fn test_visibility_probe_order() {
        let mut fs = fs_with(&[
            ("e1m1.bsp", b"bsp"),
            ("e1m1.vis", b"vis"),
            ("e1m1.prt", b"prt"),
        ]);
        let run = RunRequest::new("e1m1.bsp", Vec::new());

        let names: Vec<_> = collect_outputs(&mut fs, StageKind::Visibility, &run)
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["e1m1.vis", "e1m1.bsp", "e1m1.prt"]);
    }

    #[test]
    fn test_declared_output_probes_exactly_one_path() {
        let mut fs = fs_with(&[("stripped.bsp", b"out"), ("e1m1.bsp", b"in")]);
        let run =
            RunRequest::new("e1m1.bsp", Vec::new()).with_declared_output("stripped.bsp");

        let artifacts = collect_outputs(&mut fs, StageKind::Edit, &run);

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "stripped.bsp");
    }

    #[test]
    fn test_inspect_collects_nothing() {
        let mut fs = fs_with(&[("e1m1.bsp", b"in")]);
        let run = RunRequest::new("e1m1.bsp", Vec::new());

        assert!(collect_outputs(&mut fs, StageKind::Inspect, &run).is_empty());
    }
}
