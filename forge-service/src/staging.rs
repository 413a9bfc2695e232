// Virtual Filesystem Stager
// Clears and repopulates a unit's staging directory at the start of
// every run

use crate::message::RunRequest;
use crate::tool::ToolIo;
use crate::vfs::{VfsError, VirtualFs};

use tracing::warn;

/// The well-known staging directory every unit reads its inputs from
/// and writes its outputs to. Never nested, never shared across units.
pub const WORKING_DIR: &str = "/working";

/// Path of a staged file inside the working directory.
pub fn staged_path(name: &str) -> String {
    format!("{}/{}", WORKING_DIR, name)
}

/// Stage a run's inputs, returning the sorted listing of the resulting
/// directory for the `RunAck`.
///
/// Removal of leftover entries and writes of auxiliary inputs are
/// best-effort: failures are logged (auxiliary write failures also go
/// to the caller's error stream) and staging continues. Only a
/// primary-input write failure is fatal. Input byte buffers are moved
/// out of the request; after staging, the unit's filesystem owns them.
pub fn stage_inputs(
    fs: &mut VirtualFs,
    run: &mut RunRequest,
    io: &ToolIo,
) -> Result<Vec<String>, VfsError> {
    // Tear the directory down entry by entry, then rebuild it, so two
    // consecutive runs never see each other's files.
    if fs.exists(WORKING_DIR) {
        match fs.read_dir(WORKING_DIR) {
            Ok(entries) => {
                for entry in entries {
                    let path = staged_path(&entry);
                    let removed = if fs.is_dir(&path) {
                        fs.remove_dir_all(&path)
                    } else {
                        fs.remove_file(&path)
                    };
                    if let Err(e) = removed {
                        warn!(entry = %entry, error = %e, "failed to remove staged entry");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to list staging directory"),
        }
        if let Err(e) = fs.rmdir(WORKING_DIR) {
            warn!(error = %e, "failed to remove staging directory");
        }
    }
    if let Err(e) = fs.mkdir(WORKING_DIR) {
        // Leftover directory from a failed teardown; reuse it.
        warn!(error = %e, "failed to recreate staging directory");
    }

    let primary = std::mem::take(&mut run.primary_bytes);
    fs.write(&staged_path(&run.primary_name), primary)?;

    for aux in run.aux_files.drain(..) {
        if let Err(e) = fs.write(&staged_path(&aux.name), aux.bytes) {
            io.print_err(format!("failed to write {}: {}", aux.name, e));
        }
    }
    if let Some(secondary) = run.secondary.take() {
        if let Err(e) = fs.write(&staged_path(&secondary.name), secondary.bytes) {
            io.print_err(format!("failed to write {}: {}", secondary.name, e));
        }
    }

    fs.read_dir(WORKING_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{unit_event_channel, Artifact, RunRequest};

    fn test_io() -> ToolIo {
        let (tx, _rx) = unit_event_channel();
        ToolIo::new("test", tx)
    }

    #[test]
    fn test_staging_writes_all_inputs() {
        let mut fs = VirtualFs::new();
        let mut run = RunRequest::new("e1m1.map", b"map".to_vec())
            .with_aux(vec![Artifact::new("base.wad", b"wad".to_vec())])
            .with_secondary(Artifact::new("other.bsp", b"bsp".to_vec()));

        let listing = stage_inputs(&mut fs, &mut run, &test_io()).unwrap();

        assert_eq!(listing, vec!["base.wad", "e1m1.map", "other.bsp"]);
        assert_eq!(fs.read("/working/e1m1.map").unwrap(), b"map");
        // Buffers were moved out of the request.
        assert!(run.primary_bytes.is_empty());
        assert!(run.aux_files.is_empty());
        assert!(run.secondary.is_none());
    }

    #[test]
    fn test_staging_is_idempotent() {
        let mut fs = VirtualFs::new();
        let mut first = RunRequest::new("e1m1.map", b"one".to_vec())
            .with_aux(vec![Artifact::new("base.wad", b"wad".to_vec())]);
        stage_inputs(&mut fs, &mut first, &test_io()).unwrap();

        // Simulate tool output left behind by the first run.
        fs.write("/working/e1m1.bsp", b"compiled".to_vec()).unwrap();

        let mut second = RunRequest::new("e1m2.map", b"two".to_vec());
        let listing = stage_inputs(&mut fs, &mut second, &test_io()).unwrap();

        // Exactly the second run's inputs, nothing left over.
        assert_eq!(listing, vec!["e1m2.map"]);
        assert!(!fs.exists("/working/e1m1.map"));
        assert!(!fs.exists("/working/e1m1.bsp"));
        assert!(!fs.exists("/working/base.wad"));
    }

    #[test]
    fn test_teardown_removes_leftover_subdirectories() {
        let mut fs = VirtualFs::new();
        let mut first = RunRequest::new("e1m1.map", b"one".to_vec());
        stage_inputs(&mut fs, &mut first, &test_io()).unwrap();

        // A tool that scribbles a scratch directory into the staging
        // area must not leak it into the next run.
        fs.mkdir("/working/scratch").unwrap();
        fs.write("/working/scratch/part.tmp", Vec::new()).unwrap();

        let mut second = RunRequest::new("e1m2.map", b"two".to_vec());
        let listing = stage_inputs(&mut fs, &mut second, &test_io()).unwrap();

        assert_eq!(listing, vec!["e1m2.map"]);
        assert!(!fs.exists("/working/scratch"));
        assert!(!fs.exists("/working/scratch/part.tmp"));
    }
}
