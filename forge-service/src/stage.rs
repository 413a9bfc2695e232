// Stage configuration
// Stage kinds, filename discipline, and the argument-vector builders
// that turn caller configuration into a tool invocation

use crate::message::{Artifact, RunRequest};
use crate::staging::staged_path;

use serde::{Deserialize, Serialize};

/// The five compilation stages and their tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// qbsp: .map geometry compile
    Geometry,
    /// light: lightmap computation over a compiled .bsp
    Lighting,
    /// vis: visibility computation over a compiled .bsp
    Visibility,
    /// bspinfo: read-only .bsp inspection, log output only
    Inspect,
    /// bsputil: .bsp editing with an explicit output name
    Edit,
}

impl StageKind {
    /// Conventional unit name for this stage's tool.
    pub fn unit_name(&self) -> &'static str {
        match self {
            StageKind::Geometry => "qbsp",
            StageKind::Lighting => "light",
            StageKind::Visibility => "vis",
            StageKind::Inspect => "bspinfo",
            StageKind::Edit => "bsputil",
        }
    }

    /// Input extensions recognized (and stripped) when deriving the
    /// output base name.
    pub fn input_extensions(&self) -> &'static [&'static str] {
        match self {
            StageKind::Geometry => &[".map"],
            StageKind::Lighting | StageKind::Visibility => &[".bsp", ".map"],
            StageKind::Inspect | StageKind::Edit => &[".bsp"],
        }
    }

    /// Fixed candidate extensions probed by the output collector
    /// after a successful run.
    pub fn output_extensions(&self) -> &'static [&'static str] {
        match self {
            StageKind::Geometry => &[".bsp", ".prt", ".pts", ".por"],
            StageKind::Lighting => &[".lit", ".bsp"],
            StageKind::Visibility => &[".vis", ".bsp", ".prt"],
            // Inspect emits log text only; Edit probes its declared
            // output name instead of a candidate set.
            StageKind::Inspect | StageKind::Edit => &[],
        }
    }

    /// Primary input name with its recognized extension stripped
    /// case-insensitively. Falls back to "output" for a degenerate
    /// name, as the tools do.
    pub fn base_name(&self, name: &str) -> String {
        let lower = name.to_lowercase();
        for ext in self.input_extensions() {
            if let Some(base) = lower.strip_suffix(ext) {
                if !base.is_empty() {
                    return base.to_string();
                }
            }
        }
        if lower.is_empty() {
            "output".to_string()
        } else {
            lower
        }
    }
}

/// Lowercase-normalize a filename before staging, so tools deriving
/// output names by extension replacement behave consistently
/// regardless of the input's original casing.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Caller configuration for the geometry (qbsp) stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryOptions {
    pub nofill: bool,
    pub noclip: bool,
    pub noskip: bool,
    pub onlyents: bool,
    pub verbose: bool,
    pub splitspecial: bool,
    pub transsky: bool,
    pub oldaxis: bool,
    pub bspleak: bool,
    pub oldleak: bool,
    pub bsp2: bool,
    pub leakdist: Option<u32>,
    pub subdivide: Option<u32>,
}

impl GeometryOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let flags = [
            (self.nofill, "nofill"),
            (self.noclip, "noclip"),
            (self.noskip, "noskip"),
            (self.onlyents, "onlyents"),
            (self.verbose, "verbose"),
            (self.splitspecial, "splitspecial"),
            (self.transsky, "transsky"),
            (self.oldaxis, "oldaxis"),
            (self.bspleak, "bspleak"),
            (self.oldleak, "oldleak"),
            (self.bsp2, "bsp2"),
        ];
        for (on, name) in flags {
            if on {
                args.push(format!("-{}", name));
            }
        }
        push_valued(&mut args, "leakdist", self.leakdist);
        push_valued(&mut args, "subdivide", self.subdivide);
        args
    }
}

/// Caller configuration for the lighting (light) stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingOptions {
    pub extra: bool,
    pub extra4: bool,
    pub addmin: bool,
    pub lit: bool,
    pub litonly: bool,
    pub threads: Option<u32>,
    pub dist: Option<f64>,
    pub range: Option<f64>,
    pub gate: Option<f64>,
    pub light: Option<f64>,
    pub soft: Option<f64>,
    pub anglescale: Option<f64>,
}

impl LightingOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let flags = [
            (self.extra, "extra"),
            (self.extra4, "extra4"),
            (self.addmin, "addmin"),
            (self.lit, "lit"),
            (self.litonly, "litonly"),
        ];
        for (on, name) in flags {
            if on {
                args.push(format!("-{}", name));
            }
        }
        push_valued(&mut args, "threads", self.threads);
        push_valued(&mut args, "dist", self.dist);
        push_valued(&mut args, "range", self.range);
        push_valued(&mut args, "gate", self.gate);
        push_valued(&mut args, "light", self.light);
        push_valued(&mut args, "soft", self.soft);
        push_valued(&mut args, "anglescale", self.anglescale);
        args
    }
}

/// Caller configuration for the visibility (vis) stage.
///
/// `debug` selects the alternate build variant and travels in the
/// `Init` mode flags, never in the argument vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityOptions {
    pub fast: bool,
    pub v: bool,
    pub vv: bool,
    pub level: Option<u32>,
    pub threads: Option<u32>,
    pub debug: bool,
}

impl VisibilityOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let flags = [(self.fast, "fast"), (self.v, "v"), (self.vv, "vv")];
        for (on, name) in flags {
            if on {
                args.push(format!("-{}", name));
            }
        }
        push_valued(&mut args, "level", self.level);
        push_valued(&mut args, "threads", self.threads);
        args
    }
}

/// Caller configuration for the inspection (bspinfo) stage: raw
/// single-dash flag names forwarded verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectOptions {
    pub flags: Vec<String>,
}

impl InspectOptions {
    pub fn to_args(&self) -> Vec<String> {
        self.flags.iter().map(|f| format!("-{}", f)).collect()
    }
}

/// Caller configuration for the editing (bsputil) stage. Uses
/// double-dash flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditOptions {
    pub info: bool,
    pub leak_check: bool,
    pub remove_lump: Option<String>,
    pub convert: Option<String>,
    /// Output filename; defaults to the input name.
    pub output_name: Option<String>,
}

impl EditOptions {
    /// Inspection-only operations produce no output file.
    pub fn is_inspect_only(&self) -> bool {
        self.info || self.leak_check
    }
}

fn push_valued<T: ToString>(args: &mut Vec<String>, name: &str, value: Option<T>) {
    if let Some(v) = value {
        args.push(format!("-{}", name));
        args.push(v.to_string());
    }
}

/// Build the run for a geometry compile: the .map plus any WAD files.
pub fn build_geometry_run(
    map_name: &str,
    map_bytes: Vec<u8>,
    wads: Vec<Artifact>,
    opts: &GeometryOptions,
) -> RunRequest {
    let name = normalize_name(map_name);
    let mut args = opts.to_args();
    if !wads.is_empty() {
        args.push("-wadpath".to_string());
        args.push(crate::staging::WORKING_DIR.to_string());
        args.push("-override_wad".to_string());
        args.push(
            wads.iter()
                .map(|w| w.name.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        );
    }
    args.push(staged_path(&name));
    RunRequest::new(name, map_bytes).with_aux(wads).with_args(args)
}

/// Build the run for a lighting pass over a compiled .bsp.
pub fn build_lighting_run(
    bsp_name: &str,
    bsp_bytes: Vec<u8>,
    opts: &LightingOptions,
) -> RunRequest {
    let name = normalize_name(bsp_name);
    let mut args = opts.to_args();
    args.push(staged_path(&name));
    RunRequest::new(name, bsp_bytes).with_args(args)
}

/// Build the run for a visibility pass, with an optional portal file
/// staged alongside the .bsp.
pub fn build_visibility_run(
    bsp_name: &str,
    bsp_bytes: Vec<u8>,
    prt: Option<Artifact>,
    opts: &VisibilityOptions,
) -> RunRequest {
    let name = normalize_name(bsp_name);
    let mut args = opts.to_args();
    args.push(staged_path(&name));
    let mut request = RunRequest::new(name, bsp_bytes).with_args(args);
    if let Some(prt) = prt {
        request = request.with_aux(vec![Artifact::new(
            normalize_name(&prt.name),
            prt.bytes,
        )]);
    }
    request
}

/// Build the run for a read-only inspection of a .bsp.
pub fn build_inspect_run(
    bsp_name: &str,
    bsp_bytes: Vec<u8>,
    opts: &InspectOptions,
) -> RunRequest {
    let name = normalize_name(bsp_name);
    let mut args = opts.to_args();
    args.push(staged_path(&name));
    RunRequest::new(name, bsp_bytes).with_args(args)
}

/// Build the run for a bsputil edit. Unless the operation is
/// inspection-only, an `--out <path>` pair is prepended and the output
/// name is declared for collection.
pub fn build_edit_run(
    bsp_name: &str,
    bsp_bytes: Vec<u8>,
    merge: Option<Artifact>,
    opts: &EditOptions,
) -> RunRequest {
    let name = normalize_name(bsp_name);
    let mut args = Vec::new();
    if opts.info {
        args.push("--info".to_string());
    }
    if opts.leak_check {
        args.push("--leak-check".to_string());
    }
    if let Some(lump) = &opts.remove_lump {
        args.push("--remove-lump".to_string());
        args.push(lump.clone());
    }
    if let Some(format) = &opts.convert {
        args.push("--convert".to_string());
        args.push(format.clone());
    }

    let merge = merge.map(|m| Artifact::new(normalize_name(&m.name), m.bytes));
    if let Some(m) = &merge {
        args.push("--merge".to_string());
        args.push(staged_path(&m.name));
    }

    let mut declared = None;
    if !opts.is_inspect_only() {
        let out = opts
            .output_name
            .as_deref()
            .map(normalize_name)
            .unwrap_or_else(|| name.clone());
        args.splice(0..0, ["--out".to_string(), staged_path(&out)]);
        declared = Some(out);
    }
    args.push(staged_path(&name));

    let mut request = RunRequest::new(name, bsp_bytes).with_args(args);
    if let Some(m) = merge {
        request = request.with_secondary(m);
    }
    if let Some(out) = declared {
        request = request.with_declared_output(out);
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_strips_extension_case_insensitively() {
        assert_eq!(StageKind::Geometry.base_name("E1M1.MAP"), "e1m1");
        assert_eq!(StageKind::Lighting.base_name("e1m1.bsp"), "e1m1");
        assert_eq!(StageKind::Visibility.base_name("start.map"), "start");
        // No recognized extension: lowercased name as-is.
        assert_eq!(StageKind::Geometry.base_name("readme.txt"), "readme.txt");
        assert_eq!(StageKind::Geometry.base_name(""), "output");
    }

    #[test]
    fn test_geometry_args_with_wads() {
        let opts = GeometryOptions {
            nofill: true,
            leakdist: Some(2000),
            ..Default::default()
        };
        let run = build_geometry_run(
            "E1M1.MAP",
            vec![1],
            vec![Artifact::new("base.wad", vec![2])],
            &opts,
        );

        assert_eq!(run.primary_name, "e1m1.map");
        assert_eq!(
            run.args,
            vec![
                "-nofill",
                "-leakdist",
                "2000",
                "-wadpath",
                "/working",
                "-override_wad",
                "base.wad",
                "/working/e1m1.map",
            ]
        );
    }

    #[test]
    fn test_lighting_args() {
        let opts = LightingOptions {
            extra: true,
            lit: true,
            threads: Some(4),
            anglescale: Some(0.5),
            ..Default::default()
        };
        let run = build_lighting_run("e1m1.bsp", Vec::new(), &opts);

        assert_eq!(
            run.args,
            vec![
                "-extra",
                "-lit",
                "-threads",
                "4",
                "-anglescale",
                "0.5",
                "/working/e1m1.bsp",
            ]
        );
    }

    #[test]
    fn test_visibility_args_exclude_debug() {
        let opts = VisibilityOptions {
            fast: true,
            level: Some(4),
            debug: true,
            ..Default::default()
        };
        let run = build_visibility_run(
            "e1m1.bsp",
            Vec::new(),
            Some(Artifact::new("E1M1.PRT", vec![9])),
            &opts,
        );

        // The debug mode flag travels in Init, never as an argument.
        assert_eq!(
            run.args,
            vec!["-fast", "-level", "4", "/working/e1m1.bsp"]
        );
        assert_eq!(run.aux_files[0].name, "e1m1.prt");
    }

    #[test]
    fn test_edit_run_prepends_out_pair() {
        let opts = EditOptions {
            remove_lump: Some("LIGHTING".to_string()),
            output_name: Some("stripped.bsp".to_string()),
            ..Default::default()
        };
        let run = build_edit_run("e1m1.bsp", Vec::new(), None, &opts);

        assert_eq!(
            run.args,
            vec![
                "--out",
                "/working/stripped.bsp",
                "--remove-lump",
                "LIGHTING",
                "/working/e1m1.bsp",
            ]
        );
        assert_eq!(run.declared_output.as_deref(), Some("stripped.bsp"));
    }

    #[test]
    fn test_edit_run_inspect_only_declares_nothing() {
        let opts = EditOptions {
            info: true,
            ..Default::default()
        };
        let run = build_edit_run("e1m1.bsp", Vec::new(), None, &opts);

        assert_eq!(run.args, vec!["--info", "/working/e1m1.bsp"]);
        assert!(run.declared_output.is_none());
    }

    #[test]
    fn test_edit_run_with_merge() {
        let opts = EditOptions::default();
        let run = build_edit_run(
            "a.bsp",
            Vec::new(),
            Some(Artifact::new("B.BSP", vec![7])),
            &opts,
        );

        assert_eq!(
            run.args,
            vec![
                "--out",
                "/working/a.bsp",
                "--merge",
                "/working/b.bsp",
                "/working/a.bsp",
            ]
        );
        assert_eq!(run.secondary.as_ref().unwrap().name, "b.bsp");
    }
}
