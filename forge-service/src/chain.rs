// Compilation Chain
// The sequential pipeline plan and its state machine

use crate::error::{ServiceError, ServiceResult};
use crate::message::{Artifact, InitOptions, RunRequest};
use crate::stage::{
    normalize_name, GeometryOptions, LightingOptions, StageKind, VisibilityOptions,
};
use crate::staging::{staged_path, WORKING_DIR};

use std::collections::HashMap;

use tracing::debug;

/// Extensions of the artifacts delivered when a chain completes.
/// Intermediates outside this list stay in memory but are not handed
/// to the caller.
pub const FINAL_EXTENSIONS: [&str; 4] = [".bsp", ".prt", ".lit", ".vis"];

/// Where a chain step's state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPhase {
    Idle,
    /// Executing step `i` (1-based).
    Step(usize),
    Aborted,
    Completed,
}

/// Chain-scoped state: the current phase plus every artifact any step
/// has produced so far, keyed by name (later artifacts with the same
/// name overwrite earlier ones).
///
/// Owned by the pipeline run that created it and discarded with it,
/// never a process-wide singleton: a stray message from an unrelated
/// run has nothing to mutate.
#[derive(Debug)]
pub struct ChainState {
    pub phase: ChainPhase,
    artifacts: HashMap<String, Artifact>,
}

impl ChainState {
    pub fn new() -> Self {
        Self {
            phase: ChainPhase::Idle,
            artifacts: HashMap::new(),
        }
    }

    pub fn enter_step(&mut self, index: usize) {
        debug!(step = index, "chain advancing");
        self.phase = ChainPhase::Step(index);
    }

    pub fn abort(&mut self) {
        debug!("chain aborted");
        self.phase = ChainPhase::Aborted;
        // No partial resume: a retry starts clean.
        self.artifacts.clear();
    }

    /// Merge one `Outputs` batch into the accumulated mapping.
    pub fn absorb(&mut self, artifacts: Vec<Artifact>) {
        for artifact in artifacts {
            self.artifacts.insert(artifact.name.clone(), artifact);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Mark the chain complete and extract the deliverable subset:
    /// `<base><ext>` for each terminal extension that was produced.
    pub fn complete(&mut self, base: &str) -> Vec<Artifact> {
        debug!("chain completed");
        self.phase = ChainPhase::Completed;
        FINAL_EXTENSIONS
            .iter()
            .filter_map(|ext| self.artifacts.remove(&format!("{}{}", base, ext)))
            .collect()
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a step's input comes from.
#[derive(Debug, Clone)]
pub enum StepInput {
    /// The caller's original input (first step only).
    Caller,
    /// An accumulated artifact named `<base><ext>`.
    Artifact { ext: &'static str, required: bool },
}

/// One step of a chain: which unit to run, with which flags, fed from
/// which inputs.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub kind: StageKind,
    pub unit: String,
    /// Flag arguments; the staged primary path is appended as the
    /// final positional when the request is built.
    pub flags: Vec<String>,
    pub primary: StepInput,
    pub aux: Vec<StepInput>,
    /// Re-send `Init` with these mode flags before this step's run.
    pub reinit: Option<InitOptions>,
}

impl ChainStep {
    /// Resolve this step's inputs against the caller input and the
    /// accumulated artifacts, producing its `RunRequest`. A missing
    /// required artifact is the chain's abort case.
    pub fn build_request(
        &self,
        base: &str,
        caller: &mut Option<CallerInput>,
        state: &ChainState,
    ) -> ServiceResult<RunRequest> {
        let (primary, mut aux) = match &self.primary {
            StepInput::Caller => {
                let input = caller.take().ok_or(ServiceError::MissingInput)?;
                (
                    Artifact::new(normalize_name(&input.name), input.bytes),
                    input.aux,
                )
            }
            StepInput::Artifact { ext, .. } => {
                let name = format!("{}{}", base, ext);
                let artifact = state
                    .get(&name)
                    .cloned()
                    .ok_or(ServiceError::MissingArtifact(name))?;
                (artifact, Vec::new())
            }
        };

        for source in &self.aux {
            if let StepInput::Artifact { ext, required } = source {
                let name = format!("{}{}", base, ext);
                match state.get(&name) {
                    Some(artifact) => aux.push(artifact.clone()),
                    None if *required => {
                        return Err(ServiceError::MissingArtifact(name));
                    }
                    None => {}
                }
            }
        }

        let mut args = self.flags.clone();
        args.push(staged_path(&primary.name));

        Ok(RunRequest::new(primary.name, primary.bytes)
            .with_aux(aux)
            .with_args(args))
    }
}

/// The caller's input to a pipeline run.
#[derive(Debug, Clone)]
pub struct CallerInput {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Auxiliary files staged with the first step (WADs).
    pub aux: Vec<Artifact>,
}

/// Artifacts delivered by a completed pipeline.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub artifacts: Vec<Artifact>,
}

/// An ordered list of chain steps.
#[derive(Debug, Clone)]
pub struct ChainPlan {
    pub steps: Vec<ChainStep>,
}

impl ChainPlan {
    /// The classic full compile: geometry → lighting → visibility.
    /// Lighting requires the compiled `.bsp`; visibility requires the
    /// (re-lit) `.bsp` and takes the portal file when present, after
    /// re-initializing its unit with the configured debug variant.
    pub fn classic(
        input: &CallerInput,
        geometry: &GeometryOptions,
        lighting: &LightingOptions,
        visibility: &VisibilityOptions,
    ) -> Self {
        let mut geometry_flags = geometry.to_args();
        if !input.aux.is_empty() {
            geometry_flags.push("-wadpath".to_string());
            geometry_flags.push(WORKING_DIR.to_string());
            geometry_flags.push("-override_wad".to_string());
            geometry_flags.push(
                input
                    .aux
                    .iter()
                    .map(|w| w.name.as_str())
                    .collect::<Vec<_>>()
                    .join(";"),
            );
        }

        Self {
            steps: vec![
                ChainStep {
                    kind: StageKind::Geometry,
                    unit: StageKind::Geometry.unit_name().to_string(),
                    flags: geometry_flags,
                    primary: StepInput::Caller,
                    aux: Vec::new(),
                    reinit: None,
                },
                ChainStep {
                    kind: StageKind::Lighting,
                    unit: StageKind::Lighting.unit_name().to_string(),
                    flags: lighting.to_args(),
                    primary: StepInput::Artifact {
                        ext: ".bsp",
                        required: true,
                    },
                    aux: Vec::new(),
                    reinit: None,
                },
                ChainStep {
                    kind: StageKind::Visibility,
                    unit: StageKind::Visibility.unit_name().to_string(),
                    flags: visibility.to_args(),
                    primary: StepInput::Artifact {
                        ext: ".bsp",
                        required: true,
                    },
                    aux: vec![StepInput::Artifact {
                        ext: ".prt",
                        required: false,
                    }],
                    reinit: Some(InitOptions {
                        debug: visibility.debug,
                    }),
                },
            ],
        }
    }

    /// Unit names participating in this plan, for the readiness gate.
    pub fn participants(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.unit.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CallerInput {
        CallerInput {
            name: "E1M1.MAP".to_string(),
            bytes: b"map".to_vec(),
            aux: Vec::new(),
        }
    }

    #[test]
    fn test_classic_plan_shape() {
        let plan = ChainPlan::classic(
            &input(),
            &GeometryOptions::default(),
            &LightingOptions::default(),
            &VisibilityOptions::default(),
        );

        assert_eq!(plan.participants(), vec!["qbsp", "light", "vis"]);
        assert!(plan.steps[0].reinit.is_none());
        assert!(plan.steps[2].reinit.is_some());
    }

    #[test]
    fn test_first_step_takes_caller_input() {
        let plan = ChainPlan::classic(
            &input(),
            &GeometryOptions::default(),
            &LightingOptions::default(),
            &VisibilityOptions::default(),
        );
        let state = ChainState::new();
        let mut caller = Some(input());

        let request = plan.steps[0]
            .build_request("e1m1", &mut caller, &state)
            .unwrap();

        assert_eq!(request.primary_name, "e1m1.map");
        assert_eq!(request.args.last().unwrap(), "/working/e1m1.map");
        assert!(caller.is_none());
    }

    #[test]
    fn test_missing_required_artifact_aborts_resolution() {
        let plan = ChainPlan::classic(
            &input(),
            &GeometryOptions::default(),
            &LightingOptions::default(),
            &VisibilityOptions::default(),
        );
        let state = ChainState::new();
        let mut caller = None;

        let err = plan.steps[1]
            .build_request("e1m1", &mut caller, &state)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::MissingArtifact(name) if name == "e1m1.bsp"
        ));
    }

    #[test]
    fn test_optional_aux_artifact_is_skipped_when_absent() {
        let plan = ChainPlan::classic(
            &input(),
            &GeometryOptions::default(),
            &LightingOptions::default(),
            &VisibilityOptions::default(),
        );
        let mut state = ChainState::new();
        state.absorb(vec![Artifact::new("e1m1.bsp", b"bsp".to_vec())]);
        let mut caller = None;

        let request = plan.steps[2]
            .build_request("e1m1", &mut caller, &state)
            .unwrap();
        assert!(request.aux_files.is_empty());

        state.absorb(vec![Artifact::new("e1m1.prt", b"prt".to_vec())]);
        let request = plan.steps[2]
            .build_request("e1m1", &mut caller, &state)
            .unwrap();
        assert_eq!(request.aux_files[0].name, "e1m1.prt");
    }

    #[test]
    fn test_later_artifact_overwrites_earlier() {
        let mut state = ChainState::new();
        state.absorb(vec![Artifact::new("e1m1.bsp", b"v1".to_vec())]);
        state.absorb(vec![Artifact::new("e1m1.bsp", b"v2".to_vec())]);

        assert_eq!(state.get("e1m1.bsp").unwrap().bytes, b"v2");
    }

    #[test]
    fn test_complete_filters_to_terminal_extensions() {
        let mut state = ChainState::new();
        state.absorb(vec![
            Artifact::new("e1m1.bsp", b"bsp".to_vec()),
            Artifact::new("e1m1.prt", b"prt".to_vec()),
            Artifact::new("e1m1.pts", b"pts".to_vec()),
            Artifact::new("e1m1.vis", b"vis".to_vec()),
        ]);

        let names: Vec<_> = state
            .complete("e1m1")
            .into_iter()
            .map(|a| a.name)
            .collect();
        // .pts is an intermediate, retained but not delivered.
        assert_eq!(names, vec!["e1m1.bsp", "e1m1.prt", "e1m1.vis"]);
        assert_eq!(state.phase, ChainPhase::Completed);
    }

    #[test]
    fn test_abort_discards_accumulated_artifacts() {
        let mut state = ChainState::new();
        state.enter_step(1);
        state.absorb(vec![Artifact::new("e1m1.bsp", b"bsp".to_vec())]);

        state.abort();

        assert_eq!(state.phase, ChainPhase::Aborted);
        assert!(state.get("e1m1.bsp").is_none());
    }
}
