// Forge Service Library
// Message-driven orchestration of the map-compilation toolchain

pub mod chain;
pub mod collect;
pub mod controller;
pub mod error;
pub mod message;
pub mod readiness;
pub mod stage;
pub mod staging;
pub mod tool;
pub mod tools;
pub mod unit;
pub mod vfs;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export protocol types
pub use message::{
    log_channel, unit_event_channel, Artifact, InitOptions, LogLine, LogReceiver, LogSender,
    LogSink, RunRequest, ToolEvent, ToolRequest, UnitEvent, UnitEventReceiver, UnitEventSender,
};

// Re-export stage configuration and builders
pub use stage::{
    build_edit_run, build_geometry_run, build_inspect_run, build_lighting_run,
    build_visibility_run, normalize_name, EditOptions, GeometryOptions, InspectOptions,
    LightingOptions, StageKind, VisibilityOptions,
};

// Re-export orchestration types
pub use chain::{CallerInput, ChainPhase, ChainPlan, ChainState, ChainStep, PipelineOutcome};
pub use controller::Controller;
pub use readiness::ReadinessTracker;
pub use tool::{Tool, ToolError, ToolIo};
pub use tools::ProcessTool;
pub use unit::ToolUnit;
pub use vfs::{VfsError, VirtualFs};
