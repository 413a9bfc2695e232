// Message Protocol
// The tagged-message vocabulary exchanged between the controller and
// its execution units, plus the caller-facing log stream

use tokio::sync::mpsc;

/// A named byte buffer produced or consumed by a unit. Ownership of
/// the bytes travels with the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Mode flags carried by an `Init` request. The visibility tool is
/// re-initialized with `debug` toggled between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub debug: bool,
}

impl InitOptions {
    pub fn debug() -> Self {
        Self { debug: true }
    }
}

/// Everything a unit needs to perform one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Primary input filename, staged under `/working`.
    pub primary_name: String,
    /// Primary input contents.
    pub primary_bytes: Vec<u8>,
    /// Auxiliary inputs staged alongside the primary (WAD files for
    /// the geometry stage, the portal file for visibility).
    pub aux_files: Vec<Artifact>,
    /// Second named input for merge-style operations.
    pub secondary: Option<Artifact>,
    /// Argument vector handed to the tool. The final positional is
    /// the staged primary path.
    pub args: Vec<String>,
    /// Probe exactly this output name instead of the stage's fixed
    /// candidate set.
    pub declared_output: Option<String>,
}

impl RunRequest {
    pub fn new(primary_name: impl Into<String>, primary_bytes: Vec<u8>) -> Self {
        Self {
            primary_name: primary_name.into(),
            primary_bytes,
            ..Default::default()
        }
    }

    pub fn with_aux(mut self, aux: Vec<Artifact>) -> Self {
        self.aux_files = aux;
        self
    }

    pub fn with_secondary(mut self, secondary: Artifact) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_declared_output(mut self, name: impl Into<String>) -> Self {
        self.declared_output = Some(name.into());
        self
    }
}

/// Requests the controller sends to a unit.
#[derive(Debug, Clone)]
pub enum ToolRequest {
    /// (Re)initialize the tool. A fresh `Inited` follows on success.
    Init(InitOptions),
    /// Execute one run. Terminated by exactly one `Done` or
    /// `Exception`.
    Run(RunRequest),
}

/// Events a unit sends back to the controller.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    /// The tool acknowledged initialization and will accept runs.
    Inited,
    /// One line of tool output.
    Log(String),
    /// One line of tool error output.
    Err(String),
    /// Sorted listing of the staging directory, emitted after staging
    /// and before execution. Diagnostic only.
    RunAck { files: Vec<String> },
    /// All artifacts discovered for this run, batched. At most one
    /// per run, always before `Done`.
    Outputs { artifacts: Vec<Artifact> },
    /// Terminal success.
    Done,
    /// Terminal failure.
    Exception {
        description: String,
        errno: Option<i32>,
    },
}

/// Envelope on the controller's single inbound channel, tagging each
/// event with the unit that sent it.
#[derive(Debug, Clone)]
pub struct UnitEvent {
    pub unit: String,
    pub event: ToolEvent,
}

/// Sender half of the unit→controller channel
pub type UnitEventSender = mpsc::UnboundedSender<UnitEvent>;

/// Receiver half of the unit→controller channel
pub type UnitEventReceiver = mpsc::UnboundedReceiver<UnitEvent>;

/// Create the unit→controller event channel
pub fn unit_event_channel() -> (UnitEventSender, UnitEventReceiver) {
    mpsc::unbounded_channel()
}

/// One line of the caller-facing log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub unit: String,
    pub text: String,
    pub is_err: bool,
}

/// Sender for caller-facing log lines
pub type LogSender = mpsc::UnboundedSender<LogLine>;

/// Receiver for caller-facing log lines
pub type LogReceiver = mpsc::UnboundedReceiver<LogLine>;

/// Create a caller-facing log channel
pub fn log_channel() -> (LogSender, LogReceiver) {
    mpsc::unbounded_channel()
}

/// Helper trait for forwarding log lines, ignoring errors
/// (fire-and-forget)
pub trait LogSink {
    fn log_line(&self, unit: &str, text: impl Into<String>, is_err: bool);
}

impl LogSink for Option<LogSender> {
    fn log_line(&self, unit: &str, text: impl Into<String>, is_err: bool) {
        if let Some(sender) = self {
            let _ = sender.send(LogLine {
                unit: unit.to_string(),
                text: text.into(),
                is_err,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unit_event_channel_preserves_order() {
        let (tx, mut rx) = unit_event_channel();

        tx.send(UnitEvent {
            unit: "qbsp".to_string(),
            event: ToolEvent::Log("one".to_string()),
        })
        .unwrap();
        tx.send(UnitEvent {
            unit: "qbsp".to_string(),
            event: ToolEvent::Done,
        })
        .unwrap();

        assert!(matches!(rx.recv().await.unwrap().event, ToolEvent::Log(_)));
        assert!(matches!(rx.recv().await.unwrap().event, ToolEvent::Done));
    }

    #[test]
    fn test_run_request_builder() {
        let req = RunRequest::new("e1m1.map", vec![1])
            .with_aux(vec![Artifact::new("base.wad", vec![2])])
            .with_args(vec!["-verbose".to_string()]);

        assert_eq!(req.primary_name, "e1m1.map");
        assert_eq!(req.aux_files.len(), 1);
        assert!(req.secondary.is_none());
    }

    #[test]
    fn test_optional_log_sink() {
        let sink: Option<LogSender> = None;
        // Should not panic
        sink.log_line("qbsp", "hello", false);
    }
}
