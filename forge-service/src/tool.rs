// Tool seam
// The black-box boundary between the unit runtime and the actual
// compilation tool it hosts

use crate::message::{InitOptions, ToolEvent, UnitEvent, UnitEventSender};
use crate::vfs::VirtualFs;

use std::fmt;

/// Failure raised by a tool invocation. Always terminal for the run.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub description: String,
    pub errno: Option<i32>,
}

impl ToolError {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            errno: None,
        }
    }

    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)?;
        if let Some(errno) = self.errno {
            write!(f, " (errno {})", errno)?;
        }
        Ok(())
    }
}

impl std::error::Error for ToolError {}

/// Forwards a tool's stdout/stderr lines to the controller as `Log` /
/// `Err` protocol events.
#[derive(Clone)]
pub struct ToolIo {
    unit: String,
    tx: UnitEventSender,
}

impl ToolIo {
    pub fn new(unit: impl Into<String>, tx: UnitEventSender) -> Self {
        Self {
            unit: unit.into(),
            tx,
        }
    }

    pub fn print(&self, text: impl Into<String>) {
        self.emit(ToolEvent::Log(text.into()));
    }

    pub fn print_err(&self, text: impl Into<String>) {
        self.emit(ToolEvent::Err(text.into()));
    }

    fn emit(&self, event: ToolEvent) {
        let _ = self.tx.send(UnitEvent {
            unit: self.unit.clone(),
            event,
        });
    }
}

/// A compilation tool hosted by an execution unit.
///
/// The tool is an opaque black box: it is handed an argument vector
/// and the unit's virtual filesystem, reads its staged inputs from
/// `/working`, writes its outputs back there, and talks to the
/// outside world only through [`ToolIo`].
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// (Re)initialize with the given mode flags. Called once when the
    /// unit starts, and again whenever the controller re-sends `Init`.
    async fn init(&self, _opts: &InitOptions, _io: &ToolIo) -> Result<(), ToolError> {
        Ok(())
    }

    /// Execute one invocation against the unit's filesystem.
    async fn exec(
        &self,
        args: &[String],
        fs: &mut VirtualFs,
        io: &ToolIo,
    ) -> Result<(), ToolError>;
}
