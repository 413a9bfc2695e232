// Execution Unit
// A named wrapper around one isolated tool context, plus the task
// that runs inside it

use crate::collect::collect_outputs;
use crate::message::{
    RunRequest, ToolEvent, ToolRequest, UnitEvent, UnitEventSender,
};
use crate::stage::StageKind;
use crate::staging::stage_inputs;
use crate::tool::{Tool, ToolIo};
use crate::vfs::VirtualFs;

use std::sync::Arc;

use tokio::sync::mpsc;

/// Controller-side handle to one execution unit.
///
/// Created once at startup; the isolated context behind it lives until
/// the request channel drops. Sends are fire-and-forget and delivered
/// in order; nothing is guaranteed across different units.
pub struct ToolUnit {
    name: String,
    kind: StageKind,
    tx: mpsc::UnboundedSender<ToolRequest>,
    ready: bool,
}

impl ToolUnit {
    /// Spawn the unit's task and immediately queue an `Init`. The
    /// handle stays inert (rejecting runs) until the controller
    /// observes the corresponding `Inited`.
    pub fn spawn(
        name: impl Into<String>,
        kind: StageKind,
        tool: Arc<dyn Tool>,
        events: UnitEventSender,
    ) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(unit_loop(name.clone(), kind, tool, rx, events));

        let unit = Self {
            name,
            kind,
            tx,
            ready: false,
        };
        unit.send(ToolRequest::Init(Default::default()));
        unit
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Whether the unit has acknowledged its most recent `Init`.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub(crate) fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Fire-and-forget send. Per-unit ordering is preserved.
    pub fn send(&self, request: ToolRequest) {
        let _ = self.tx.send(request);
    }
}

/// The unit's task: owns the tool and a private virtual filesystem,
/// and services requests one at a time.
async fn unit_loop(
    name: String,
    kind: StageKind,
    tool: Arc<dyn Tool>,
    mut rx: mpsc::UnboundedReceiver<ToolRequest>,
    events: UnitEventSender,
) {
    let mut fs = VirtualFs::new();
    let io = ToolIo::new(name.clone(), events.clone());

    while let Some(request) = rx.recv().await {
        match request {
            ToolRequest::Init(opts) => match tool.init(&opts, &io).await {
                Ok(()) => emit(&events, &name, ToolEvent::Inited),
                Err(e) => io.print_err(format!("module init failed: {}", e)),
            },
            ToolRequest::Run(run) => {
                handle_run(&name, kind, tool.as_ref(), &mut fs, run, &events, &io).await;
            }
        }
    }
}

/// One run: stage, acknowledge, execute, collect, terminate. Exactly
/// one of `Done`/`Exception` closes the run; an `Outputs` batch, if
/// any, precedes `Done`.
async fn handle_run(
    name: &str,
    kind: StageKind,
    tool: &dyn Tool,
    fs: &mut VirtualFs,
    mut run: RunRequest,
    events: &UnitEventSender,
    io: &ToolIo,
) {
    let files = match stage_inputs(fs, &mut run, io) {
        Ok(files) => files,
        Err(e) => {
            emit(
                events,
                name,
                ToolEvent::Exception {
                    description: format!("failed to stage primary input: {}", e),
                    errno: None,
                },
            );
            return;
        }
    };
    emit(events, name, ToolEvent::RunAck { files });

    match tool.exec(&run.args, fs, io).await {
        Ok(()) => {
            let artifacts = collect_outputs(fs, kind, &run);
            if !artifacts.is_empty() {
                emit(events, name, ToolEvent::Outputs { artifacts });
            }
            emit(events, name, ToolEvent::Done);
        }
        Err(e) => emit(
            events,
            name,
            ToolEvent::Exception {
                description: e.description,
                errno: e.errno,
            },
        ),
    }
}

fn emit(events: &UnitEventSender, unit: &str, event: ToolEvent) {
    let _ = events.send(UnitEvent {
        unit: unit.to_string(),
        event,
    });
}
