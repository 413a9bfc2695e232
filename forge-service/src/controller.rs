// Controller
// Single-threaded, message-driven orchestration of the execution
// units: readiness gating, single-stage runs, and chained pipelines

use crate::chain::{CallerInput, ChainPlan, ChainState, PipelineOutcome};
use crate::error::{ServiceError, ServiceResult};
use crate::message::{
    unit_event_channel, Artifact, InitOptions, LogSender, LogSink, RunRequest, ToolEvent,
    ToolRequest, UnitEvent, UnitEventReceiver, UnitEventSender,
};
use crate::readiness::ReadinessTracker;
use crate::stage::{normalize_name, StageKind};
use crate::tool::Tool;
use crate::unit::ToolUnit;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

/// Drives every execution unit from one place.
///
/// The controller never blocks waiting for a unit: a run's logical
/// continuation is the handler for the next event that unit sends.
/// At most one run is outstanding per unit; chain steps are strictly
/// sequential. The controller survives any run or chain failure and
/// accepts new work afterwards.
pub struct Controller {
    units: HashMap<String, ToolUnit>,
    readiness: ReadinessTracker,
    event_tx: UnitEventSender,
    event_rx: UnitEventReceiver,
    log_tx: Option<LogSender>,
}

impl Controller {
    pub fn new() -> Self {
        let (event_tx, event_rx) = unit_event_channel();
        Self {
            units: HashMap::new(),
            readiness: ReadinessTracker::new(),
            event_tx,
            event_rx,
            log_tx: None,
        }
    }

    /// Forward unit log/error lines to this sink.
    pub fn with_log_sink(mut self, tx: LogSender) -> Self {
        self.log_tx = Some(tx);
        self
    }

    /// Spawn a unit for a stage and register it, initially not ready.
    /// The unit's `Init` is queued immediately.
    pub fn add_unit(&mut self, kind: StageKind, tool: Arc<dyn Tool>) {
        let name = kind.unit_name();
        let unit = ToolUnit::spawn(name, kind, tool, self.event_tx.clone());
        self.readiness.register(name);
        self.units.insert(name.to_string(), unit);
    }

    /// Whether a unit has acknowledged its most recent `Init`.
    pub fn is_ready(&self, unit: &str) -> bool {
        self.readiness.is_ready(unit)
    }

    /// Absorb every event already queued, so readiness reflects any
    /// `Inited` that arrived since the last call.
    pub fn absorb_pending(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_idle_event(event);
        }
    }

    /// Re-send `Init` with new mode flags and wait for the fresh
    /// `Inited`. The unit is not ready in between; a run issued in
    /// that window would be rejected.
    pub async fn reinit_unit(&mut self, unit: &str, opts: InitOptions) -> ServiceResult<()> {
        self.absorb_pending();
        let handle = self
            .units
            .get_mut(unit)
            .ok_or_else(|| ServiceError::UnknownUnit(unit.to_string()))?;
        handle.set_ready(false);
        handle.send(ToolRequest::Init(opts));
        self.readiness.mark_pending(unit);
        self.wait_until_ready(&[unit]).await
    }

    /// Consume events until all named units are ready.
    pub async fn wait_until_ready(&mut self, units: &[&str]) -> ServiceResult<()> {
        loop {
            if self.readiness.all_ready(units.iter().copied()) {
                return Ok(());
            }
            let event = self
                .event_rx
                .recv()
                .await
                .ok_or(ServiceError::ChannelClosed)?;
            self.handle_idle_event(event);
        }
    }

    /// Run a single stage to completion and return its artifacts.
    ///
    /// Rejected locally, with nothing sent to the unit, when the unit
    /// is unknown or not ready, or when the request has no primary
    /// input.
    pub async fn run_stage(
        &mut self,
        unit: &str,
        request: RunRequest,
    ) -> ServiceResult<Vec<Artifact>> {
        self.absorb_pending();

        if !self.units.contains_key(unit) {
            return Err(ServiceError::UnknownUnit(unit.to_string()));
        }
        if !self.readiness.is_ready(unit) {
            self.log_tx
                .log_line(unit, format!("{} worker is not ready yet", unit), true);
            return Err(ServiceError::UnitNotReady(unit.to_string()));
        }
        if request.primary_name.is_empty() {
            return Err(ServiceError::MissingInput);
        }

        self.drive_run(unit, request).await
    }

    /// Run a full pipeline: each step's `done` advances the chain, any
    /// exception aborts it, and only the terminal artifact subset is
    /// delivered.
    pub async fn run_pipeline(
        &mut self,
        input: CallerInput,
        plan: &ChainPlan,
    ) -> ServiceResult<PipelineOutcome> {
        self.absorb_pending();

        // Gate on every participating unit before any side effect.
        let participants = plan.participants();
        for unit in &participants {
            if !self.units.contains_key(*unit) {
                return Err(ServiceError::UnknownUnit(unit.to_string()));
            }
        }
        let missing = self.readiness.not_ready(participants.iter().copied());
        if !missing.is_empty() {
            return Err(ServiceError::UnitNotReady(missing.join(", ")));
        }
        if input.name.is_empty() {
            return Err(ServiceError::MissingInput);
        }

        let first = plan.steps.first().ok_or(ServiceError::MissingInput)?;
        let base = first.kind.base_name(&input.name);

        let mut state = ChainState::new();
        let mut caller = Some(input);

        for (index, step) in plan.steps.iter().enumerate() {
            state.enter_step(index + 1);

            if let Some(opts) = &step.reinit {
                // A mode-changing re-Init makes the unit transiently
                // not ready; hold the run until the fresh Inited.
                self.reinit_unit(&step.unit, opts.clone()).await?;
            }

            let request = match step.build_request(&base, &mut caller, &state) {
                Ok(request) => request,
                Err(e) => {
                    self.log_tx.log_line(
                        &step.unit,
                        format!("compilation chain aborted: {}", e),
                        true,
                    );
                    state.abort();
                    return Err(e);
                }
            };

            match self.drive_run(&step.unit, request).await {
                Ok(artifacts) => state.absorb(artifacts),
                Err(e) => {
                    self.log_tx.log_line(
                        &step.unit,
                        "compilation chain aborted due to error".to_string(),
                        true,
                    );
                    state.abort();
                    return Err(e);
                }
            }
        }

        let artifacts = state.complete(&base);
        Ok(PipelineOutcome { artifacts })
    }

    /// Send one `Run` and consume this unit's events until the
    /// terminal `Done`/`Exception`.
    async fn drive_run(
        &mut self,
        unit: &str,
        mut request: RunRequest,
    ) -> ServiceResult<Vec<Artifact>> {
        request.primary_name = normalize_name(&request.primary_name);
        if let Some(secondary) = &mut request.secondary {
            secondary.name = normalize_name(&secondary.name);
        }

        let handle = self
            .units
            .get(unit)
            .ok_or_else(|| ServiceError::UnknownUnit(unit.to_string()))?;
        handle.send(ToolRequest::Run(request));

        let mut outputs = Vec::new();
        loop {
            let event = self
                .event_rx
                .recv()
                .await
                .ok_or(ServiceError::ChannelClosed)?;
            if event.unit != unit {
                self.handle_idle_event(event);
                continue;
            }
            match event.event {
                ToolEvent::Log(text) => self.log_tx.log_line(unit, text, false),
                ToolEvent::Err(text) => self.log_tx.log_line(unit, text, true),
                ToolEvent::RunAck { files } => self.log_tx.log_line(
                    unit,
                    format!("files in staging: {}", files.join(", ")),
                    false,
                ),
                ToolEvent::Outputs { artifacts } => outputs = artifacts,
                ToolEvent::Done => return Ok(outputs),
                ToolEvent::Exception { description, errno } => {
                    return Err(ServiceError::ToolFailed {
                        unit: unit.to_string(),
                        description,
                        errno,
                    })
                }
                ToolEvent::Inited => {
                    self.mark_unit_ready(unit);
                }
            }
        }
    }

    /// Handle an event that arrives outside of (or concurrently with)
    /// a run on another unit: readiness updates and log forwarding;
    /// anything else is logged and dropped, never fatal.
    fn handle_idle_event(&mut self, event: UnitEvent) {
        let UnitEvent { unit, event } = event;
        match event {
            ToolEvent::Inited => self.mark_unit_ready(&unit),
            ToolEvent::Log(text) => self.log_tx.log_line(&unit, text, false),
            ToolEvent::Err(text) => self.log_tx.log_line(&unit, text, true),
            other => {
                warn!(unit = %unit, event = ?other, "unexpected message outside a run");
            }
        }
    }

    fn mark_unit_ready(&mut self, unit: &str) {
        if !self.readiness.mark_ready(unit) {
            warn!(unit = %unit, "inited from unregistered unit");
            return;
        }
        if let Some(handle) = self.units.get_mut(unit) {
            handle.set_ready(true);
        }
        self.log_tx
            .log_line(unit, format!("{} worker ready", unit), false);
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}
