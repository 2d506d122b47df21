//! The component lifecycle state machine and the two component shapes
//! hosted models implement against (spec.md §4.6, §6).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, instrument, warn};

use crate::connector::{ConnectStatus, Connector};
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::slot::{Input, Output};
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// Reacts purely to push/pull; has no simulated clock of its own.
    Stateless,
    /// Owns a simulated `time` and a `nextTime` predictor; advanced by
    /// the scheduler.
    TimeStepping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentStatus {
    Created,
    Initialized,
    Connecting,
    ConnectingIdle,
    Connected,
    Validated,
    Updated,
    Finalized,
    Failed,
}

/// The hosted-model contract (spec.md §6 "Component API"). A framework
/// user implements this directly; `Component` wraps it with the lifecycle
/// state machine and error/log bookkeeping every hosted model gets for
/// free.
pub trait Behavior: std::fmt::Debug {
    fn name(&self) -> &str;
    fn kind(&self) -> ComponentKind;

    /// Declares ports on the supplied connector and does any other setup.
    fn initialize(&mut self, connector: &mut Connector) -> Result<()>;
    fn validate(&mut self) -> Result<()>;

    /// Time-stepping components only: advance from `time` to `nextTime`.
    /// The default is the correct no-op for stateless components, which
    /// are driven entirely by push/pull instead.
    fn update(&mut self) -> Result<()> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<()>;

    /// Current simulated instant; `None` for stateless components.
    fn time(&self) -> Option<Time> {
        None
    }

    /// The instant `update` will advance to next; `None` for stateless
    /// components. Must be monotone non-decreasing across calls.
    fn next_time(&self) -> Option<Time> {
        None
    }
}

/// Wraps a [`Behavior`] with the lifecycle state machine spec.md §4.6
/// describes: `CREATED -> INITIALIZED -> {CONNECTING,CONNECTING_IDLE} ->
/// CONNECTED -> VALIDATED -> UPDATED* -> FINALIZED`, with `FAILED`
/// absorbing a failure from any hook.
pub struct Component {
    behavior: Box<dyn Behavior>,
    status: ComponentStatus,
    connector: Connector,
    last_next_time: Option<Time>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.behavior.name())
            .field("status", &self.status)
            .finish()
    }
}

impl Component {
    pub fn new(behavior: Box<dyn Behavior>) -> Self {
        let name = behavior.name().to_string();
        Component {
            behavior,
            status: ComponentStatus::Created,
            connector: Connector::new(name),
            last_next_time: None,
        }
    }

    pub fn name(&self) -> &str {
        self.behavior.name()
    }

    pub fn kind(&self) -> ComponentKind {
        self.behavior.kind()
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    pub fn time(&self) -> Option<Time> {
        self.behavior.time()
    }

    pub fn next_time(&self) -> Option<Time> {
        self.behavior.next_time()
    }

    fn ctx(&self, phase: Phase) -> ErrorContext {
        ErrorContext::new().component(self.behavior.name()).phase(phase)
    }

    fn fail(&mut self, phase: Phase, err: FinamError) -> FinamError {
        error!(component = %self.behavior.name(), phase = %phase, error = %err, "component failed");
        self.status = ComponentStatus::Failed;
        err
    }

    #[instrument(level = "debug", skip(self))]
    pub fn initialize(&mut self) -> Result<()> {
        self.behavior
            .initialize(&mut self.connector)
            .map_err(|e| self.fail(Phase::Initialize, e))?;
        self.status = ComponentStatus::Initialized;
        Ok(())
    }

    /// Closes this component's output declaration window: any `>>` wiring
    /// attempted afterwards fails `AlreadyConnecting`.
    pub fn begin_connect(&mut self) {
        self.connector.begin_connect();
    }

    /// Runs one Connect pass; updates `status` to `CONNECTING`,
    /// `CONNECTING_IDLE`, or `CONNECTED`.
    #[instrument(level = "debug", skip(self))]
    pub fn connect(&mut self) -> Result<ComponentStatus> {
        let outcome = self
            .connector
            .try_connect()
            .map_err(|e| self.fail(Phase::Connect, e))?;
        self.status = match outcome {
            ConnectStatus::Connecting => ComponentStatus::Connecting,
            ConnectStatus::ConnectingIdle => ComponentStatus::ConnectingIdle,
            ConnectStatus::Connected => ComponentStatus::Connected,
        };
        Ok(self.status)
    }

    pub fn unresolved_slots(&self) -> Vec<String> {
        self.connector.unresolved_slots()
    }

    /// Looks up a registered output/input slot by name, for the
    /// Composition's `>>` wiring surface. Only meaningful after
    /// `initialize` has run (slots are declared there).
    pub fn output(&self, name: &str) -> Option<Rc<RefCell<dyn Output>>> {
        self.connector.output(name)
    }

    pub fn input(&self, name: &str) -> Option<Rc<RefCell<dyn Input>>> {
        self.connector.input(name)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn validate(&mut self) -> Result<()> {
        self.behavior
            .validate()
            .map_err(|e| self.fail(Phase::Validate, e))?;
        self.status = ComponentStatus::Validated;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn update(&mut self) -> Result<()> {
        self.behavior
            .update()
            .map_err(|e| self.fail(Phase::Update, e))?;
        if let (Some(prev), Some(next)) = (self.last_next_time, self.behavior.next_time()) {
            if next < prev {
                return Err(self.fail(
                    Phase::Update,
                    FinamError::component(
                        self.ctx(Phase::Update),
                        anyhow::anyhow!(
                            "nextTime regressed from {prev} to {next}; treated as a component error"
                        ),
                    ),
                ));
            }
        }
        self.last_next_time = self.behavior.next_time();
        self.status = ComponentStatus::Updated;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn finalize(&mut self) -> Result<()> {
        if self.status == ComponentStatus::Failed {
            warn!(component = %self.behavior.name(), "finalize skipped: component already failed");
            return Ok(());
        }
        self.behavior
            .finalize()
            .map_err(|e| self.fail(Phase::Finalize, e))?;
        self.status = ComponentStatus::Finalized;
        Ok(())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ComponentMetadata {
    pub name: String,
    pub kind: &'static str,
    pub status: &'static str,
    pub time: Option<String>,
}

impl Component {
    pub fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata {
            name: self.name().to_string(),
            kind: match self.kind() {
                ComponentKind::Stateless => "stateless",
                ComponentKind::TimeStepping => "time_stepping",
            },
            status: match self.status {
                ComponentStatus::Created => "created",
                ComponentStatus::Initialized => "initialized",
                ComponentStatus::Connecting => "connecting",
                ComponentStatus::ConnectingIdle => "connecting_idle",
                ComponentStatus::Connected => "connected",
                ComponentStatus::Validated => "validated",
                ComponentStatus::Updated => "updated",
                ComponentStatus::Finalized => "finalized",
                ComponentStatus::Failed => "failed",
            },
            time: self.time().map(|t| t.to_string()),
        }
    }
}
