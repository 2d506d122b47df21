//! Callback slot variants: a pull-originating Output that computes data on
//! demand instead of keeping history, and a push-originating Input that
//! hands data straight to a user closure instead of waiting to be pulled
//! (spec.md §4.4).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::{apply_resolved_info, Input, Output, RequesterId};
use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::info::Info;
use crate::time::Time;
use crate::units::{LinearUnitSystem, UnitSystem};

/// An Output with no history: every `getData` call invokes the supplied
/// closure directly. `needsPush` is false, so the scheduler never waits on
/// a producing component for this link (spec.md §4.4, dead-link rules).
pub struct CallbackOutput {
    name: String,
    info: Option<Info>,
    connecting_begun: bool,
    targets: Vec<Rc<RefCell<dyn Input>>>,
    callback: Box<dyn FnMut(Time) -> Result<Envelope>>,
}

impl std::fmt::Debug for CallbackOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackOutput")
            .field("name", &self.name)
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl CallbackOutput {
    pub fn new(
        name: impl Into<String>,
        callback: impl FnMut(Time) -> Result<Envelope> + 'static,
    ) -> Self {
        CallbackOutput {
            name: name.into(),
            info: None,
            connecting_begun: false,
            targets: Vec::new(),
            callback: Box::new(callback),
        }
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new().slot(self.name.clone())
    }
}

impl Output for CallbackOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn push_info(&mut self, info: Info) -> Result<()> {
        self.info = Some(match &self.info {
            Some(existing) => existing.merge(&info),
            None => info,
        });
        Ok(())
    }

    fn push(&mut self, _env: Envelope) -> Result<()> {
        Err(FinamError::setup(
            self.ctx().phase(Phase::Update),
            "a callback output is pull-driven and cannot be pushed to",
        ))
    }

    fn chain(&mut self, target: Rc<RefCell<dyn Input>>) -> Result<RequesterId> {
        if self.connecting_begun {
            return Err(FinamError::setup(
                self.ctx().phase(Phase::Connect),
                "AlreadyConnecting: cannot attach a new target after Connect has begun",
            ));
        }
        let id = RequesterId(self.targets.len());
        self.targets.push(target);
        Ok(id)
    }

    fn get_data(&mut self, time: Time, _requester: RequesterId) -> Result<Envelope> {
        trace!(slot = %self.name, %time, "invoking output callback");
        (self.callback)(time)
    }

    fn info(&self) -> Option<Info> {
        self.info.clone()
    }

    fn begin_connect(&mut self) {
        self.connecting_begun = true;
    }

    fn needs_push(&self) -> bool {
        false
    }
}

/// An Input driven entirely by `sourceUpdated`: every notification pulls
/// the fresh value and hands it to a user closure. `needsPull` is false, so
/// the scheduler never has to schedule a consumer for this link on its own
/// (spec.md §4.4, dead-link rules).
pub struct CallbackInput {
    name: String,
    source: Option<Rc<RefCell<dyn Output>>>,
    requester: Option<RequesterId>,
    desired_info: Option<Info>,
    resolved_info: Option<Info>,
    units_system: Box<dyn UnitSystem>,
    callback: Box<dyn FnMut(Envelope) -> Result<()>>,
}

impl std::fmt::Debug for CallbackInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackInput")
            .field("name", &self.name)
            .field("bound", &self.source.is_some())
            .finish()
    }
}

impl CallbackInput {
    pub fn new(
        name: impl Into<String>,
        callback: impl FnMut(Envelope) -> Result<()> + 'static,
    ) -> Self {
        CallbackInput {
            name: name.into(),
            source: None,
            requester: None,
            desired_info: None,
            resolved_info: None,
            units_system: Box::new(LinearUnitSystem::new()),
            callback: Box::new(callback),
        }
    }

    pub fn with_units_system(mut self, system: Box<dyn UnitSystem>) -> Self {
        self.units_system = system;
        self
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new().slot(self.name.clone())
    }
}

impl Input for CallbackInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_source(
        &mut self,
        source: Rc<RefCell<dyn Output>>,
        requester: RequesterId,
    ) -> Result<()> {
        if self.source.is_some() {
            return Err(FinamError::setup(
                self.ctx().phase(Phase::Connect),
                "AlreadyBound: this input already has a source",
            ));
        }
        self.source = Some(source);
        self.requester = Some(requester);
        Ok(())
    }

    fn exchange_info(&mut self, desired: Info) -> Result<Info> {
        self.desired_info = Some(match &self.desired_info {
            Some(existing) => existing.merge(&desired),
            None => desired,
        });
        let mine = self.desired_info.clone().expect("just set above");
        let Some(source) = &self.source else {
            return Ok(mine);
        };
        let upstream = source.borrow().info();
        let merged = match upstream {
            Some(up) => {
                if let Err(reason) = mine.accepts(&up, self.units_system.as_ref(), false) {
                    return Err(FinamError::metadata(
                        self.ctx().phase(Phase::Connect),
                        format!("upstream Info rejected: {reason}"),
                    ));
                }
                mine.merge(&up)
            }
            None => mine,
        };
        self.resolved_info = Some(merged.clone());
        Ok(merged)
    }

    fn source_updated(&mut self, time: Time) -> Result<()> {
        let (source, requester) = match (&self.source, self.requester) {
            (Some(s), Some(r)) => (s.clone(), r),
            _ => {
                return Err(FinamError::setup(
                    self.ctx().phase(Phase::Update),
                    "sourceUpdated fired on an unbound callback input",
                ))
            }
        };
        let env = source.borrow_mut().get_data(time, requester)?;
        let env = apply_resolved_info(env, self.resolved_info.as_ref(), self.units_system.as_ref())?;
        trace!(slot = %self.name, %time, "delivering to callback");
        (self.callback)(env)
    }

    fn pull(&mut self, _time: Time) -> Result<Envelope> {
        Err(FinamError::setup(
            self.ctx().phase(Phase::Update),
            "a callback input is push-driven and does not support pull",
        ))
    }

    fn needs_pull(&self) -> bool {
        false
    }
}
