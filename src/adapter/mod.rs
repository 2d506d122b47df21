//! Adapters: the single point in the graph that is simultaneously a link's
//! Input (towards its source) and Output (towards its target) (spec.md
//! §4.5, §4.6).
//!
//! Every adapter kind plugs an [`AdapterLogic`] into the same [`Adapter`]
//! shell, which owns the wiring (source binding, the one downstream
//! target, Info exchange) common to all of them. `Adapter` implements
//! both [`Output`] and [`Input`]; an `Rc<RefCell<Adapter>>` is coerced to
//! whichever trait object a given call site needs, so both sides share
//! the same instance.

pub mod caching;
pub mod stateless;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::info::Info;
use crate::slot::{Input, Output, RequesterId};
use crate::time::Time;

/// The behavior plugged into an [`Adapter`] shell. `push` is called
/// whenever the upstream notifies the adapter of fresh data; `get`
/// answers a downstream pull, and is handed a closure that actively pulls
/// the bound upstream source at an arbitrary time, for adapter kinds that
/// cannot answer from cached state alone (spec.md §4.5 stateless
/// adapters; §4.6 time-caching adapters keep their own buffer instead).
pub trait AdapterLogic: std::fmt::Debug {
    fn push(&mut self, env: Envelope) -> Result<()>;
    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope>;

    /// Transforms the Info this adapter advertises downstream, given the
    /// upstream-merged Info Connect has negotiated so far. The default is
    /// the identity transform; adapters that rewrite units or grid at
    /// runtime (unit conversion, `SumOverTime`, regridding) override this
    /// so downstream consumers see the post-transform metadata during
    /// Connect rather than only at the first pull (spec.md §4.4, §4.6).
    fn get_info(&self, info: Info) -> Info {
        info
    }
}

#[derive(Debug)]
pub struct Adapter {
    name: String,
    source: Option<Rc<RefCell<dyn Output>>>,
    source_requester: Option<RequesterId>,
    target: Option<Rc<RefCell<dyn Input>>>,
    connecting_begun: bool,
    info: Option<Info>,
    is_delay: bool,
    logic: Box<dyn AdapterLogic>,
}

impl Adapter {
    pub fn new(name: impl Into<String>, logic: Box<dyn AdapterLogic>) -> Self {
        Adapter {
            name: name.into(),
            source: None,
            source_requester: None,
            target: None,
            connecting_begun: false,
            info: None,
            is_delay: false,
            logic,
        }
    }

    /// Marks this adapter as a delay edge: the scheduler's cycle check
    /// (spec.md §5 P5) is allowed to ignore this link when looking for
    /// cycles, since the adapter can always answer from a past buffered
    /// value without waiting on its downstream to advance further.
    pub fn as_delay(mut self) -> Self {
        self.is_delay = true;
        self
    }

    pub fn is_delay(&self) -> bool {
        self.is_delay
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new().slot(self.name.clone())
    }

    fn pull_upstream_closure(
        &self,
    ) -> impl FnMut(Time) -> Result<Envelope> + 'static {
        let source = self.source.clone();
        let requester = self.source_requester;
        let ctx = self.ctx();
        move |time: Time| {
            let (source, requester) = match (&source, requester) {
                (Some(s), Some(r)) => (s.clone(), r),
                _ => {
                    return Err(FinamError::setup(
                        ctx.clone(),
                        "adapter has no bound source to pull from",
                    ))
                }
            };
            source.borrow_mut().get_data(time, requester)
        }
    }
}

impl Output for Adapter {
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
            "an adapter receives data only from its bound source, not by direct push",
        ))
    }

    fn chain(&mut self, target: Rc<RefCell<dyn Input>>) -> Result<RequesterId> {
        if self.connecting_begun {
            return Err(FinamError::setup(
                self.ctx().phase(Phase::Connect),
                "AlreadyConnecting: cannot attach a new target after Connect has begun",
            ));
        }
        if self.target.is_some() {
            return Err(FinamError::setup(
                self.ctx().phase(Phase::Connect),
                "BranchingNotSupported: an adapter can feed only one downstream target",
            ));
        }
        self.target = Some(target);
        Ok(RequesterId(0))
    }

    fn get_data(&mut self, time: Time, _requester: RequesterId) -> Result<Envelope> {
        let mut pull_upstream = self.pull_upstream_closure();
        self.logic.get(time, &mut pull_upstream)
    }

    fn info(&self) -> Option<Info> {
        self.info.clone()
    }

    fn begin_connect(&mut self) {
        self.connecting_begun = true;
    }
}

impl Input for Adapter {
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
                "AlreadyBound: this adapter already has a source",
            ));
        }
        self.source = Some(source);
        self.source_requester = Some(requester);
        Ok(())
    }

    fn exchange_info(&mut self, desired: Info) -> Result<Info> {
        let mine = match &self.info {
            Some(existing) => existing.merge(&desired),
            None => desired,
        };
        let Some(source) = &self.source else {
            let transformed = self.logic.get_info(mine);
            self.info = Some(transformed.clone());
            return Ok(transformed);
        };
        let upstream = source.borrow().info();
        let merged = match upstream {
            Some(up) => mine.merge(&up),
            None => mine,
        };
        let transformed = self.logic.get_info(merged);
        self.info = Some(transformed.clone());
        Ok(transformed)
    }

    fn source_updated(&mut self, time: Time) -> Result<()> {
        let (source, requester) = match (&self.source, self.source_requester) {
            (Some(s), Some(r)) => (s.clone(), r),
            _ => {
                return Err(FinamError::setup(
                    self.ctx().phase(Phase::Update),
                    "sourceUpdated fired on an unbound adapter",
                ))
            }
        };
        let env = source.borrow_mut().get_data(time, requester)?;
        self.logic.push(env)?;
        if let Some(target) = &self.target {
            trace!(adapter = %self.name, %time, "forwarding notification");
            target.borrow_mut().source_updated(time)?;
        }
        Ok(())
    }

    fn pull(&mut self, time: Time) -> Result<Envelope> {
        let mut pull_upstream = self.pull_upstream_closure();
        self.logic.get(time, &mut pull_upstream)
    }
}
