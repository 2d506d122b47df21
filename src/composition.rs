//! Top-level composition: registers components and adapters, wires them
//! with the `>>` operator, and drives initialize -> Connect -> Scheduler
//! -> finalize (spec.md §4.7).

use std::cell::RefCell;
use std::ops::Shr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter::Adapter;
use crate::component::{Behavior, Component, ComponentMetadata, ComponentStatus};
use crate::config::CompositionConfig;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::logging;
use crate::scheduler::Scheduler;
use crate::slot::{Input, Output};
use crate::time::Time;

/// One resolved link between two components' ports, recorded as soon as
/// `>>` wiring runs, independently of whatever adapters sit in between.
/// This is what the [`Scheduler`] builds its dependency graph from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkInfo {
    pub output_owner: String,
    pub input_owner: String,
    pub needs_push: bool,
    pub needs_pull: bool,
    pub is_delay: bool,
}

#[derive(Debug, Default)]
struct LinkRegistry {
    links: Vec<LinkInfo>,
}

/// An Output port picked up from a component, possibly after being routed
/// through one or more adapters. `owner` always names the component the
/// data originates from; `via_delay` is true once any adapter along the
/// chain is a delay adapter (spec.md §8 P5). `origin_needs_push` is fixed
/// at the real Output this handle started from: an adapter's own
/// `needs_push` is always `true` by default and would otherwise hide a
/// pull-driven origin from dead-link detection.
#[derive(Clone)]
pub struct OutputHandle {
    slot: Rc<RefCell<dyn Output>>,
    owner: String,
    via_delay: bool,
    origin_needs_push: bool,
    registry: Rc<RefCell<LinkRegistry>>,
}

/// An Input port picked up from a component.
#[derive(Clone)]
pub struct InputHandle {
    slot: Rc<RefCell<dyn Input>>,
    owner: String,
    registry: Rc<RefCell<LinkRegistry>>,
}

/// A standalone adapter not yet wired into any chain.
#[derive(Clone)]
pub struct AdapterHandle {
    slot: Rc<RefCell<Adapter>>,
    is_delay: bool,
    registry: Rc<RefCell<LinkRegistry>>,
}

/// `output >> adapter`: extends the chain by one adapter, returning a new
/// `OutputHandle` at the adapter's downstream side.
impl Shr<AdapterHandle> for OutputHandle {
    type Output = Result<OutputHandle>;

    fn shr(self, adapter: AdapterHandle) -> Result<OutputHandle> {
        let input_view: Rc<RefCell<dyn Input>> = adapter.slot.clone();
        crate::slot::chain(self.slot, input_view)?;
        let output_view: Rc<RefCell<dyn Output>> = adapter.slot;
        Ok(OutputHandle {
            slot: output_view,
            owner: self.owner,
            via_delay: self.via_delay || adapter.is_delay,
            origin_needs_push: self.origin_needs_push,
            registry: self.registry,
        })
    }
}

/// `output >> input`: terminates the chain, binding the Output to the
/// Input and recording the resulting link for the scheduler.
impl Shr<InputHandle> for OutputHandle {
    type Output = Result<()>;

    fn shr(self, input: InputHandle) -> Result<()> {
        let needs_pull = input.slot.borrow().needs_pull();
        crate::slot::chain(self.slot, input.slot)?;
        self.registry.borrow_mut().links.push(LinkInfo {
            output_owner: self.owner,
            input_owner: input.owner,
            needs_push: self.origin_needs_push,
            needs_pull,
            is_delay: self.via_delay,
        });
        Ok(())
    }
}

/// Lets `composition.output(..)? >> adapter >> composition.input(..)?`
/// chain without a `?` after every step.
impl Shr<AdapterHandle> for Result<OutputHandle> {
    type Output = Result<OutputHandle>;

    fn shr(self, adapter: AdapterHandle) -> Result<OutputHandle> {
        self.and_then(|out| out.shr(adapter))
    }
}

impl Shr<InputHandle> for Result<OutputHandle> {
    type Output = Result<()>;

    fn shr(self, input: InputHandle) -> Result<()> {
        self.and_then(|out| out.shr(input))
    }
}

/// Owns every [`Component`] and [`Adapter`] in a run, wires them, and
/// drives the whole lifecycle (spec.md §4.7 Composition responsibilities).
pub struct Composition {
    config: CompositionConfig,
    components: Vec<Component>,
    registry: Rc<RefCell<LinkRegistry>>,
    stop: Arc<AtomicBool>,
}

impl Composition {
    pub fn new(config: CompositionConfig) -> Self {
        logging::init(&config);
        Composition {
            config,
            components: Vec::new(),
            registry: Rc::new(RefCell::new(LinkRegistry::default())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a component and runs its `initialize` hook immediately,
    /// so its ports exist for wiring right away (spec.md §4.6).
    pub fn add_component(&mut self, behavior: Box<dyn Behavior>) -> Result<usize> {
        let mut component = Component::new(behavior);
        component.initialize()?;
        self.components.push(component);
        Ok(self.components.len() - 1)
    }

    fn component(&self, index: usize) -> Result<&Component> {
        self.components.get(index).ok_or_else(|| {
            FinamError::setup(
                ErrorContext::new().phase(Phase::Initialize),
                format!("no component registered at index {index}"),
            )
        })
    }

    /// Looks up a component's named Output, wrapped for `>>` wiring.
    pub fn output(&self, index: usize, name: &str) -> Result<OutputHandle> {
        let component = self.component(index)?;
        let slot = component.output(name).ok_or_else(|| {
            FinamError::setup(
                ErrorContext::new().component(component.name()).phase(Phase::Initialize),
                format!("no output named '{name}'"),
            )
        })?;
        let origin_needs_push = slot.borrow().needs_push();
        Ok(OutputHandle {
            slot,
            owner: component.name().to_string(),
            via_delay: false,
            origin_needs_push,
            registry: self.registry.clone(),
        })
    }

    /// Looks up a component's named Input, wrapped for `>>` wiring.
    pub fn input(&self, index: usize, name: &str) -> Result<InputHandle> {
        let component = self.component(index)?;
        let slot = component.input(name).ok_or_else(|| {
            FinamError::setup(
                ErrorContext::new().component(component.name()).phase(Phase::Initialize),
                format!("no input named '{name}'"),
            )
        })?;
        Ok(InputHandle {
            slot,
            owner: component.name().to_string(),
            registry: self.registry.clone(),
        })
    }

    /// Wraps a freestanding adapter for `>>` wiring.
    pub fn adapter(&self, adapter: Adapter) -> AdapterHandle {
        let is_delay = adapter.is_delay();
        AdapterHandle {
            slot: Rc::new(RefCell::new(adapter)),
            is_delay,
            registry: self.registry.clone(),
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Runs the Connect fixpoint across every component until all report
    /// CONNECTED, or raises `ConnectStalled` if a full pass leaves every
    /// unresolved component CONNECTING_IDLE (spec.md §4.5, §7).
    fn connect(&mut self) -> Result<()> {
        for component in &mut self.components {
            component.begin_connect();
        }
        loop {
            let mut pending: Vec<(String, ComponentStatus, Vec<String>)> = Vec::new();
            for component in &mut self.components {
                if component.status() == ComponentStatus::Connected {
                    continue;
                }
                let status = component.connect()?;
                if status != ComponentStatus::Connected {
                    pending.push((
                        component.name().to_string(),
                        status,
                        component.unresolved_slots(),
                    ));
                }
            }
            if pending.is_empty() {
                return Ok(());
            }
            let all_idle = pending
                .iter()
                .all(|(_, status, _)| *status == ComponentStatus::ConnectingIdle);
            if all_idle {
                let stalled = pending
                    .into_iter()
                    .map(|(name, _, slots)| format!("{name}: {slots:?}"))
                    .collect();
                return Err(FinamError::ConnectStalled { stalled });
            }
        }
    }

    /// Runs the whole lifecycle: Connect, `validate`, the scheduler up to
    /// `end_time`, then `finalize` on every component.
    pub fn run(&mut self, end_time: Time) -> Result<()> {
        info!(components = self.components.len(), "starting connect");
        self.connect()?;

        for component in &mut self.components {
            component.validate()?;
        }

        {
            let links = self.registry.borrow().links.clone();
            let mut scheduler =
                Scheduler::new(&mut self.components, &links, end_time, self.stop.clone())?;
            scheduler.run()?;
        }

        for component in &mut self.components {
            if let Err(e) = component.finalize() {
                warn!(component = component.name(), error = %e, "finalize failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// A snapshot of every component's and link's state, for diagnostics
    /// and post-run reporting (spec.md §4.7 `metadata`).
    pub fn metadata(&self) -> serde_json::Value {
        let components: Vec<ComponentMetadata> =
            self.components.iter().map(Component::metadata).collect();
        let links = self.registry.borrow().links.clone();
        serde_json::json!({
            "logger_name": self.config.logger_name,
            "components": components,
            "links": links,
        })
    }
}
