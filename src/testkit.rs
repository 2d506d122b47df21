//! Closure-driven [`Behavior`] implementations for building ad hoc
//! time-stepping or stateless components without hand-writing a hosted
//! model for every test scenario.

use crate::component::{Behavior, ComponentKind};
use crate::connector::Connector;
use crate::error::Result;
use crate::time::Time;

type InitFn = Box<dyn FnMut(&mut Connector) -> Result<()>>;
type UpdateFn = Box<dyn FnMut(Time) -> Result<(Time, Option<Time>)>>;
type HookFn = Box<dyn FnMut() -> Result<()>>;

/// A [`Behavior`] whose lifecycle hooks are supplied as closures.
/// `on_update` is handed the component's current `time` and returns the
/// `(time, nextTime)` pair to adopt afterwards, matching the contract
/// `Component::update` checks against (spec.md §4.6).
pub struct ClosureComponent {
    name: String,
    kind: ComponentKind,
    time: Option<Time>,
    next_time: Option<Time>,
    on_initialize: InitFn,
    on_update: UpdateFn,
    on_validate: HookFn,
    on_finalize: HookFn,
}

impl std::fmt::Debug for ClosureComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureComponent")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("time", &self.time)
            .finish()
    }
}

impl ClosureComponent {
    pub fn time_stepping(
        name: impl Into<String>,
        start: Time,
        first_next_time: Time,
        on_initialize: impl FnMut(&mut Connector) -> Result<()> + 'static,
        on_update: impl FnMut(Time) -> Result<(Time, Option<Time>)> + 'static,
    ) -> Self {
        ClosureComponent {
            name: name.into(),
            kind: ComponentKind::TimeStepping,
            time: Some(start),
            next_time: Some(first_next_time),
            on_initialize: Box::new(on_initialize),
            on_update: Box::new(on_update),
            on_validate: Box::new(|| Ok(())),
            on_finalize: Box::new(|| Ok(())),
        }
    }

    pub fn stateless(
        name: impl Into<String>,
        on_initialize: impl FnMut(&mut Connector) -> Result<()> + 'static,
    ) -> Self {
        ClosureComponent {
            name: name.into(),
            kind: ComponentKind::Stateless,
            time: None,
            next_time: None,
            on_initialize: Box::new(on_initialize),
            on_update: Box::new(|t| Ok((t, None))),
            on_validate: Box::new(|| Ok(())),
            on_finalize: Box::new(|| Ok(())),
        }
    }

    pub fn with_validate(mut self, f: impl FnMut() -> Result<()> + 'static) -> Self {
        self.on_validate = Box::new(f);
        self
    }

    pub fn with_finalize(mut self, f: impl FnMut() -> Result<()> + 'static) -> Self {
        self.on_finalize = Box::new(f);
        self
    }
}

impl Behavior for ClosureComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn initialize(&mut self, connector: &mut Connector) -> Result<()> {
        (self.on_initialize)(connector)
    }

    fn validate(&mut self) -> Result<()> {
        (self.on_validate)()
    }

    fn update(&mut self) -> Result<()> {
        if let Some(time) = self.time {
            let (new_time, new_next_time) = (self.on_update)(time)?;
            self.time = Some(new_time);
            self.next_time = new_next_time;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        (self.on_finalize)()
    }

    fn time(&self) -> Option<Time> {
        self.time
    }

    fn next_time(&self) -> Option<Time> {
        self.next_time
    }
}
