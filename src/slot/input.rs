//! Standard Input slot: source binding, iterative info exchange, and the
//! automatic unit/grid-transform conversions applied on pull (spec.md
//! §4.3).

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::{apply_resolved_info, Input, Output, RequesterId};
use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::info::Info;
use crate::time::Time;
use crate::units::{LinearUnitSystem, UnitSystem};

#[derive(Debug)]
pub struct InputSlot {
    name: String,
    source: Option<Rc<RefCell<dyn Output>>>,
    requester: Option<RequesterId>,
    desired_info: Option<Info>,
    resolved_info: Option<Info>,
    units_system: Box<dyn UnitSystem>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>) -> Self {
        InputSlot {
            name: name.into(),
            source: None,
            requester: None,
            desired_info: None,
            resolved_info: None,
            units_system: Box::new(LinearUnitSystem::new()),
        }
    }

    /// Overrides the default [`LinearUnitSystem`] with a richer one, e.g.
    /// supplied by an external unit-arithmetic collaborator.
    pub fn with_units_system(mut self, system: Box<dyn UnitSystem>) -> Self {
        self.units_system = system;
        self
    }

    pub fn resolved_info(&self) -> Option<&Info> {
        self.resolved_info.as_ref()
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new().slot(self.name.clone())
    }
}

impl Input for InputSlot {
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

    /// Merges `desired` into what this input has asked for so far, then
    /// checks it against whatever the source has published. Called
    /// repeatedly during the Connect fixpoint as both sides refine their
    /// Info (spec.md §5 Connect).
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

    /// Default hook: a plain Input does nothing on notification and waits
    /// to be pulled explicitly (spec.md §4.3); `CallbackInput` overrides
    /// this to invoke its user callback instead.
    fn source_updated(&mut self, _time: Time) -> Result<()> {
        Ok(())
    }

    fn pull(&mut self, time: Time) -> Result<Envelope> {
        let (source, requester) = match (&self.source, self.requester) {
            (Some(s), Some(r)) => (s.clone(), r),
            _ => {
                return Err(FinamError::setup(
                    self.ctx().phase(Phase::Update),
                    "pull on an unbound input",
                ))
            }
        };
        let env = source.borrow_mut().get_data(time, requester)?;
        let env = apply_resolved_info(env, self.resolved_info.as_ref(), self.units_system.as_ref())?;
        trace!(slot = %self.name, %time, "pulled");
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::prepare;
    use crate::grid::GridSpec;
    use crate::payload::Payload;
    use crate::slot::{chain, output::OutputSlot};
    use crate::units::Units;

    #[test]
    fn pull_applies_unit_conversion() {
        let published = Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::new("m/s"));

        let output: Rc<RefCell<dyn Output>> = Rc::new(RefCell::new(OutputSlot::new("out")));
        let input: Rc<RefCell<dyn Input>> = Rc::new(RefCell::new(InputSlot::new("in")));

        output.borrow_mut().push_info(published.clone()).unwrap();
        chain(output.clone(), input.clone()).unwrap();

        let desired = Info::new().with_units(Units::new("km/h"));
        let resolved = input.borrow_mut().exchange_info(desired).unwrap();
        assert_eq!(resolved.units, Some(Units::new("km/h")));

        let t = Time::from_ymd_hms(2023, 1, 1, 0, 0, 0);
        let env = prepare(Payload::scalar(10.0), &published, t).unwrap();
        output.borrow_mut().push(env).unwrap();

        let pulled = input.borrow_mut().pull(t).unwrap();
        assert!((pulled.payload().as_scalar().unwrap() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn rebinding_a_source_fails() {
        let output_a: Rc<RefCell<dyn Output>> = Rc::new(RefCell::new(OutputSlot::new("a")));
        let output_b: Rc<RefCell<dyn Output>> = Rc::new(RefCell::new(OutputSlot::new("b")));
        let input: Rc<RefCell<dyn Input>> = Rc::new(RefCell::new(InputSlot::new("in")));
        chain(output_a, input.clone()).unwrap();
        assert!(chain(output_b, input).is_err());
    }
}
