//! Stateless adapter logic: each answers a pull from a single upstream
//! value, with no memory of past pushes beyond the most recent one
//! (spec.md §4.5).

use crate::envelope::{convert_units, Envelope};
use crate::error::{ErrorContext, FinamError, Result};
use crate::grid::GridCompat;
use crate::info::Info;
use crate::payload::Payload;
use crate::time::Time;
use crate::units::{UnitSystem, Units};

use super::AdapterLogic;

/// Applies a pure payload transform to whatever passes through. Covers
/// scalar scaling, a user callback map, and the regridding/CRS
/// reprojection kernels that spec.md §1 marks as external collaborators:
/// all three just need a `Fn(&Payload) -> Payload` plugged in here.
pub struct PayloadMap<F> {
    last: Option<Envelope>,
    transform: F,
}

impl<F> std::fmt::Debug for PayloadMap<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadMap")
            .field("cached", &self.last.is_some())
            .finish()
    }
}

impl<F> PayloadMap<F>
where
    F: FnMut(&Payload) -> Payload,
{
    pub fn new(transform: F) -> Self {
        PayloadMap {
            last: None,
            transform,
        }
    }

    fn apply(&mut self, env: Envelope) -> Envelope {
        let transformed = (self.transform)(env.payload());
        env.with_payload(transformed)
    }
}

impl<F> AdapterLogic for PayloadMap<F>
where
    F: FnMut(&Payload) -> Payload,
{
    fn push(&mut self, env: Envelope) -> Result<()> {
        let applied = self.apply(env);
        self.last = Some(applied);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if let Some(cached) = &self.last {
            if cached.time() == time {
                return Ok(cached.clone());
            }
        }
        let env = pull_upstream(time)?;
        let applied = self.apply(env);
        self.last = Some(applied.clone());
        Ok(applied)
    }
}

/// Scales every value by a fixed factor, e.g. for a unit conversion the
/// active [`UnitSystem`] cannot resolve automatically.
pub fn scale(factor: f64) -> PayloadMap<impl FnMut(&Payload) -> Payload> {
    PayloadMap::new(move |p: &Payload| p.scale(factor))
}

/// Converts units via a [`UnitSystem`], independent of the automatic
/// conversion [`crate::slot::input::InputSlot`] already applies — useful
/// when an adapter chain needs an explicit unit step (e.g. before a
/// regridding stage that requires SI units).
#[derive(Debug)]
pub struct UnitConversion<S: UnitSystem> {
    target: Units,
    system: S,
    last: Option<Envelope>,
}

impl<S: UnitSystem> UnitConversion<S> {
    pub fn new(target: Units, system: S) -> Self {
        UnitConversion {
            target,
            system,
            last: None,
        }
    }
}

impl<S: UnitSystem> AdapterLogic for UnitConversion<S> {
    fn push(&mut self, env: Envelope) -> Result<()> {
        self.last = Some(convert_units(&env, &self.target, &self.system)?);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if let Some(cached) = &self.last {
            if cached.time() == time {
                return Ok(cached.clone());
            }
        }
        let env = pull_upstream(time)?;
        let converted = convert_units(&env, &self.target, &self.system)?;
        self.last = Some(converted.clone());
        Ok(converted)
    }

    fn get_info(&self, info: Info) -> Info {
        info.with_units(self.target.clone())
    }
}

/// Applies the automatic axis permutation/reversal transform, the only
/// grid adjustment the core resolves on its own (spec.md §4.3); anything
/// past `GridCompat::Transform` (true regridding/reprojection) is an
/// external collaborator's job and belongs in a [`PayloadMap`] instead.
#[derive(Debug)]
pub struct GridTransform {
    target: crate::grid::GridSpec,
    last: Option<Envelope>,
}

impl GridTransform {
    pub fn new(target: crate::grid::GridSpec) -> Self {
        GridTransform { target, last: None }
    }

    fn apply(&self, env: Envelope) -> Result<Envelope> {
        match self.target.compatibility(env.grid()) {
            GridCompat::Exact => Ok(env),
            GridCompat::Transform {
                permutation,
                reversed,
            } => {
                let transformed = env.payload().transform_axes(&permutation, &reversed);
                Ok(env.with_payload(transformed))
            }
            GridCompat::Incompatible => Err(FinamError::data(
                ErrorContext::new(),
                "grid transform adapter cannot bridge incompatible grids",
            )),
        }
    }
}

impl AdapterLogic for GridTransform {
    fn push(&mut self, env: Envelope) -> Result<()> {
        self.last = Some(self.apply(env)?);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if let Some(cached) = &self.last {
            if cached.time() == time {
                return Ok(cached.clone());
            }
        }
        let env = pull_upstream(time)?;
        let applied = self.apply(env)?;
        self.last = Some(applied.clone());
        Ok(applied)
    }

    fn get_info(&self, info: Info) -> Info {
        info.with_grid(self.target.clone())
    }
}

/// Shifts every timestamp by a fixed offset without buffering, i.e. a
/// stateless special case of the time-caching delay adapters in
/// `caching.rs`: used when the offset is small enough that the scheduler
/// never needs to look further back than the single most recent push.
#[derive(Debug)]
pub struct FixedOffset {
    offset: crate::time::TimeSpan,
    last: Option<Envelope>,
}

impl FixedOffset {
    pub fn new(offset: crate::time::TimeSpan) -> Self {
        FixedOffset { offset, last: None }
    }
}

impl AdapterLogic for FixedOffset {
    fn push(&mut self, env: Envelope) -> Result<()> {
        let shifted = env.with_time(env.time() + self.offset);
        self.last = Some(shifted);
        Ok(())
    }

    fn get(
        &mut self,
        time: Time,
        pull_upstream: &mut dyn FnMut(Time) -> Result<Envelope>,
    ) -> Result<Envelope> {
        if let Some(cached) = &self.last {
            if cached.time() == time {
                return Ok(cached.clone());
            }
        }
        let env = pull_upstream(time - self.offset)?;
        let shifted = env.with_time(time);
        self.last = Some(shifted.clone());
        Ok(shifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::prepare;
    use crate::grid::GridSpec;
    use crate::info::Info;

    fn dummy_info() -> Info {
        Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::new("m/s"))
    }

    #[test]
    fn payload_map_scales_cached_push() {
        let mut logic = scale(2.0);
        let t = Time::from_ymd_hms(2023, 1, 1, 0, 0, 0);
        let env = prepare(Payload::scalar(3.0), &dummy_info(), t).unwrap();
        logic.push(env).unwrap();
        let out = logic.get(t, &mut |_| unreachable!("cache hit expected")).unwrap();
        assert_eq!(out.payload().as_scalar(), Some(6.0));
    }

    #[test]
    fn payload_map_falls_back_to_upstream_pull() {
        let mut logic = scale(10.0);
        let t = Time::from_ymd_hms(2023, 1, 1, 0, 0, 0);
        let out = logic
            .get(t, &mut |time| {
                Ok(prepare(Payload::scalar(1.5), &dummy_info(), time).unwrap())
            })
            .unwrap();
        assert_eq!(out.payload().as_scalar(), Some(15.0));
    }

    #[test]
    fn fixed_offset_shifts_forward_on_push() {
        let mut logic = FixedOffset::new(crate::time::TimeSpan::days(1));
        let t0 = Time::from_ymd_hms(2023, 1, 1, 0, 0, 0);
        let env = prepare(Payload::scalar(1.0), &dummy_info(), t0).unwrap();
        logic.push(env).unwrap();
        let out = logic
            .get(t0 + crate::time::TimeSpan::days(1), &mut |_| {
                unreachable!("cache hit expected")
            })
            .unwrap();
        assert_eq!(out.time(), t0 + crate::time::TimeSpan::days(1));
    }
}
