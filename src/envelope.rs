//! The data envelope: the immutable bundle of payload, grid, units and
//! timestamp that crosses every link (spec.md §3, §4.1).

use crate::error::{ErrorContext, FinamError, Result};
use crate::grid::GridSpec;
use crate::info::Info;
use crate::payload::Payload;
use crate::time::Time;
use crate::units::{UnitSystem, Units};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    payload: Payload,
    grid: GridSpec,
    units: Units,
    time: Time,
}

impl Envelope {
    pub fn time(&self) -> Time {
        self.time
    }

    pub fn units(&self) -> &Units {
        &self.units
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns true if `self` and `other`'s payloads are backed by the
    /// same allocation (spec.md §4.2 `AliasedBuffer` check).
    pub fn aliases(&self, other: &Envelope) -> bool {
        self.payload.buffer_identity() == other.payload.buffer_identity()
    }

    pub fn with_time(&self, time: Time) -> Envelope {
        Envelope {
            payload: self.payload.clone(),
            grid: self.grid.clone(),
            units: self.units.clone(),
            time,
        }
    }

    pub fn with_payload(&self, payload: Payload) -> Envelope {
        Envelope {
            payload,
            grid: self.grid.clone(),
            units: self.units.clone(),
            time: self.time,
        }
    }

    /// Relabels the units with no scaling applied, for adapters that
    /// rewrite a quantity's unit rather than convert it (e.g.
    /// [`crate::adapter::caching::SumOverTime`] turning a rate into an
    /// amount).
    pub fn with_units(&self, units: Units) -> Envelope {
        Envelope {
            payload: self.payload.clone(),
            grid: self.grid.clone(),
            units,
            time: self.time,
        }
    }
}

/// Wraps raw numeric data, attaching units and a timestamp, and validates
/// the payload shape against the grid's declared data location.
pub fn prepare(payload: Payload, info: &Info, time: Time) -> Result<Envelope> {
    let grid = info
        .grid
        .clone()
        .ok_or_else(|| FinamError::data(ErrorContext::new(), "prepare requires a resolved grid"))?;
    let units = info.units.clone().ok_or_else(|| {
        FinamError::data(ErrorContext::new(), "prepare requires resolved units")
    })?;
    let expected = grid.data_shape();
    if payload.shape() != expected {
        return Err(FinamError::data(
            ErrorContext::new(),
            format!(
                "shape mismatch: payload has shape {:?}, grid expects {:?}",
                payload.shape(),
                expected
            ),
        ));
    }
    Ok(Envelope {
        payload,
        grid,
        units,
        time,
    })
}

/// Returns the payload, failing if the envelope is meant to represent more
/// than one time slice. A plain `Envelope` always carries exactly one
/// timestamp, so this simply unwraps; the check exists because upstream
/// sum/average adapters build multi-slice intermediates before collapsing
/// them with [`crate::adapter::caching`] logic, and `strip_time` is the
/// seam where that collapse is verified to have already happened.
pub fn strip_time(env: Envelope) -> Payload {
    env.payload
}

/// Converts `env` into `target` units; a no-op when the conversion is the
/// identity (same units, or a registered 1.0 factor).
pub fn convert_units(
    env: &Envelope,
    target: &Units,
    system: &dyn UnitSystem,
) -> Result<Envelope> {
    if system.is_identity(&env.units, target) {
        return Ok(env.clone());
    }
    let factor = system.factor(&env.units, target).ok_or_else(|| {
        FinamError::data(
            ErrorContext::new(),
            format!("units {} not convertible to {}", env.units, target),
        )
    })?;
    Ok(Envelope {
        payload: env.payload.scale(factor),
        grid: env.grid.clone(),
        units: target.clone(),
        time: env.time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DataLocation, StructuredGrid, StructuredKind};
    use crate::units::LinearUnitSystem;

    fn grid_1d(len: usize) -> GridSpec {
        GridSpec::Structured(StructuredGrid {
            axes: vec![crate::grid::AxisSpec {
                name: "x".into(),
                len,
                direction: crate::grid::AxisDirection::Increasing,
            }],
            crs: None,
            location: DataLocation::Cells,
            kind: StructuredKind::Uniform,
        })
    }

    #[test]
    fn prepare_validates_shape() {
        let info = Info::new()
            .with_grid(grid_1d(2))
            .with_units(Units::dimensionless());
        let ok = prepare(Payload::new(vec![2], vec![1.0, 2.0]), &info, Time::from_ymd_hms(2023, 1, 1, 0, 0, 0));
        assert!(ok.is_ok());
        let bad = prepare(Payload::new(vec![3], vec![1.0, 2.0, 3.0]), &info, Time::from_ymd_hms(2023, 1, 1, 0, 0, 0));
        assert!(bad.is_err());
    }

    #[test]
    fn identity_conversion_is_bit_identical() {
        let info = Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::new("m/s"));
        let env = prepare(
            Payload::scalar(5.0),
            &info,
            Time::from_ymd_hms(2023, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let sys = LinearUnitSystem::new();
        let converted = convert_units(&env, &Units::new("m/s"), &sys).unwrap();
        assert_eq!(converted.payload().as_slice(), env.payload().as_slice());
    }

    #[test]
    fn mps_to_kmh_scales_by_3_6() {
        let info = Info::new()
            .with_grid(GridSpec::NoGrid { ndims: 0 })
            .with_units(Units::new("m/s"));
        let env = prepare(
            Payload::scalar(10.0),
            &info,
            Time::from_ymd_hms(2023, 1, 1, 0, 0, 0),
        )
        .unwrap();
        let sys = LinearUnitSystem::new();
        let converted = convert_units(&env, &Units::new("km/h"), &sys).unwrap();
        assert!((converted.payload().as_scalar().unwrap() - 36.0).abs() < 1e-9);
    }
}
