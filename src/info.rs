//! Port metadata descriptor, negotiated during the Connect fixpoint
//! (spec.md §3 Info, §4.1 Info operations, §9 Design Notes "metadata
//! absorbed from peer").

use std::collections::HashMap;

use crate::grid::{GridCompat, GridSpec};
use crate::time::Time;
use crate::units::{UnitSystem, Units};

#[derive(Debug, Clone, PartialEq)]
pub enum MaskPolicy {
    Flex,
    None,
    Explicit(Vec<bool>),
}

impl MaskPolicy {
    fn compatible(&self, other: &MaskPolicy) -> bool {
        match (self, other) {
            (MaskPolicy::Flex, _) | (_, MaskPolicy::Flex) => true,
            (MaskPolicy::None, MaskPolicy::None) => true,
            (MaskPolicy::Explicit(a), MaskPolicy::Explicit(b)) => a == b,
            _ => false,
        }
    }
}

/// Why two Infos were not accepted, for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    GridIncompatible,
    MaskIncompatible,
    UnitsIncompatible,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Reason::GridIncompatible => "grid incompatible",
            Reason::MaskIncompatible => "mask incompatible",
            Reason::UnitsIncompatible => "units incompatible",
        };
        f.write_str(s)
    }
}

/// Values are immutable once published; every mutation returns a new
/// `Info` (spec.md §4.1: "Infos are values, never mutated in place").
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub time: Option<Time>,
    pub grid: Option<GridSpec>,
    pub units: Option<Units>,
    pub mask: MaskPolicy,
    pub extra: HashMap<String, String>,
}

impl Default for Info {
    fn default() -> Self {
        Info {
            time: None,
            grid: None,
            units: None,
            mask: MaskPolicy::Flex,
            extra: HashMap::new(),
        }
    }
}

impl Info {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = Some(units);
        self
    }

    pub fn with_mask(mut self, mask: MaskPolicy) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_complete(&self) -> bool {
        self.grid.is_some() && self.units.is_some()
    }

    /// Returns a new `Info`: every unset field of `self` absorbs the
    /// corresponding field of `other`; set fields are kept as-is.
    /// Idempotent: `a.merge(&a.merge(&b)) == a.merge(&b)`.
    pub fn merge(&self, other: &Info) -> Info {
        let mut extra = other.extra.clone();
        extra.extend(self.extra.clone());
        Info {
            time: self.time.or(other.time),
            grid: self.grid.clone().or_else(|| other.grid.clone()),
            units: self.units.clone().or_else(|| other.units.clone()),
            mask: if matches!(self.mask, MaskPolicy::Flex) {
                other.mask.clone()
            } else {
                self.mask.clone()
            },
            extra,
        }
    }

    /// `copyWith`: a new Info with the given overrides layered on top.
    pub fn copy_with(&self, overrides: Info) -> Info {
        overrides.merge(self)
    }

    /// Checks grid, mask, and units compatibility only (spec.md §4.1).
    /// `from_downstream` is accepted for symmetry with the source's
    /// `accepts` call but does not change the compatibility rule itself.
    pub fn accepts(
        &self,
        incoming: &Info,
        units_system: &dyn UnitSystem,
        _from_downstream: bool,
    ) -> Result<(), Reason> {
        if let (Some(a), Some(b)) = (&self.grid, &incoming.grid) {
            if matches!(a.compatibility(b), GridCompat::Incompatible) {
                return Err(Reason::GridIncompatible);
            }
        }
        if !self.mask.compatible(&incoming.mask) {
            return Err(Reason::MaskIncompatible);
        }
        if let (Some(a), Some(b)) = (&self.units, &incoming.units) {
            if !units_system.is_convertible(b, a) {
                return Err(Reason::UnitsIncompatible);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::LinearUnitSystem;

    #[test]
    fn merge_is_idempotent() {
        let a = Info::new().with_units(Units::new("m/s"));
        let b = Info::new().with_grid(GridSpec::NoGrid { ndims: 0 });
        let once = a.merge(&b);
        let twice = once.merge(&b);
        assert_eq!(once, twice);
    }

    #[test]
    fn unset_fields_absorb_peer() {
        let a = Info::new();
        let b = Info::new().with_units(Units::new("m/s"));
        let merged = a.merge(&b);
        assert_eq!(merged.units, Some(Units::new("m/s")));
    }

    #[test]
    fn incompatible_units_rejected() {
        let sys = LinearUnitSystem::new();
        let a = Info::new().with_units(Units::new("kg"));
        let b = Info::new().with_units(Units::new("m/s"));
        assert_eq!(a.accepts(&b, &sys, false), Err(Reason::UnitsIncompatible));
    }
}
