//! Units are carried on every envelope and negotiated on every port, but
//! the actual unit-arithmetic engine is an external collaborator
//! (spec.md §1 Out of scope). This module defines the narrow interface the
//! core depends on — convertibility and a scalar conversion factor — plus
//! a small built-in [`LinearUnitSystem`] good enough to drive tests and a
//! default composition when no richer unit library is plugged in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Units(Option<String>);

impl Units {
    pub fn dimensionless() -> Self {
        Units(None)
    }

    pub fn new(symbol: impl Into<String>) -> Self {
        Units(Some(symbol.into()))
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.is_none()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(s) => f.write_str(s),
            None => f.write_str("1"),
        }
    }
}

/// The interface the core relies on for unit conversion. Out-of-scope
/// regridding/reprojection-style libraries are expected to supply a
/// richer implementation; `LinearUnitSystem` is the built-in default.
pub trait UnitSystem: std::fmt::Debug {
    fn is_convertible(&self, from: &Units, to: &Units) -> bool;

    /// Returns `value * factor(from, to)` as the conversion, or an error
    /// if the two units are not convertible.
    fn factor(&self, from: &Units, to: &Units) -> Option<f64>;

    fn is_identity(&self, from: &Units, to: &Units) -> bool {
        from == to || self.factor(from, to) == Some(1.0)
    }
}

/// A small registry of linear (scale-only, no offset) conversion factors,
/// sufficient for rate/amount-style units used throughout the test
/// scenarios (e.g. `m/s` -> `km/h`).
#[derive(Debug, Clone, Default)]
pub struct LinearUnitSystem {
    // symmetric pairs, keyed (from, to) -> factor such that to = from * factor
    factors: HashMap<(String, String), f64>,
}

impl LinearUnitSystem {
    pub fn new() -> Self {
        let mut factors = HashMap::new();
        // m/s -> km/h
        factors.insert(("m/s".to_string(), "km/h".to_string()), 3.6);
        factors.insert(("km/h".to_string(), "m/s".to_string()), 1.0 / 3.6);
        Self { factors }
    }

    pub fn with_factor(mut self, from: &str, to: &str, factor: f64) -> Self {
        self.factors
            .insert((from.to_string(), to.to_string()), factor);
        self.factors
            .insert((to.to_string(), from.to_string()), 1.0 / factor);
        self
    }
}

impl UnitSystem for LinearUnitSystem {
    fn is_convertible(&self, from: &Units, to: &Units) -> bool {
        from == to || self.factor(from, to).is_some()
    }

    fn factor(&self, from: &Units, to: &Units) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        match (from.symbol(), to.symbol()) {
            (Some(f), Some(t)) => self.factors.get(&(f.to_string(), t.to_string())).copied(),
            (None, None) => Some(1.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_detected() {
        let sys = LinearUnitSystem::new();
        let u = Units::new("m/s");
        assert!(sys.is_identity(&u, &u));
    }

    #[test]
    fn mps_to_kmh_factor() {
        let sys = LinearUnitSystem::new();
        let f = sys
            .factor(&Units::new("m/s"), &Units::new("km/h"))
            .unwrap();
        assert!((f - 3.6).abs() < 1e-9);
    }
}
