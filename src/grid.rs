//! Grid specifications. Concrete geometry (rectilinear/unstructured mesh
//! math, CRS reprojection) is out of scope (spec.md §1); this module only
//! carries enough structure for shape validation and for detecting the
//! narrow "compatible-by-transform" case (axis reversal/permutation) that
//! the core is allowed to resolve automatically, per spec.md §4.3.

use serde::{Deserialize, Serialize};

/// Where payload values live relative to grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataLocation {
    Cells,
    Points,
}

/// Axis orientation, used to detect compatible-by-transform grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisDirection {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub name: String,
    pub len: usize,
    pub direction: AxisDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredGrid {
    pub axes: Vec<AxisSpec>,
    pub crs: Option<String>,
    pub location: DataLocation,
    pub kind: StructuredKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuredKind {
    Uniform,
    Rectilinear,
    Esri,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredMesh {
    pub cell_count: usize,
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredPoints {
    pub point_count: usize,
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridSpec {
    NoGrid { ndims: usize },
    Structured(StructuredGrid),
    Unstructured(UnstructuredMesh),
    Points(UnstructuredPoints),
}

/// Result of comparing two grid specs for port-negotiation purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCompat {
    /// Identical in every respect.
    Exact,
    /// Compatible after applying the given axis permutation/reversal.
    /// `permutation[i]` is the source-axis index feeding target axis `i`;
    /// `reversed[i]` says whether that axis must additionally be flipped.
    Transform {
        permutation: Vec<usize>,
        reversed: Vec<bool>,
    },
    Incompatible,
}

impl GridSpec {
    /// The payload shape implied by this grid at its data location.
    pub fn data_shape(&self) -> Vec<usize> {
        match self {
            GridSpec::NoGrid { ndims } => vec![1; *ndims],
            GridSpec::Structured(s) => s.axes.iter().map(|a| a.len).collect(),
            GridSpec::Unstructured(m) => vec![m.cell_count],
            GridSpec::Points(p) => vec![p.point_count],
        }
    }

    pub fn compatibility(&self, other: &GridSpec) -> GridCompat {
        match (self, other) {
            (GridSpec::NoGrid { ndims: a }, GridSpec::NoGrid { ndims: b }) if a == b => {
                GridCompat::Exact
            }
            (GridSpec::Structured(a), GridSpec::Structured(b)) => structured_compat(a, b),
            (GridSpec::Unstructured(a), GridSpec::Unstructured(b)) if a == b => GridCompat::Exact,
            (GridSpec::Points(a), GridSpec::Points(b)) if a == b => GridCompat::Exact,
            _ => GridCompat::Incompatible,
        }
    }
}

fn structured_compat(a: &StructuredGrid, b: &StructuredGrid) -> GridCompat {
    if a.crs != b.crs || a.location != b.location || a.kind != b.kind {
        return GridCompat::Incompatible;
    }
    if a.axes.len() != b.axes.len() {
        return GridCompat::Incompatible;
    }
    if a == b {
        return GridCompat::Exact;
    }
    // Look for a permutation of b's axes (with optional reversal) matching a's
    // axes by name and length; this is the only automatic transform allowed.
    let n = a.axes.len();
    let mut permutation = vec![usize::MAX; n];
    let mut reversed = vec![false; n];
    let mut used = vec![false; n];
    for (i, target) in a.axes.iter().enumerate() {
        let mut found = false;
        for (j, candidate) in b.axes.iter().enumerate() {
            if used[j] || candidate.name != target.name || candidate.len != target.len {
                continue;
            }
            permutation[i] = j;
            reversed[i] = candidate.direction != target.direction;
            used[j] = true;
            found = true;
            break;
        }
        if !found {
            return GridCompat::Incompatible;
        }
    }
    GridCompat::Transform {
        permutation,
        reversed,
    }
}
