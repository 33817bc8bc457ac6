//! Boundary conditions handed to the solver collaborators
//!
//! Both condition sets are keyed by [`BoundaryId`]; boundaries without an entry
//! are natural (stress-free for Stokes, zero-flux for energy).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::mesh::{BoundaryId, BoxMesh, BOTTOM_ID, LEFT_ID, RIGHT_ID, TOP_ID};

/// Strongly imposed velocity components on one boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityConstraint {
    /// Imposed horizontal velocity, if any
    pub ux: Option<f64>,
    /// Imposed vertical velocity, if any
    pub uy: Option<f64>,
}

impl VelocityConstraint {
    /// Constrain only the horizontal component
    pub const fn ux(value: f64) -> Self {
        Self {
            ux: Some(value),
            uy: None,
        }
    }

    /// Constrain only the vertical component
    pub const fn uy(value: f64) -> Self {
        Self {
            ux: None,
            uy: Some(value),
        }
    }
}

/// Stokes boundary conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StokesBcs {
    constraints: FxHashMap<BoundaryId, VelocityConstraint>,
}

impl StokesBcs {
    /// Free-slip on every wall of the box: no normal flow, free tangential flow
    #[must_use]
    pub fn free_slip_box() -> Self {
        let mut bcs = Self::default();
        bcs.insert(BOTTOM_ID, VelocityConstraint::uy(0.0));
        bcs.insert(TOP_ID, VelocityConstraint::uy(0.0));
        bcs.insert(LEFT_ID, VelocityConstraint::ux(0.0));
        bcs.insert(RIGHT_ID, VelocityConstraint::ux(0.0));
        bcs
    }

    /// Set the constraint on a boundary, replacing any previous one
    pub fn insert(&mut self, id: BoundaryId, constraint: VelocityConstraint) {
        self.constraints.insert(id, constraint);
    }

    /// Constraint on a boundary
    pub fn get(&self, id: BoundaryId) -> Option<&VelocityConstraint> {
        self.constraints.get(&id)
    }

    /// Whether every wall prescribes zero normal velocity
    ///
    /// Closed domains leave pressure defined only up to a constant, which the
    /// backend has to remove.
    pub fn is_closed(&self) -> bool {
        let normal = |id, pick: fn(&VelocityConstraint) -> Option<f64>| {
            self.get(id).and_then(pick) == Some(0.0)
        };
        normal(LEFT_ID, |c| c.ux)
            && normal(RIGHT_ID, |c| c.ux)
            && normal(BOTTOM_ID, |c| c.uy)
            && normal(TOP_ID, |c| c.uy)
    }
}

/// Dirichlet temperature conditions on the perturbation `T'`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBcs {
    values: FxHashMap<BoundaryId, f64>,
}

impl TemperatureBcs {
    /// Heated from below at `bottom`, cooled to zero at the top
    #[must_use]
    pub fn heated_from_below(bottom: f64) -> Self {
        let mut bcs = Self::default();
        bcs.insert(BOTTOM_ID, bottom);
        bcs.insert(TOP_ID, 0.0);
        bcs
    }

    /// Set the value on a boundary, replacing any previous one
    pub fn insert(&mut self, id: BoundaryId, value: f64) {
        self.values.insert(id, value);
    }

    /// Value imposed on a boundary
    pub fn get(&self, id: BoundaryId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    /// Iterate `(boundary, value)` pairs in boundary-id order
    pub fn iter(&self) -> impl Iterator<Item = (BoundaryId, f64)> {
        let mut pairs: Vec<(BoundaryId, f64)> = self.values.iter().map(|(&k, &v)| (k, v)).collect();
        pairs.sort_unstable_by_key(|&(id, _)| id);
        pairs.into_iter()
    }

    /// Overwrite boundary vertices of a nodal field with the imposed values
    ///
    /// Corners shared by two constrained walls take the value of the wall with
    /// the larger id, so horizontal walls win over vertical ones.
    pub fn apply(&self, mesh: &BoxMesh, values: &mut [f64]) {
        for (id, value) in self.iter() {
            for node in mesh.boundary_nodes(id) {
                values[node] = value;
            }
        }
    }

    /// Whether a vertex carries a Dirichlet value
    pub fn constrains(&self, mesh: &BoxMesh, node: usize) -> bool {
        let i = node % (mesh.nx() + 1);
        let j = node / (mesh.nx() + 1);
        (i == 0 && self.values.contains_key(&LEFT_ID))
            || (i == mesh.nx() && self.values.contains_key(&RIGHT_ID))
            || (j == 0 && self.values.contains_key(&BOTTOM_ID))
            || (j == mesh.ny() && self.values.contains_key(&TOP_ID))
    }
}
