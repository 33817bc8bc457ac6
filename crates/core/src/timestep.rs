//! Adaptive time-step control
//!
//! The energy equation's advective term is stable only while material crosses less
//! than about one cell per step. `TimestepAdaptor` picks
//!
//! ```text
//! dt = min(maximum_timestep, increase_tolerance · previous_dt, cfl_bound)
//! ```
//!
//! where `cfl_bound = target_cfl / max(|u_x| / Δx, |u_y| / Δy)`. The growth cap
//! keeps the step from oscillating when the flow decelerates.

use nalgebra::Vector2;
use rayon::prelude::*;
use tracing::trace;

use crate::mesh::BoxMesh;

/// Cell-crossing rate below which the flow counts as stagnant
const STAGNANT_RATE: f64 = 1e-12;

/// CFL-based time-step controller
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepAdaptor {
    /// Step returned by the last update (the seed before the first one)
    current: f64,
    /// Upper bound on any step
    maximum: f64,
    /// Largest allowed ratio between consecutive steps
    increase_tolerance: f64,
    /// Target Courant number
    target_cfl: f64,
}

impl TimestepAdaptor {
    /// Create an adaptor seeded with `initial_dt`
    ///
    /// # Arguments
    ///
    /// * `initial_dt` - Seed step, used until the flow defines a CFL bound
    /// * `maximum` - Upper bound on any step
    /// * `increase_tolerance` - Maximum growth factor between steps (e.g. 1.5)
    ///
    /// The seed is assumed strictly positive; configuration validation enforces it.
    #[must_use]
    pub fn new(initial_dt: f64, maximum: f64, increase_tolerance: f64) -> Self {
        Self {
            current: initial_dt,
            maximum,
            increase_tolerance,
            target_cfl: 1.0,
        }
    }

    /// Set the target Courant number (default 1.0)
    pub fn with_target_cfl(mut self, target_cfl: f64) -> Self {
        self.target_cfl = target_cfl;
        self
    }

    /// Step returned by the last update
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Upper bound on any step
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Largest step the CFL criterion allows for `velocity`
    ///
    /// Returns `None` for a stagnant (or non-finite) field, where the bound is
    /// undefined.
    pub fn cfl_bound(&self, mesh: &BoxMesh, velocity: &[Vector2<f64>]) -> Option<f64> {
        let (dx, dy) = (mesh.dx(), mesh.dy());
        let rate = velocity
            .par_iter()
            .map(|u| (u.x.abs() / dx).max(u.y.abs() / dy))
            .reduce(|| 0.0, f64::max);

        if rate.is_finite() && rate > STAGNANT_RATE {
            Some(self.target_cfl / rate)
        } else {
            None
        }
    }

    /// Compute the next time step from the current velocity field
    ///
    /// Always strictly positive for a positive seed. With no CFL bound the previous
    /// step is kept (capped by the maximum).
    pub fn update_timestep(&mut self, mesh: &BoxMesh, velocity: &[Vector2<f64>]) -> f64 {
        let growth_cap = (self.increase_tolerance * self.current).min(self.maximum);
        let dt = match self.cfl_bound(mesh, velocity) {
            Some(bound) => bound.min(growth_cap),
            None => self.current.min(self.maximum),
        };

        trace!(previous = self.current, dt, "Time step updated");
        self.current = dt;
        dt
    }
}
