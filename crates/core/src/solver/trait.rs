//! Solver collaborator traits
//!
//! The momentum (Stokes) and energy solves belong to an external PDE backend. The
//! driver only relies on these contracts, so any backend (finite element, finite
//! difference, a test stub) can be plugged into the orchestrator.

use nalgebra::Vector2;

use super::boundary::{StokesBcs, TemperatureBcs};
use super::error::SolverDivergence;
use crate::reference::AnelasticLiquidApproximation;

/// Convergence report returned by a successful solve
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveStats {
    /// Iterations used by the backend (zero for direct solves)
    pub iterations: usize,
    /// Final residual norm
    pub residual: f64,
}

/// Two-level implicit time integrator used by the energy solve
///
/// Both members of the θ-family here are unconditionally stable for the
/// advection-diffusion operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeIntegrationScheme {
    /// θ = ½, second-order accurate
    #[default]
    ImplicitMidpoint,
    /// θ = 1, first-order accurate and strongly damping
    BackwardEuler,
}

impl TimeIntegrationScheme {
    /// Implicitness weight θ of the scheme
    pub const fn theta(self) -> f64 {
        match self {
            Self::ImplicitMidpoint => 0.5,
            Self::BackwardEuler => 1.0,
        }
    }
}

/// Backend-agnostic momentum (Stokes) solve
///
/// Updates velocity and pressure from the current temperature perturbation. Both
/// are lent as fixed-length slices, so a backend cannot resize the fields other
/// components index by vertex. The solve must either converge or report
/// [`SolverDivergence`]; the driver treats divergence as fatal and never retries.
pub trait MomentumSolver {
    /// Solve for the Stokes solution given the buoyancy from `temperature`
    ///
    /// # Arguments
    ///
    /// * `velocity` - Nodal velocity, overwritten in place
    /// * `pressure` - Nodal pressure, overwritten in place
    /// * `temperature` - Current temperature perturbation `T'`
    /// * `approximation` - Reference state and non-dimensional numbers
    /// * `bcs` - Velocity constraints keyed by boundary id
    ///
    /// # Errors
    ///
    /// Returns [`SolverDivergence`] if the backend fails to converge.
    fn solve(
        &mut self,
        velocity: &mut [Vector2<f64>],
        pressure: &mut [f64],
        temperature: &[f64],
        approximation: &AnelasticLiquidApproximation,
        bcs: &StokesBcs,
    ) -> Result<SolveStats, SolverDivergence>;

    /// Short name used in logs and error reports
    fn name(&self) -> &str {
        "stokes"
    }
}

/// Backend-agnostic energy solve
///
/// Advances the temperature perturbation over one time step with a two-level
/// implicit scheme. The solver may retain the temperature it started the step
/// from; the driver falls back to its own copy when it does not.
pub trait EnergySolver {
    /// Advance `temperature` by `dt` using the step's velocity
    ///
    /// # Arguments
    ///
    /// * `temperature` - Temperature perturbation `T'`, overwritten in place
    /// * `velocity` - Velocity from this step's momentum solve
    /// * `approximation` - Reference state and non-dimensional numbers
    /// * `dt` - Time step length
    /// * `bcs` - Dirichlet temperature values keyed by boundary id
    ///
    /// # Errors
    ///
    /// Returns [`SolverDivergence`] if the backend fails to converge.
    fn solve(
        &mut self,
        temperature: &mut [f64],
        velocity: &[Vector2<f64>],
        approximation: &AnelasticLiquidApproximation,
        dt: f64,
        bcs: &TemperatureBcs,
    ) -> Result<SolveStats, SolverDivergence>;

    /// Temperature perturbation at the start of the last solve, empty if the
    /// backend does not keep it
    fn previous_temperature(&self) -> &[f64] {
        &[]
    }

    /// Time integrator in use
    fn scheme(&self) -> TimeIntegrationScheme {
        TimeIntegrationScheme::ImplicitMidpoint
    }

    /// Short name used in logs and error reports
    fn name(&self) -> &str {
        "energy"
    }
}
