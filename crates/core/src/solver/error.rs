use thiserror::Error;

/// A momentum or energy solve failed to converge
///
/// Fatal for the run: the driver stops at the step where it was raised.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{solver} solve diverged after {iterations} iterations (residual {residual:.3e})")]
pub struct SolverDivergence {
    /// Name of the failing solver
    pub solver: String,
    /// Iterations performed before giving up
    pub iterations: usize,
    /// Residual norm at failure (may be non-finite)
    pub residual: f64,
}

impl SolverDivergence {
    /// Create a divergence report
    pub fn new(solver: impl Into<String>, iterations: usize, residual: f64) -> Self {
        Self {
            solver: solver.into(),
            iterations,
            residual,
        }
    }
}
