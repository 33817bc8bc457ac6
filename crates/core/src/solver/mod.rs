//! Solver collaborator boundary
//!
//! The driver delegates the momentum and energy solves to an external backend.
//! This module defines the seam: the [`MomentumSolver`] and [`EnergySolver`]
//! traits, the boundary-condition sets they receive, the time integrator choice
//! and the single failure mode, [`SolverDivergence`].
//!
//! # Example
//!
//! ```rust,ignore
//! use convection_core::solver::{EnergySolver, MomentumSolver, StokesBcs, TemperatureBcs};
//!
//! let stokes_bcs = StokesBcs::free_slip_box();
//! let temp_bcs = TemperatureBcs::heated_from_below(approximation.constants().bottom_temperature());
//! ```

mod boundary;
mod error;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

pub use boundary::{StokesBcs, TemperatureBcs, VelocityConstraint};
pub use error::SolverDivergence;
pub use r#trait::{EnergySolver, MomentumSolver, SolveStats, TimeIntegrationScheme};
