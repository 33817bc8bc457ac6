//! Compressible Mantle Convection Core Library
//!
//! Drives a 2-D compressible mantle convection model under the anelastic liquid
//! approximation (King et al. 2010 benchmark) to steady state. The library owns
//! the time loop and everything around it, while the PDE solves are delegated
//! to pluggable backends:
//!
//! - [`TimestepAdaptor`] picks each step length from the CFL condition
//! - [`StepOrchestrator`] runs the Stokes solve, then the energy solve
//! - [`DiagnosticsEngine`] computes Nusselt numbers, rms velocities and
//!   energy-balance residuals every step
//! - [`RunLoop`] is the explicit state machine tying it together, writing the
//!   parameter log, VTK snapshots and the final checkpoint
//!
//! ## Plugging in a backend
//!
//! Implement [`MomentumSolver`] and [`EnergySolver`] and hand boxed instances to
//! [`RunLoop::from_config`].

// Domain and reference state
pub mod mesh;
pub mod reference;

// Mutable simulation state and solver contracts
pub mod fields;
pub mod solver;

// Time stepping and diagnostics
pub mod diagnostics;
pub mod orchestrator;
pub mod timestep;

// Surfaces
pub mod config;
pub mod output;
pub mod simulation;

// Re-export the types most callers need
pub use config::{ConfigError, MeshConfig, OutputConfig, SimulationConfig, TimeConfig};
pub use diagnostics::{DiagnosticSnapshot, DiagnosticsEngine, TimeState};
pub use fields::{FieldError, FieldState, StokesSolution};
pub use mesh::{BoundaryId, BoxMesh, BOTTOM_ID, LEFT_ID, RIGHT_ID, TOP_ID};
pub use orchestrator::{StepOrchestrator, StepReport};
pub use reference::{AnelasticLiquidApproximation, PhysicalConstants, ReferenceState};
pub use simulation::{RunError, RunLoop, RunSettings, RunState, RunSummary, Sinks};
pub use solver::{
    EnergySolver, MomentumSolver, SolveStats, SolverDivergence, StokesBcs, TemperatureBcs,
    TimeIntegrationScheme, VelocityConstraint,
};
pub use timestep::TimestepAdaptor;
