//! Simulation driver
//!
//! [`RunLoop`] owns every piece of run state and advances it through an explicit
//! state machine:
//!
//! ```text
//! Running ──► Converged         maxchange < steady_state_tolerance
//!    │    ──► MaxStepsReached   step limit hit
//!    └────► Diverged            a solver collaborator failed (fatal)
//! ```
//!
//! Each iteration runs the named transitions `emit_output`, `advance_time`,
//! `advance_fields`, `record_diagnostics`, `check_convergence` and
//! `check_step_limit`; `finish` closes the sinks on every terminal state.

mod run_loop;

pub use run_loop::{RunLoop, RunSettings, Sinks};

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::diagnostics::DiagnosticSnapshot;
use crate::fields::FieldError;
use crate::output::OutputError;
use crate::solver::SolverDivergence;

/// Run-loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Steps remain to be taken
    Running,
    /// The temperature stopped changing
    Converged,
    /// The step limit was reached before steady state
    MaxStepsReached,
    /// A solver failed; no checkpoint is written
    Diverged,
}

impl RunState {
    /// Whether the loop has stopped
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Terminal state (`Converged` or `MaxStepsReached`)
    pub state: RunState,
    /// Steps completed
    pub steps: usize,
    /// Simulation time at the end of the last step
    pub final_time: f64,
    /// Diagnostics of the last step
    pub last_snapshot: Option<DiagnosticSnapshot>,
    /// Smallest step used
    pub min_dt: f64,
    /// Largest step used
    pub max_dt: f64,
    /// Wall-clock duration of the loop
    pub wall_time: Duration,
}

/// Errors that stop a run
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Initial fields do not match the mesh
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The restart checkpoint could not be loaded or applied
    #[error("cannot restart from checkpoint: {0}")]
    Restart(#[source] OutputError),

    /// The output sinks could not be opened
    #[error("cannot open output: {0}")]
    Output(#[source] OutputError),

    /// A solver collaborator diverged
    #[error("run diverged at step {step} (t = {time:e}): {source}")]
    Divergence {
        /// Step index of the failed step
        step: usize,
        /// Simulation time the step was heading for
        time: f64,
        /// Solver report
        #[source]
        source: SolverDivergence,
    },

    /// The final checkpoint could not be written
    #[error("cannot write checkpoint: {0}")]
    Checkpoint(#[source] OutputError),
}
