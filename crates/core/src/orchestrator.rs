//! One time step: Stokes solve, energy solve, derived fields
//!
//! The energy equation advects temperature with the step's velocity, so the
//! momentum solve always runs first. Each collaborator only receives the
//! sub-fields it may write; the full temperature is restored here afterwards.
//! The temperature each step starts from is copied before the energy solve, so
//! the change per step is measurable whether or not the backend keeps it.

use tracing::debug;

use crate::fields::FieldState;
use crate::solver::{
    EnergySolver, MomentumSolver, SolveStats, SolverDivergence, StokesBcs, TemperatureBcs,
};

/// Convergence reports of both solves in a step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    /// Momentum solve report
    pub momentum: SolveStats,
    /// Energy solve report
    pub energy: SolveStats,
}

/// Advances the simulation fields by one time step
pub struct StepOrchestrator {
    /// Backend-agnostic Stokes solver
    momentum: Box<dyn MomentumSolver>,
    /// Backend-agnostic energy solver
    energy: Box<dyn EnergySolver>,
    stokes_bcs: StokesBcs,
    temperature_bcs: TemperatureBcs,
    /// `T'` before the last energy solve
    previous: Vec<f64>,
}

impl StepOrchestrator {
    /// Create an orchestrator from the two solver collaborators and their
    /// boundary conditions
    pub fn new(
        momentum: Box<dyn MomentumSolver>,
        energy: Box<dyn EnergySolver>,
        stokes_bcs: StokesBcs,
        temperature_bcs: TemperatureBcs,
    ) -> Self {
        Self {
            momentum,
            energy,
            stokes_bcs,
            temperature_bcs,
            previous: Vec::new(),
        }
    }

    /// Advance `fields` by `dt`
    ///
    /// # Errors
    ///
    /// Returns [`SolverDivergence`] from whichever solve failed. The full
    /// temperature is consistent with the temperature perturbation even then.
    pub fn advance(
        &mut self,
        fields: &mut FieldState,
        dt: f64,
    ) -> Result<StepReport, SolverDivergence> {
        let momentum = {
            let (velocity, pressure, temperature, approximation) = fields.momentum_view();
            self.momentum.solve(
                velocity,
                pressure,
                temperature,
                approximation,
                &self.stokes_bcs,
            )?
        };
        debug!(
            solver = self.momentum.name(),
            iterations = momentum.iterations,
            residual = momentum.residual,
            "Momentum solve converged"
        );

        self.previous.clear();
        self.previous.extend_from_slice(fields.temperature());
        let energy = {
            let (temperature, velocity, approximation) = fields.energy_view();
            self.energy
                .solve(temperature, velocity, approximation, dt, &self.temperature_bcs)
        };
        fields.recompute_full_temperature();
        let energy = energy?;
        debug!(
            solver = self.energy.name(),
            iterations = energy.iterations,
            residual = energy.residual,
            "Energy solve converged"
        );

        Ok(StepReport { momentum, energy })
    }

    /// Temperature perturbation the last energy solve started from
    ///
    /// The backend's own copy is used when it has one of the right length.
    pub fn previous_temperature(&self) -> &[f64] {
        let retained = self.energy.previous_temperature();
        if retained.len() == self.previous.len() {
            retained
        } else {
            &self.previous
        }
    }

    /// Stokes boundary conditions
    pub fn stokes_bcs(&self) -> &StokesBcs {
        &self.stokes_bcs
    }

    /// Temperature boundary conditions
    pub fn temperature_bcs(&self) -> &TemperatureBcs {
        &self.temperature_bcs
    }

    /// Momentum solver in use
    pub fn momentum_solver(&self) -> &dyn MomentumSolver {
        self.momentum.as_ref()
    }

    /// Energy solver in use
    pub fn energy_solver(&self) -> &dyn EnergySolver {
        self.energy.as_ref()
    }
}
