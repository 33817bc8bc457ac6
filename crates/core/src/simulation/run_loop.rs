//! The time-stepping loop and its transitions

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{RunError, RunState, RunSummary};
use crate::config::{ConfigError, OutputConfig, SimulationConfig};
use crate::diagnostics::{DiagnosticSnapshot, DiagnosticsEngine, TimeState};
use crate::fields::{FieldError, FieldState};
use crate::mesh::BoxMesh;
use crate::orchestrator::StepOrchestrator;
use crate::output::{
    Checkpoint, CheckpointFile, CheckpointSink, LogSink, NullSink, OutputError, ParameterLog,
    VisualizationSink, VtkSeries,
};
use crate::reference::AnelasticLiquidApproximation;
use crate::solver::{
    EnergySolver, MomentumSolver, SolverDivergence, StokesBcs, TemperatureBcs,
    TimeIntegrationScheme,
};
use crate::timestep::TimestepAdaptor;

/// Termination and output cadence of a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    /// Step limit
    pub max_steps: usize,
    /// Visualization cadence in steps
    pub output_frequency: usize,
    /// Convergence threshold on `maxchange`
    pub steady_state_tolerance: f64,
    /// Simulation time at the first step
    pub initial_time: f64,
}

impl RunSettings {
    /// Settings taken from a run configuration
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            max_steps: config.time.max_steps,
            output_frequency: config.output.output_frequency,
            steady_state_tolerance: config.output.steady_state_tolerance,
            initial_time: config.time.initial_time,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

/// Output destinations owned by the loop
pub struct Sinks {
    /// Per-step diagnostics
    pub log: Box<dyn LogSink>,
    /// Simulation fields at the output cadence
    pub visualization: Box<dyn VisualizationSink>,
    /// Reference-state fields at the output cadence
    pub reference: Box<dyn VisualizationSink>,
    /// Final checkpoint
    pub checkpoint: Box<dyn CheckpointSink>,
}

impl Sinks {
    /// Sinks that discard all output
    pub fn discard() -> Self {
        Self {
            log: Box::new(NullSink),
            visualization: Box::new(NullSink),
            reference: Box::new(NullSink),
            checkpoint: Box::new(NullSink),
        }
    }

    /// File-backed sinks at the configured paths, creating missing directories
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::Io`] if a directory or the log file cannot be
    /// created.
    pub fn files(output: &OutputConfig) -> Result<Self, OutputError> {
        for path in [
            &output.log_path,
            &output.vtk_path,
            &output.reference_path,
            &output.checkpoint_path,
        ] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            log: Box::new(ParameterLog::create(&output.log_path)?),
            visualization: Box::new(VtkSeries::new(&output.vtk_path)),
            reference: Box::new(VtkSeries::new(&output.reference_path)),
            checkpoint: Box::new(CheckpointFile::new(&output.checkpoint_path)),
        })
    }
}

/// Owns the simulation state and drives it to a terminal [`RunState`]
pub struct RunLoop {
    mesh: Arc<BoxMesh>,
    fields: FieldState,
    adaptor: TimestepAdaptor,
    orchestrator: StepOrchestrator,
    diagnostics: DiagnosticsEngine,
    sinks: Sinks,
    settings: RunSettings,
    time: TimeState,
    state: RunState,
    steps_completed: usize,
    last_snapshot: Option<DiagnosticSnapshot>,
    /// Smallest and largest step taken so far
    dt_range: Option<(f64, f64)>,
}

impl RunLoop {
    /// Assemble a loop from its parts
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Field`] if `fields` is not sampled on `mesh`, or
    /// [`RunError::Config`] if the step limit or output cadence is zero.
    pub fn new(
        mesh: Arc<BoxMesh>,
        fields: FieldState,
        adaptor: TimestepAdaptor,
        orchestrator: StepOrchestrator,
        settings: RunSettings,
        sinks: Sinks,
    ) -> Result<Self, RunError> {
        if fields.node_count() != mesh.node_count() {
            return Err(FieldError::LengthMismatch {
                field: "Temperature",
                expected: mesh.node_count(),
                found: fields.node_count(),
            }
            .into());
        }

        if settings.max_steps == 0 {
            return Err(ConfigError::Invalid {
                field: "time.max_steps",
                reason: "must be at least 1",
            }
            .into());
        }
        if settings.output_frequency == 0 {
            return Err(ConfigError::Invalid {
                field: "output.output_frequency",
                reason: "must be at least 1",
            }
            .into());
        }

        let time = TimeState {
            time: settings.initial_time,
            step: 0,
            dt: adaptor.current(),
        };

        Ok(Self {
            diagnostics: DiagnosticsEngine::new(mesh.clone()),
            mesh,
            fields,
            adaptor,
            orchestrator,
            sinks,
            settings,
            time,
            state: RunState::Running,
            steps_completed: 0,
            last_snapshot: None,
            dt_range: None,
        })
    }

    /// Build the benchmark run described by `config`
    ///
    /// Sets up the unit-square mesh, the Adams-Williamson reference state, the
    /// free-slip and heated-from-below boundary conditions and either the
    /// benchmark initial condition or the fields of the restart checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] for an invalid configuration or
    /// [`RunError::Restart`] if the restart checkpoint cannot be used.
    pub fn from_config(
        config: &SimulationConfig,
        momentum: Box<dyn MomentumSolver>,
        energy: Box<dyn EnergySolver>,
        sinks: Sinks,
    ) -> Result<Self, RunError> {
        config.validate()?;

        let mesh = Arc::new(config.mesh.build());
        let approximation = Arc::new(AnelasticLiquidApproximation::for_mesh(
            &mesh,
            config.physics,
        ));
        let mut settings = RunSettings::from_config(config);
        let mut adaptor = config.time.adaptor();

        let fields = match &config.output.restart_from {
            Some(path) => {
                let checkpoint = Checkpoint::load(path).map_err(RunError::Restart)?;
                let fields = checkpoint
                    .restore(&mesh, approximation)
                    .map_err(RunError::Restart)?;
                settings.initial_time = checkpoint.time_state.time;
                if checkpoint.time_state.dt > 0.0 {
                    adaptor = TimestepAdaptor::new(
                        checkpoint.time_state.dt.min(config.time.maximum_timestep),
                        config.time.maximum_timestep,
                        config.time.increase_tolerance,
                    )
                    .with_target_cfl(config.time.target_cfl);
                }
                info!(
                    "Restarting from {} at t = {:.6e}",
                    path.display(),
                    settings.initial_time
                );
                fields
            }
            None => FieldState::benchmark_initial_condition(&mesh, approximation),
        };

        check_scheme(config.time.scheme, energy.as_ref());
        let orchestrator = StepOrchestrator::new(
            momentum,
            energy,
            StokesBcs::free_slip_box(),
            TemperatureBcs::heated_from_below(config.physics.bottom_temperature()),
        );

        info!(
            "Created {}x{} convection run: Ra = {:e}, Di = {}, T0 = {}",
            mesh.nx(),
            mesh.ny(),
            config.physics.rayleigh,
            config.physics.dissipation,
            config.physics.surface_temperature
        );
        Self::new(mesh, fields, adaptor, orchestrator, settings, sinks)
    }

    /// Current state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Time bookkeeping
    pub fn time(&self) -> &TimeState {
        &self.time
    }

    /// Simulation fields
    pub fn fields(&self) -> &FieldState {
        &self.fields
    }

    /// Domain mesh
    pub fn mesh(&self) -> &BoxMesh {
        &self.mesh
    }

    /// Run until a terminal state
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Divergence`] if a solver fails (no checkpoint is
    /// written) or [`RunError::Checkpoint`] if the final checkpoint cannot be
    /// saved.
    pub fn run(mut self) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        info!(
            momentum = self.orchestrator.momentum_solver().name(),
            energy = self.orchestrator.energy_solver().name(),
            scheme = ?self.orchestrator.energy_solver().scheme(),
            max_steps = self.settings.max_steps,
            "Starting time loop"
        );

        if let Err(e) = self.sinks.log.write_header() {
            warn!("Failed to write log header: {}", e);
        }

        let outcome = loop {
            if let Err(e) = self.step() {
                break Err(e);
            }
            if self.state.is_terminal() {
                break Ok(());
            }
        };
        self.finish(outcome, started)
    }

    /// One iteration of the state machine
    fn step(&mut self) -> Result<(), RunError> {
        self.emit_output();
        self.advance_time();

        if let Err(source) = self.advance_fields() {
            error!(
                step = self.time.step,
                t = self.time.time,
                "Solver diverged: {}",
                source
            );
            self.state = RunState::Diverged;
            return Err(RunError::Divergence {
                step: self.time.step,
                time: self.time.time,
                source,
            });
        }

        let snapshot = self.record_diagnostics();
        self.steps_completed += 1;

        match self
            .check_convergence(&snapshot)
            .or_else(|| self.check_step_limit())
        {
            Some(state) => self.state = state,
            None => self.time.step += 1,
        }
        Ok(())
    }

    /// Write fields and reference state on output steps
    fn emit_output(&mut self) {
        if self.time.step % self.settings.output_frequency != 0 {
            return;
        }
        let frame = self.time.step / self.settings.output_frequency;

        if let Err(e) = self.sinks.visualization.write(
            frame,
            self.time.time,
            &self.mesh,
            &self.fields.named_fields(),
        ) {
            warn!("Visualization output at step {} failed: {}", self.time.step, e);
        }

        let reference = self.fields.approximation().reference();
        if let Err(e) =
            self.sinks
                .reference
                .write(frame, self.time.time, &self.mesh, &reference.named_fields())
        {
            warn!("Reference-state output at step {} failed: {}", self.time.step, e);
        }
    }

    /// Pick the step length and move the clock
    fn advance_time(&mut self) {
        let dt = self
            .adaptor
            .update_timestep(&self.mesh, self.fields.velocity());
        self.time.dt = dt;
        self.time.time += dt;
        self.dt_range = Some(match self.dt_range {
            Some((lo, hi)) => (lo.min(dt), hi.max(dt)),
            None => (dt, dt),
        });
    }

    /// Stokes then energy solve
    fn advance_fields(&mut self) -> Result<(), SolverDivergence> {
        self.orchestrator.advance(&mut self.fields, self.time.dt)?;
        Ok(())
    }

    /// Compute and log this step's diagnostics
    fn record_diagnostics(&mut self) -> DiagnosticSnapshot {
        let snapshot = self.diagnostics.compute(
            &self.fields,
            &self.time,
            self.orchestrator.previous_temperature(),
        );
        if let Err(e) = self.sinks.log.append(&snapshot) {
            warn!("Failed to log step {}: {}", self.time.step, e);
        }
        debug!(
            step = snapshot.timestep,
            t = snapshot.time,
            dt = snapshot.dt,
            maxchange = snapshot.maxchange,
            "Step complete"
        );
        self.last_snapshot = Some(snapshot);
        snapshot
    }

    fn check_convergence(&self, snapshot: &DiagnosticSnapshot) -> Option<RunState> {
        (snapshot.maxchange < self.settings.steady_state_tolerance).then_some(RunState::Converged)
    }

    fn check_step_limit(&self) -> Option<RunState> {
        (self.time.step + 1 >= self.settings.max_steps).then_some(RunState::MaxStepsReached)
    }

    /// Close the log, then checkpoint unless the run diverged
    fn finish(
        &mut self,
        outcome: Result<(), RunError>,
        started: Instant,
    ) -> Result<RunSummary, RunError> {
        if let Err(e) = self.sinks.log.close() {
            warn!("Failed to close parameter log: {}", e);
        }
        outcome?;

        match self.state {
            RunState::Converged => info!(
                "Steady state reached after {} steps (t = {:.6e})",
                self.steps_completed, self.time.time
            ),
            _ => info!(
                "Step limit of {} reached (t = {:.6e})",
                self.settings.max_steps, self.time.time
            ),
        }

        let checkpoint = Checkpoint::from_fields(&self.mesh, self.time, &self.fields);
        self.sinks
            .checkpoint
            .save(&checkpoint)
            .map_err(RunError::Checkpoint)?;

        let (min_dt, max_dt) = self.dt_range.unwrap_or_default();
        Ok(RunSummary {
            state: self.state,
            steps: self.steps_completed,
            final_time: self.time.time,
            last_snapshot: self.last_snapshot,
            min_dt,
            max_dt,
            wall_time: started.elapsed(),
        })
    }
}

/// Warn when the configured integrator is not the one the energy solver runs
fn check_scheme(configured: TimeIntegrationScheme, energy: &dyn EnergySolver) -> bool {
    let actual = energy.scheme();
    if actual != configured {
        warn!(
            configured = ?configured,
            actual = ?actual,
            solver = energy.name(),
            "Configured time scheme differs from the energy solver's"
        );
    }
    actual == configured
}
