//! Shared stub collaborators and in-memory sinks for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use convection_core::output::{
    Checkpoint, CheckpointSink, LogSink, NamedField, OutputError, VisualizationSink,
};
use convection_core::{
    AnelasticLiquidApproximation, BoxMesh, DiagnosticSnapshot, EnergySolver, FieldState,
    MomentumSolver, PhysicalConstants, RunLoop, RunSettings, Sinks, SolveStats,
    SolverDivergence, StepOrchestrator, StokesBcs, TemperatureBcs,
    TimestepAdaptor,
};
use nalgebra::Vector2;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Stub collaborators
// ═══════════════════════════════════════════════════════════════════════════════

/// Leaves the Stokes solution untouched
pub struct NoOpMomentum;

impl MomentumSolver for NoOpMomentum {
    fn solve(
        &mut self,
        _velocity: &mut [Vector2<f64>],
        _pressure: &mut [f64],
        _temperature: &[f64],
        _approximation: &AnelasticLiquidApproximation,
        _bcs: &StokesBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        Ok(SolveStats::default())
    }

    fn name(&self) -> &str {
        "no-op stokes"
    }
}

/// Sets a uniform horizontal flow
pub struct UniformFlow(pub f64);

impl MomentumSolver for UniformFlow {
    fn solve(
        &mut self,
        velocity: &mut [Vector2<f64>],
        _pressure: &mut [f64],
        _temperature: &[f64],
        _approximation: &AnelasticLiquidApproximation,
        _bcs: &StokesBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        velocity.fill(Vector2::new(self.0, 0.0));
        Ok(SolveStats::default())
    }
}

/// Fails on call `fail_on` (1-based)
pub struct FailingMomentum {
    pub fail_on: usize,
    calls: usize,
}

impl FailingMomentum {
    pub fn on_call(fail_on: usize) -> Self {
        Self { fail_on, calls: 0 }
    }
}

impl MomentumSolver for FailingMomentum {
    fn solve(
        &mut self,
        _velocity: &mut [Vector2<f64>],
        _pressure: &mut [f64],
        _temperature: &[f64],
        _approximation: &AnelasticLiquidApproximation,
        _bcs: &StokesBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        self.calls += 1;
        if self.calls == self.fail_on {
            return Err(SolverDivergence::new("failing stokes", 100, 1e6));
        }
        Ok(SolveStats::default())
    }

    fn name(&self) -> &str {
        "failing stokes"
    }
}

/// Shifts the temperature by `shift` each step and fails on step `fail_on`
/// (1-based) when set
pub struct ScriptedEnergy {
    pub shift: f64,
    pub fail_on: Option<usize>,
    calls: usize,
    previous: Vec<f64>,
}

impl ScriptedEnergy {
    pub fn steady() -> Self {
        Self::shifting(0.0)
    }

    pub fn shifting(shift: f64) -> Self {
        Self {
            shift,
            fail_on: None,
            calls: 0,
            previous: Vec::new(),
        }
    }

    pub fn failing_on(step: usize) -> Self {
        Self {
            fail_on: Some(step),
            ..Self::shifting(1e-3)
        }
    }
}

impl EnergySolver for ScriptedEnergy {
    fn solve(
        &mut self,
        temperature: &mut [f64],
        _velocity: &[Vector2<f64>],
        _approximation: &AnelasticLiquidApproximation,
        _dt: f64,
        _bcs: &TemperatureBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        self.calls += 1;
        self.previous = temperature.to_vec();
        if self.fail_on == Some(self.calls) {
            return Err(SolverDivergence::new("scripted energy", 50, f64::INFINITY));
        }
        temperature.iter_mut().for_each(|t| *t += self.shift);
        Ok(SolveStats {
            iterations: 1,
            residual: 0.0,
        })
    }

    fn previous_temperature(&self) -> &[f64] {
        &self.previous
    }
}

/// Leaves the temperature untouched and keeps no previous field
pub struct IdleEnergy;

impl EnergySolver for IdleEnergy {
    fn solve(
        &mut self,
        _temperature: &mut [f64],
        _velocity: &[Vector2<f64>],
        _approximation: &AnelasticLiquidApproximation,
        _dt: f64,
        _bcs: &TemperatureBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        Ok(SolveStats::default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory sinks
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the sinks received, shared with the test body
#[derive(Debug, Default)]
pub struct Recorded {
    pub header_written: bool,
    pub snapshots: Vec<DiagnosticSnapshot>,
    pub closed: usize,
    /// (frame, time, field names)
    pub frames: Vec<(usize, f64, Vec<String>)>,
    pub reference_frames: Vec<usize>,
    pub checkpoints: Vec<Checkpoint>,
}

pub type Shared = Rc<RefCell<Recorded>>;

pub struct MemoryLog {
    pub recorded: Shared,
    /// Fail every append, to exercise the warn-and-continue policy
    pub broken: bool,
}

impl LogSink for MemoryLog {
    fn write_header(&mut self) -> Result<(), OutputError> {
        self.recorded.borrow_mut().header_written = true;
        Ok(())
    }

    fn append(&mut self, snapshot: &DiagnosticSnapshot) -> Result<(), OutputError> {
        if self.broken {
            return Err(OutputError::Closed);
        }
        self.recorded.borrow_mut().snapshots.push(*snapshot);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.recorded.borrow_mut().closed += 1;
        Ok(())
    }
}

pub struct MemoryVisualization(pub Shared);

impl VisualizationSink for MemoryVisualization {
    fn write(
        &mut self,
        frame: usize,
        time: f64,
        _mesh: &BoxMesh,
        fields: &[NamedField<'_>],
    ) -> Result<(), OutputError> {
        let names = fields.iter().map(|f| f.name.to_string()).collect();
        self.0.borrow_mut().frames.push((frame, time, names));
        Ok(())
    }
}

pub struct MemoryReference(pub Shared);

impl VisualizationSink for MemoryReference {
    fn write(
        &mut self,
        frame: usize,
        _time: f64,
        _mesh: &BoxMesh,
        _fields: &[NamedField<'_>],
    ) -> Result<(), OutputError> {
        self.0.borrow_mut().reference_frames.push(frame);
        Ok(())
    }
}

/// Rejects every frame
pub struct BrokenVisualization;

impl VisualizationSink for BrokenVisualization {
    fn write(
        &mut self,
        _frame: usize,
        _time: f64,
        _mesh: &BoxMesh,
        _fields: &[NamedField<'_>],
    ) -> Result<(), OutputError> {
        Err(OutputError::Closed)
    }
}

pub struct MemoryCheckpoint {
    pub recorded: Shared,
    pub broken: bool,
}

impl CheckpointSink for MemoryCheckpoint {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), OutputError> {
        if self.broken {
            return Err(OutputError::CheckpointMismatch("disk full".into()));
        }
        self.recorded.borrow_mut().checkpoints.push(checkpoint.clone());
        Ok(())
    }
}

/// In-memory sinks plus the shared record they write to
pub fn memory_sinks() -> (Sinks, Shared) {
    let recorded = Shared::default();
    let sinks = Sinks {
        log: Box::new(MemoryLog {
            recorded: recorded.clone(),
            broken: false,
        }),
        visualization: Box::new(MemoryVisualization(recorded.clone())),
        reference: Box::new(MemoryReference(recorded.clone())),
        checkpoint: Box::new(MemoryCheckpoint {
            recorded: recorded.clone(),
            broken: false,
        }),
    };
    (sinks, recorded)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builders
// ═══════════════════════════════════════════════════════════════════════════════

pub fn settings(max_steps: usize, output_frequency: usize, tolerance: f64) -> RunSettings {
    RunSettings {
        max_steps,
        output_frequency,
        steady_state_tolerance: tolerance,
        initial_time: 0.0,
    }
}

/// Benchmark initial condition on an 8x8 unit square
pub fn benchmark_fields() -> (Arc<BoxMesh>, FieldState) {
    let mesh = Arc::new(BoxMesh::unit_square(8, 8));
    let approx = Arc::new(AnelasticLiquidApproximation::for_mesh(
        &mesh,
        PhysicalConstants::default(),
    ));
    let fields = FieldState::benchmark_initial_condition(&mesh, approx);
    (mesh, fields)
}

pub fn build_loop(
    momentum: Box<dyn MomentumSolver>,
    energy: Box<dyn EnergySolver>,
    settings: RunSettings,
    sinks: Sinks,
) -> RunLoop {
    let (mesh, fields) = benchmark_fields();
    let orchestrator = StepOrchestrator::new(
        momentum,
        energy,
        StokesBcs::free_slip_box(),
        TemperatureBcs::heated_from_below(PhysicalConstants::default().bottom_temperature()),
    );
    RunLoop::new(
        mesh,
        fields,
        TimestepAdaptor::new(1e-3, 0.1, 1.5),
        orchestrator,
        settings,
        sinks,
    )
    .unwrap()
}
