//! End-to-end run-loop behaviour with stub collaborators
//!
//! Run tests with: cargo test --test `run_loop_scenarios`

mod common;

use common::{
    build_loop, memory_sinks, settings, BrokenVisualization, FailingMomentum, IdleEnergy,
    MemoryCheckpoint, MemoryLog, NoOpMomentum, ScriptedEnergy, UniformFlow,
};
use convection_core::output::Checkpoint;
use convection_core::{RunError, RunLoop, RunState, SimulationConfig, Sinks};

// ═══════════════════════════════════════════════════════════════════════════════
// Terminal states
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_no_op_collaborators_converge_after_one_step() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        settings(5, 2, 1e-9),
        sinks,
    );
    let summary = run.run().unwrap();

    assert_eq!(summary.state, RunState::Converged);
    assert_eq!(summary.steps, 1);

    let recorded = recorded.borrow();
    assert!(recorded.header_written);
    assert_eq!(recorded.snapshots.len(), 1);
    assert_eq!(recorded.snapshots[0].maxchange, 0.0);
    assert_eq!(recorded.closed, 1);
    // Step 0 is an output step
    assert_eq!(recorded.frames.len(), 1);
    assert_eq!(recorded.reference_frames, vec![0]);
    assert_eq!(recorded.checkpoints.len(), 1);
}

#[test]
fn test_divergence_on_third_step() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::failing_on(3)),
        settings(100, 10, 1e-9),
        sinks,
    );
    let err = run.run().unwrap_err();

    match err {
        RunError::Divergence { step, source, .. } => {
            assert_eq!(step, 2);
            assert_eq!(source.solver, "scripted energy");
        }
        other => panic!("expected divergence, got {other}"),
    }

    let recorded = recorded.borrow();
    assert_eq!(recorded.snapshots.len(), 2);
    assert_eq!(recorded.closed, 1, "log must be flushed on divergence");
    assert!(recorded.checkpoints.is_empty(), "no checkpoint after divergence");
}

#[test]
fn test_momentum_divergence_is_fatal() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(FailingMomentum::on_call(2)),
        Box::new(ScriptedEnergy::shifting(1e-3)),
        settings(100, 10, 1e-9),
        sinks,
    );

    match run.run().unwrap_err() {
        RunError::Divergence { step, source, .. } => {
            assert_eq!(step, 1);
            assert_eq!(source.solver, "failing stokes");
        }
        other => panic!("expected divergence, got {other}"),
    }

    let recorded = recorded.borrow();
    assert_eq!(recorded.snapshots.len(), 1);
    assert_eq!(recorded.closed, 1);
    assert!(recorded.checkpoints.is_empty());
}

#[test]
fn test_energy_solver_without_previous_field_converges() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(IdleEnergy),
        settings(5, 2, 1e-9),
        sinks,
    );
    let summary = run.run().unwrap();

    assert_eq!(summary.state, RunState::Converged);
    assert_eq!(summary.steps, 1);
    assert_eq!(recorded.borrow().snapshots[0].maxchange, 0.0);
}

#[test]
fn test_zero_tolerance_runs_to_step_limit() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        settings(10, 4, 0.0),
        sinks,
    );
    let summary = run.run().unwrap();

    assert_eq!(summary.state, RunState::MaxStepsReached);
    assert_eq!(summary.steps, 10);

    let recorded = recorded.borrow();
    assert_eq!(recorded.snapshots.len(), 10);
    let steps: Vec<usize> = recorded.snapshots.iter().map(|s| s.timestep).collect();
    assert_eq!(steps, (0..10).collect::<Vec<_>>());
    // Output at steps 0, 4 and 8
    let frames: Vec<usize> = recorded.frames.iter().map(|f| f.0).collect();
    assert_eq!(frames, vec![0, 1, 2]);
    assert_eq!(recorded.checkpoints.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loop invariants
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_time_strictly_increases() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(UniformFlow(50.0)),
        Box::new(ScriptedEnergy::shifting(1e-4)),
        settings(25, 5, 1e-9),
        sinks,
    );
    let summary = run.run().unwrap();

    let recorded = recorded.borrow();
    let times: Vec<f64> = recorded.snapshots.iter().map(|s| s.time).collect();
    assert!(times.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(summary.final_time, *times.last().unwrap());

    // dx = 1/8, so the CFL bound is 1 / (50 * 8) = 2.5e-3
    for s in &recorded.snapshots {
        assert!(s.dt <= 2.5e-3 + 1e-15);
    }
    assert!(summary.max_dt <= 2.5e-3 + 1e-15);
    assert!(summary.min_dt > 0.0);
}

#[test]
fn test_output_fields_and_time_stamps() {
    let (sinks, recorded) = memory_sinks();
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::shifting(1e-3)),
        settings(3, 2, 1e-9),
        sinks,
    );
    run.run().unwrap();

    let recorded = recorded.borrow();
    let (frame, time, names) = &recorded.frames[1];
    assert_eq!(*frame, 1);
    // Frame 1 is written before step 2, at the end time of step 1
    assert_eq!(*time, recorded.snapshots[1].time);
    assert_eq!(names, &["Velocity", "Pressure", "Temperature", "FullTemperature"]);
}

#[test]
fn test_log_failures_do_not_stop_the_run() {
    let (mut sinks, recorded) = memory_sinks();
    sinks.log = Box::new(MemoryLog {
        recorded: recorded.clone(),
        broken: true,
    });
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        settings(3, 1, 0.0),
        sinks,
    );
    let summary = run.run().unwrap();

    assert_eq!(summary.state, RunState::MaxStepsReached);
    assert!(recorded.borrow().snapshots.is_empty());
    assert_eq!(recorded.borrow().checkpoints.len(), 1);
}

#[test]
fn test_visualization_failures_do_not_stop_the_run() {
    let (mut sinks, recorded) = memory_sinks();
    sinks.visualization = Box::new(BrokenVisualization);
    sinks.reference = Box::new(BrokenVisualization);
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        settings(4, 1, 0.0),
        sinks,
    );
    let summary = run.run().unwrap();

    assert_eq!(summary.state, RunState::MaxStepsReached);
    assert_eq!(summary.steps, 4);
    let recorded = recorded.borrow();
    assert!(recorded.frames.is_empty());
    assert_eq!(recorded.snapshots.len(), 4);
    assert_eq!(recorded.checkpoints.len(), 1);
}

#[test]
fn test_checkpoint_failure_is_fatal() {
    let (mut sinks, recorded) = memory_sinks();
    sinks.checkpoint = Box::new(MemoryCheckpoint {
        recorded: recorded.clone(),
        broken: true,
    });
    let run = build_loop(
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        settings(3, 1, 1e-9),
        sinks,
    );
    assert!(matches!(run.run(), Err(RunError::Checkpoint(_))));
    assert_eq!(recorded.borrow().snapshots.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed run and restart
// ═══════════════════════════════════════════════════════════════════════════════

fn file_config(dir: &std::path::Path) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.mesh.nx = 6;
    config.mesh.ny = 6;
    config.time.max_steps = 4;
    config.output.output_frequency = 2;
    config.output.steady_state_tolerance = 0.0;
    config.output.log_path = dir.join("params.log");
    config.output.vtk_path = dir.join("vtk/output.pvd");
    config.output.reference_path = dir.join("vtk/reference_state.pvd");
    config.output.checkpoint_path = dir.join("checkpoint.json");
    config
}

#[test]
fn test_file_sinks_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(dir.path());

    let run = RunLoop::from_config(
        &config,
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::shifting(1e-3)),
        Sinks::files(&config.output).unwrap(),
    )
    .unwrap();
    let first = run.run().unwrap();
    assert_eq!(first.state, RunState::MaxStepsReached);

    // Header plus one line per step
    let log = std::fs::read_to_string(&config.output.log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("timestep time dt maxchange"));
    assert_eq!(lines[4].split(' ').count(), 14);

    assert!(dir.path().join("vtk/output_0000.vtu").exists());
    assert!(dir.path().join("vtk/output_0001.vtu").exists());
    assert!(dir.path().join("vtk/output.pvd").exists());
    assert!(dir.path().join("vtk/reference_state_0000.vtu").exists());

    let checkpoint = Checkpoint::load(&config.output.checkpoint_path).unwrap();
    assert_eq!(checkpoint.time_state.time, first.final_time);
    assert!(checkpoint.temperature().is_some());
    assert!(checkpoint.stokes().is_some());

    // Restart continues the clock from the checkpoint
    let mut restart = config.clone();
    restart.output.restart_from = Some(config.output.checkpoint_path.clone());
    restart.output.log_path = dir.path().join("restart.log");
    let run = RunLoop::from_config(
        &restart,
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::shifting(1e-3)),
        Sinks::discard(),
    )
    .unwrap();
    assert_eq!(run.time().time, first.final_time);
    assert_eq!(run.fields().temperature(), checkpoint.temperature().unwrap());
    let second = run.run().unwrap();
    assert!(second.final_time > first.final_time);
}

#[test]
fn test_restart_from_missing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = file_config(dir.path());
    config.output.restart_from = Some(dir.path().join("missing.json"));

    let result = RunLoop::from_config(
        &config,
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        Sinks::discard(),
    );
    assert!(matches!(result, Err(RunError::Restart(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = SimulationConfig::default();
    config.time.max_steps = 0;
    let result = RunLoop::from_config(
        &config,
        Box::new(NoOpMomentum),
        Box::new(ScriptedEnergy::steady()),
        Sinks::discard(),
    );
    assert!(matches!(result, Err(RunError::Config(_))));
}
