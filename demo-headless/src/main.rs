mod backend;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use convection_core::{
    AnelasticLiquidApproximation, RunError, RunLoop, SimulationConfig, Sinks,
    TimeIntegrationScheme,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use backend::{GalerkinStokes, UpwindEnergy};

/// Energy time integrator
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scheme {
    /// θ = ½
    ImplicitMidpoint,
    /// θ = 1
    BackwardEuler,
}

impl From<Scheme> for TimeIntegrationScheme {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::ImplicitMidpoint => Self::ImplicitMidpoint,
            Scheme::BackwardEuler => Self::BackwardEuler,
        }
    }
}

/// Compressible mantle convection benchmark with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "convection-demo")]
#[command(about = "Compressible mantle convection (King et al. 2010) headless demo", long_about = None)]
struct Args {
    /// JSON configuration file; command-line values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cells along x
    #[arg(long)]
    nx: Option<usize>,

    /// Cells along y
    #[arg(long)]
    ny: Option<usize>,

    /// Rayleigh number
    #[arg(long)]
    rayleigh: Option<f64>,

    /// Dissipation number
    #[arg(long)]
    dissipation: Option<f64>,

    /// Non-dimensional surface temperature
    #[arg(long)]
    surface_temperature: Option<f64>,

    /// Step limit
    #[arg(short = 'n', long)]
    max_steps: Option<usize>,

    /// Write VTK output every N steps
    #[arg(short, long)]
    output_frequency: Option<usize>,

    /// Steady-state threshold on the per-step temperature change
    #[arg(short, long)]
    tolerance: Option<f64>,

    /// Seed time step
    #[arg(long)]
    initial_dt: Option<f64>,

    /// Largest time step
    #[arg(long)]
    max_dt: Option<f64>,

    /// Largest ratio between consecutive time steps
    #[arg(long)]
    growth: Option<f64>,

    /// Target Courant number
    #[arg(long)]
    target_cfl: Option<f64>,

    /// Energy time integrator
    #[arg(long, value_enum)]
    scheme: Option<Scheme>,

    /// Directory for the log, VTK files and checkpoint
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// Checkpoint to restart from
    #[arg(short, long)]
    restart: Option<PathBuf>,

    /// Discard all output (log, VTK, checkpoint)
    #[arg(long)]
    no_output: bool,

    /// Jacobi sweeps allowed per energy solve
    #[arg(long, default_value_t = 20000)]
    max_sweeps: usize,

    /// Relative convergence threshold of the energy relaxation
    #[arg(long, default_value_t = 1e-10)]
    solver_tolerance: f64,
}

impl Args {
    /// Layer the command-line values over the defaults or the config file
    fn config(&self) -> Result<SimulationConfig, RunError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };

        if let Some(nx) = self.nx {
            config.mesh.nx = nx;
        }
        if let Some(ny) = self.ny {
            config.mesh.ny = ny;
        }
        if let Some(ra) = self.rayleigh {
            config.physics.rayleigh = ra;
        }
        if let Some(di) = self.dissipation {
            config.physics.dissipation = di;
        }
        if let Some(t0) = self.surface_temperature {
            config.physics.surface_temperature = t0;
        }
        if let Some(steps) = self.max_steps {
            config.time.max_steps = steps;
        }
        if let Some(freq) = self.output_frequency {
            config.output.output_frequency = freq;
        }
        if let Some(tol) = self.tolerance {
            config.output.steady_state_tolerance = tol;
        }
        if let Some(dt) = self.initial_dt {
            config.time.initial_timestep = dt;
        }
        if let Some(dt) = self.max_dt {
            config.time.maximum_timestep = dt;
        }
        if let Some(growth) = self.growth {
            config.time.increase_tolerance = growth;
        }
        if let Some(cfl) = self.target_cfl {
            config.time.target_cfl = cfl;
        }
        if let Some(scheme) = self.scheme {
            config.time.scheme = scheme.into();
        }
        if let Some(dir) = &self.output_dir {
            let output = &mut config.output;
            output.log_path = dir.join("params.log");
            output.vtk_path = dir.join("output.pvd");
            output.reference_path = dir.join("reference_state.pvd");
            output.checkpoint_path = dir.join("checkpoint.json");
        }
        if let Some(restart) = &self.restart {
            config.output.restart_from = Some(restart.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<(), RunError> {
    let config = args.config()?;

    let mesh = Arc::new(config.mesh.build());
    let approximation = AnelasticLiquidApproximation::for_mesh(&mesh, config.physics);
    let momentum = GalerkinStokes::new(mesh.clone());
    let energy = UpwindEnergy::new(
        mesh,
        &approximation,
        config.time.scheme,
        args.max_sweeps,
        args.solver_tolerance,
    );

    let sinks = if args.no_output {
        Sinks::discard()
    } else {
        Sinks::files(&config.output).map_err(RunError::Output)?
    };

    println!("=== Compressible Convection Demo ===\n");
    println!(
        "Mesh: {}x{}, Ra = {:e}, Di = {}, T0 = {}",
        config.mesh.nx,
        config.mesh.ny,
        config.physics.rayleigh,
        config.physics.dissipation,
        config.physics.surface_temperature
    );
    println!(
        "Steps: {}, output every {}, tolerance {:e}, scheme {:?}\n",
        config.time.max_steps,
        config.output.output_frequency,
        config.output.steady_state_tolerance,
        config.time.scheme
    );

    let summary =
        RunLoop::from_config(&config, Box::new(momentum), Box::new(energy), sinks)?.run()?;

    println!("=== Simulation Complete ===");
    println!("State: {:?}", summary.state);
    println!("Steps: {}", summary.steps);
    println!("Final time: {:.6e}", summary.final_time);
    println!("Time step range: {:.3e} .. {:.3e}", summary.min_dt, summary.max_dt);
    println!("Wall time: {:.2?}", summary.wall_time);
    if let Some(s) = summary.last_snapshot {
        println!();
        println!("Nu top/base: {:.4} / {:.4}", s.nu_top, s.nu_base);
        println!("u_rms: {:.4} (surface {:.4})", s.u_rms, s.u_rms_surf);
        println!("<T>: {:.4}", s.avg_t);
        println!("Work/dissipation: {:.4e} / {:.4e}", s.rate_work_g, s.rate_viscous);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
