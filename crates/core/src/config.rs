//! Run configuration
//!
//! Defaults reproduce the King et al. (2010) compressible benchmark case. A JSON
//! file may override any subset of the fields; missing fields keep their
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::BoxMesh;
use crate::reference::PhysicalConstants;
use crate::solver::TimeIntegrationScheme;
use crate::timestep::TimestepAdaptor;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its admissible range
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        /// Dotted path of the offending field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Mesh resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Cells along x
    pub nx: usize,
    /// Cells along y
    pub ny: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { nx: 40, ny: 40 }
    }
}

impl MeshConfig {
    /// Unit-square mesh at this resolution
    pub fn build(&self) -> BoxMesh {
        BoxMesh::unit_square(self.nx, self.ny)
    }
}

/// Time stepping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Simulation time at step 0
    pub initial_time: f64,
    /// Seed step
    pub initial_timestep: f64,
    /// Upper bound on any step
    pub maximum_timestep: f64,
    /// Largest ratio between consecutive steps
    pub increase_tolerance: f64,
    /// Target Courant number
    pub target_cfl: f64,
    /// Step limit
    pub max_steps: usize,
    /// Energy time integrator
    pub scheme: TimeIntegrationScheme,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            initial_time: 0.0,
            initial_timestep: 1e-6,
            maximum_timestep: 0.1,
            increase_tolerance: 1.5,
            target_cfl: 1.0,
            max_steps: 20000,
            scheme: TimeIntegrationScheme::default(),
        }
    }
}

impl TimeConfig {
    /// Adaptor seeded from these settings
    pub fn adaptor(&self) -> TimestepAdaptor {
        TimestepAdaptor::new(
            self.initial_timestep,
            self.maximum_timestep,
            self.increase_tolerance,
        )
        .with_target_cfl(self.target_cfl)
    }
}

/// Output cadence, termination tolerance and file locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Visualization cadence in steps
    pub output_frequency: usize,
    /// Convergence threshold on `maxchange`
    pub steady_state_tolerance: f64,
    /// Parameter log file
    pub log_path: PathBuf,
    /// Base path of the field VTK series
    pub vtk_path: PathBuf,
    /// Base path of the reference-state VTK series
    pub reference_path: PathBuf,
    /// Final checkpoint file
    pub checkpoint_path: PathBuf,
    /// Checkpoint to restart from
    pub restart_from: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_frequency: 50,
            steady_state_tolerance: 1e-9,
            log_path: PathBuf::from("params.log"),
            vtk_path: PathBuf::from("output.pvd"),
            reference_path: PathBuf::from("reference_state.pvd"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            restart_from: None,
        }
    }
}

/// Complete run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Mesh resolution
    pub mesh: MeshConfig,
    /// Non-dimensional numbers
    pub physics: PhysicalConstants,
    /// Time stepping
    pub time: TimeConfig,
    /// Output and termination
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Load a configuration from JSON, filling unspecified fields with defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] if the file cannot
    /// be read or parsed, or [`ConfigError::Invalid`] if it fails validation.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });

        if self.mesh.nx == 0 || self.mesh.ny == 0 {
            return invalid("mesh", "must have at least one cell per direction");
        }
        if !positive(self.physics.rayleigh) {
            return invalid("physics.rayleigh", "must be positive");
        }
        if !non_negative(self.physics.dissipation) {
            return invalid("physics.dissipation", "must be non-negative");
        }
        if !self.physics.surface_temperature.is_finite() {
            return invalid("physics.surface_temperature", "must be finite");
        }
        if !self.time.initial_time.is_finite() {
            return invalid("time.initial_time", "must be finite");
        }
        if !positive(self.time.initial_timestep) {
            return invalid("time.initial_timestep", "must be positive");
        }
        if !positive(self.time.maximum_timestep) {
            return invalid("time.maximum_timestep", "must be positive");
        }
        if !non_negative(self.time.increase_tolerance - 1.0) {
            return invalid("time.increase_tolerance", "must be at least 1");
        }
        if !positive(self.time.target_cfl) {
            return invalid("time.target_cfl", "must be positive");
        }
        if self.time.max_steps == 0 {
            return invalid("time.max_steps", "must be positive");
        }
        if self.output.output_frequency == 0 {
            return invalid("output.output_frequency", "must be positive");
        }
        if !non_negative(self.output.steady_state_tolerance) {
            return invalid("output.steady_state_tolerance", "must be non-negative");
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
