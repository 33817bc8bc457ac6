//! Final-state checkpoints
//!
//! A checkpoint carries the mesh descriptor, the time bookkeeping and a set of
//! named functions: the temperature perturbation under `"Temperature"` and the
//! mixed velocity/pressure field under `"Stokes"`. It is stored as pretty JSON
//! and can restore a [`FieldState`] for a restarted run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CheckpointSink, OutputError};
use crate::diagnostics::TimeState;
use crate::fields::{FieldState, StokesSolution};
use crate::mesh::BoxMesh;
use crate::reference::AnelasticLiquidApproximation;

/// Function name of the temperature perturbation
pub const TEMPERATURE: &str = "Temperature";
/// Function name of the mixed Stokes solution
pub const STOKES: &str = "Stokes";

/// One saved function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedFunction {
    /// Nodal scalar field
    Scalar {
        /// One value per vertex
        values: Vec<f64>,
    },
    /// Velocity and pressure
    Stokes(StokesSolution),
}

/// Serializable snapshot of the simulation at termination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Domain the functions are sampled on
    pub mesh: BoxMesh,
    /// Time, step index and step length when the checkpoint was taken
    pub time_state: TimeState,
    /// Named functions
    pub functions: BTreeMap<String, SavedFunction>,
}

impl Checkpoint {
    /// Capture the temperature and Stokes fields of `fields`
    pub fn from_fields(mesh: &BoxMesh, time_state: TimeState, fields: &FieldState) -> Self {
        let mut functions = BTreeMap::new();
        functions.insert(
            TEMPERATURE.to_string(),
            SavedFunction::Scalar {
                values: fields.temperature().to_vec(),
            },
        );
        functions.insert(
            STOKES.to_string(),
            SavedFunction::Stokes(fields.stokes().clone()),
        );
        Self {
            mesh: mesh.clone(),
            time_state,
            functions,
        }
    }

    /// Saved temperature perturbation, if present
    pub fn temperature(&self) -> Option<&[f64]> {
        match self.functions.get(TEMPERATURE)? {
            SavedFunction::Scalar { values } => Some(values),
            SavedFunction::Stokes(_) => None,
        }
    }

    /// Saved Stokes solution, if present
    pub fn stokes(&self) -> Option<&StokesSolution> {
        match self.functions.get(STOKES)? {
            SavedFunction::Stokes(stokes) => Some(stokes),
            SavedFunction::Scalar { .. } => None,
        }
    }

    /// Rebuild the field state on `mesh`
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::CheckpointMismatch`] if the checkpoint was taken on
    /// a different mesh, lacks a function, or holds fields of the wrong length.
    pub fn restore(
        &self,
        mesh: &BoxMesh,
        approximation: Arc<AnelasticLiquidApproximation>,
    ) -> Result<FieldState, OutputError> {
        if self.mesh != *mesh {
            return Err(OutputError::CheckpointMismatch(format!(
                "checkpoint mesh is {}x{}, run mesh is {}x{}",
                self.mesh.nx(),
                self.mesh.ny(),
                mesh.nx(),
                mesh.ny()
            )));
        }
        let temperature = self
            .temperature()
            .ok_or_else(|| OutputError::CheckpointMismatch(format!("missing '{TEMPERATURE}'")))?;
        let stokes = self
            .stokes()
            .ok_or_else(|| OutputError::CheckpointMismatch(format!("missing '{STOKES}'")))?;

        FieldState::with_stokes(approximation, stokes.clone(), temperature.to_vec())
            .map_err(|e| OutputError::CheckpointMismatch(e.to_string()))
    }

    /// Load a checkpoint from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OutputError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save the checkpoint to file, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written or state cannot be serialized
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), OutputError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

/// Checkpoint sink backed by a JSON file
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    /// Sink writing to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointSink for CheckpointFile {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), OutputError> {
        checkpoint.save(&self.path)?;
        info!(
            "Checkpoint at t = {:.6e} written to {}",
            checkpoint.time_state.time,
            self.path.display()
        );
        Ok(())
    }
}
