//! Output sinks owned by the run loop
//!
//! Three destinations, with different failure policies:
//! - [`LogSink`]: one diagnostics line per step; failures are reported and the
//!   run continues.
//! - [`VisualizationSink`]: field snapshots at the output cadence; failures are
//!   reported and the run continues.
//! - [`CheckpointSink`]: a single write at termination; failure is fatal.

pub mod checkpoint;
pub mod parameter_log;
pub mod vtk;

pub use checkpoint::{Checkpoint, CheckpointFile, SavedFunction};
pub use parameter_log::ParameterLog;
pub use vtk::{write_vtu, VtkSeries};

use nalgebra::Vector2;
use thiserror::Error;

use crate::diagnostics::DiagnosticSnapshot;
use crate::mesh::BoxMesh;

/// Error type for every sink
#[derive(Debug, Error)]
pub enum OutputError {
    /// I/O error during file operations
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint (de)serialisation failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A field does not have one value per mesh vertex
    #[error("field '{name}' has {found} values, mesh has {expected} vertices")]
    FieldLength {
        /// Field name
        name: String,
        /// Mesh vertex count
        expected: usize,
        /// Values provided
        found: usize,
    },

    /// A checkpoint lacks a required function or does not match the mesh
    #[error("checkpoint mismatch: {0}")]
    CheckpointMismatch(String),

    /// The sink was already closed
    #[error("sink already closed")]
    Closed,
}

/// Borrowed nodal values of one field
#[derive(Debug, Clone, Copy)]
pub enum FieldValues<'a> {
    /// One value per vertex
    Scalar(&'a [f64]),
    /// One 2-vector per vertex
    Vector(&'a [Vector2<f64>]),
}

impl FieldValues<'_> {
    /// Number of vertices covered
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector(v) => v.len(),
        }
    }

    /// Whether no values are present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A field with the name it is written under
#[derive(Debug, Clone, Copy)]
pub struct NamedField<'a> {
    /// Output name
    pub name: &'a str,
    /// Nodal values
    pub values: FieldValues<'a>,
}

impl<'a> NamedField<'a> {
    /// Named scalar field
    pub fn scalar(name: &'a str, values: &'a [f64]) -> Self {
        Self {
            name,
            values: FieldValues::Scalar(values),
        }
    }

    /// Named vector field
    pub fn vector(name: &'a str, values: &'a [Vector2<f64>]) -> Self {
        Self {
            name,
            values: FieldValues::Vector(values),
        }
    }
}

/// Append-only per-step diagnostics record
pub trait LogSink {
    /// Write the column header line
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] if the line cannot be written.
    fn write_header(&mut self) -> Result<(), OutputError>;

    /// Append one snapshot as a line
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] if the line cannot be written.
    fn append(&mut self, snapshot: &DiagnosticSnapshot) -> Result<(), OutputError>;

    /// Flush and close; later calls are no-ops
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] if buffered lines cannot be flushed.
    fn close(&mut self) -> Result<(), OutputError>;
}

/// Destination for field snapshots
pub trait VisualizationSink {
    /// Write `fields` as output frame `frame` at simulation time `time`
    ///
    /// Writing the same frame again replaces it.
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] on I/O failure or mismatched field lengths.
    fn write(
        &mut self,
        frame: usize,
        time: f64,
        mesh: &BoxMesh,
        fields: &[NamedField<'_>],
    ) -> Result<(), OutputError>;
}

/// Destination for the final checkpoint
pub trait CheckpointSink {
    /// Persist a checkpoint, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an [`OutputError`] if the checkpoint cannot be written.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), OutputError>;
}

/// Sink that discards everything
///
/// Used when an output destination is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_header(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    fn append(&mut self, _snapshot: &DiagnosticSnapshot) -> Result<(), OutputError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}

impl VisualizationSink for NullSink {
    fn write(
        &mut self,
        _frame: usize,
        _time: f64,
        _mesh: &BoxMesh,
        _fields: &[NamedField<'_>],
    ) -> Result<(), OutputError> {
        Ok(())
    }
}

impl CheckpointSink for NullSink {
    fn save(&mut self, _checkpoint: &Checkpoint) -> Result<(), OutputError> {
        Ok(())
    }
}
