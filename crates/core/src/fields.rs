//! Simulation field storage
//!
//! `FieldState` owns every nodal field the driver touches: the Stokes solution
//! (velocity and pressure), the temperature perturbation `T'` and the derived full
//! temperature `T = T' + T̄`, together with a shared handle on the immutable
//! reference state. Collaborators never see the whole struct mutably; the
//! orchestrator lends each of them only the sub-fields they are allowed to write.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::BoxMesh;
use crate::output::NamedField;
use crate::reference::AnelasticLiquidApproximation;

/// Amplitude of the cosine perturbation seeding the convection cell
const INITIAL_PERTURBATION: f64 = 0.05;

/// Errors raised when assembling a field state from raw data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// A field does not match the vertex count of the reference state
    #[error("field '{field}' has {found} values, expected {expected}")]
    LengthMismatch {
        /// Offending field name
        field: &'static str,
        /// Vertex count of the reference state
        expected: usize,
        /// Length provided
        found: usize,
    },
}

/// Mixed Stokes solution: velocity and pressure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StokesSolution {
    /// Nodal velocity
    pub velocity: Vec<Vector2<f64>>,
    /// Nodal pressure
    pub pressure: Vec<f64>,
}

impl StokesSolution {
    /// Motionless solution with zero pressure
    #[must_use]
    pub fn zeros(nodes: usize) -> Self {
        Self {
            velocity: vec![Vector2::zeros(); nodes],
            pressure: vec![0.0; nodes],
        }
    }
}

/// Velocity and pressure to write, temperature and approximation to read
pub(crate) type MomentumView<'a> = (
    &'a mut [Vector2<f64>],
    &'a mut [f64],
    &'a [f64],
    &'a AnelasticLiquidApproximation,
);

/// Mutable simulation fields plus the reference state they are measured against
#[derive(Debug, Clone)]
pub struct FieldState {
    approximation: Arc<AnelasticLiquidApproximation>,
    stokes: StokesSolution,
    temperature: Vec<f64>,
    full_temperature: Vec<f64>,
}

impl FieldState {
    /// Create a field state from a temperature perturbation, starting at rest
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::LengthMismatch`] if the temperature does not match
    /// the reference state.
    pub fn new(
        approximation: Arc<AnelasticLiquidApproximation>,
        temperature: Vec<f64>,
    ) -> Result<Self, FieldError> {
        let nodes = approximation.reference().len();
        Self::with_stokes(approximation, StokesSolution::zeros(nodes), temperature)
    }

    /// Create a field state from a temperature perturbation and a Stokes solution
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::LengthMismatch`] if any field does not match the
    /// reference state.
    pub fn with_stokes(
        approximation: Arc<AnelasticLiquidApproximation>,
        stokes: StokesSolution,
        temperature: Vec<f64>,
    ) -> Result<Self, FieldError> {
        let expected = approximation.reference().len();
        check_len("Temperature", expected, temperature.len())?;
        check_len("Velocity", expected, stokes.velocity.len())?;
        check_len("Pressure", expected, stokes.pressure.len())?;

        let mut state = Self {
            approximation,
            stokes,
            temperature,
            full_temperature: Vec::new(),
        };
        state.recompute_full_temperature();
        Ok(state)
    }

    /// Initial condition of the King et al. (2010) benchmark
    ///
    /// A linear conductive profile between the boundary values, overlain by a
    /// small `cos(πx) sin(πy)` perturbation that seeds a single convection cell.
    #[must_use]
    pub fn benchmark_initial_condition(
        mesh: &BoxMesh,
        approximation: Arc<AnelasticLiquidApproximation>,
    ) -> Self {
        let bottom = approximation.constants().bottom_temperature();
        let (width, height) = (mesh.width(), mesh.height());
        let temperature = mesh.interpolate(|x, y| {
            let (xs, ys) = (x / width, y / height);
            bottom * ((1.0 - ys) + INITIAL_PERTURBATION * (PI * xs).cos() * (PI * ys).sin())
        });
        let nodes = mesh.node_count();
        let mut state = Self {
            approximation,
            stokes: StokesSolution::zeros(nodes),
            temperature,
            full_temperature: Vec::new(),
        };
        state.recompute_full_temperature();
        state
    }

    /// Shared approximation (constants and reference state)
    pub fn approximation(&self) -> &Arc<AnelasticLiquidApproximation> {
        &self.approximation
    }

    /// Number of vertices every field is sampled on
    pub fn node_count(&self) -> usize {
        self.temperature.len()
    }

    /// Stokes solution
    pub fn stokes(&self) -> &StokesSolution {
        &self.stokes
    }

    /// Velocity field
    pub fn velocity(&self) -> &[Vector2<f64>] {
        &self.stokes.velocity
    }

    /// Pressure field
    pub fn pressure(&self) -> &[f64] {
        &self.stokes.pressure
    }

    /// Temperature perturbation `T'`
    pub fn temperature(&self) -> &[f64] {
        &self.temperature
    }

    /// Full temperature `T' + T̄`
    pub fn full_temperature(&self) -> &[f64] {
        &self.full_temperature
    }

    /// Fields written to the visualization sink, in output order
    pub fn named_fields(&self) -> [NamedField<'_>; 4] {
        [
            NamedField::vector("Velocity", &self.stokes.velocity),
            NamedField::scalar("Pressure", &self.stokes.pressure),
            NamedField::scalar("Temperature", &self.temperature),
            NamedField::scalar("FullTemperature", &self.full_temperature),
        ]
    }

    /// Borrow what the momentum solver may write and what it reads
    pub(crate) fn momentum_view(&mut self) -> MomentumView<'_> {
        (
            self.stokes.velocity.as_mut_slice(),
            self.stokes.pressure.as_mut_slice(),
            &self.temperature,
            &*self.approximation,
        )
    }

    /// Borrow what the energy solver may write and what it reads
    pub(crate) fn energy_view(
        &mut self,
    ) -> (&mut [f64], &[Vector2<f64>], &AnelasticLiquidApproximation) {
        (
            self.temperature.as_mut_slice(),
            &self.stokes.velocity,
            &*self.approximation,
        )
    }

    /// Restore `full_temperature = temperature + reference_temperature`
    pub(crate) fn recompute_full_temperature(&mut self) {
        let reference = &self.approximation.reference().temperature;
        self.full_temperature.clear();
        self.full_temperature.extend(
            self.temperature
                .iter()
                .zip(reference)
                .map(|(t, tbar)| t + tbar),
        );
    }
}

fn check_len(field: &'static str, expected: usize, found: usize) -> Result<(), FieldError> {
    if expected == found {
        Ok(())
    } else {
        Err(FieldError::LengthMismatch {
            field,
            expected,
            found,
        })
    }
}
