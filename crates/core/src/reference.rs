//! Compressible reference state and the Anelastic Liquid Approximation
//!
//! The reference state is motionless, steady and varies with depth only. Following
//! King et al. (2010) the density and temperature follow an adiabatic
//! Adams-Williamson profile:
//!
//! - `ρ̄(z) = exp(Di · z)`
//! - `T̄(z) = T0 · exp(Di · z) − T0`
//!
//! where `z = 1 − y / height` is the non-dimensional depth. Thermal expansivity,
//! specific heat, bulk modulus and gravity are held at one.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::mesh::BoxMesh;
use crate::output::NamedField;

/// Non-dimensional numbers controlling the convection problem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConstants {
    /// Rayleigh number `Ra`
    pub rayleigh: f64,
    /// Dissipation number `Di`
    pub dissipation: f64,
    /// Non-dimensional surface temperature `T0`
    pub surface_temperature: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            rayleigh: 1e5,
            dissipation: 0.5,
            surface_temperature: 0.091,
        }
    }
}

impl PhysicalConstants {
    /// Temperature perturbation imposed on the bottom boundary
    ///
    /// The full temperature at the base is one; the reference temperature there is
    /// `T0 · e^Di − T0`, so the perturbation carries the remainder.
    pub fn bottom_temperature(&self) -> f64 {
        let t0 = self.surface_temperature;
        1.0 - (t0 * self.dissipation.exp() - t0)
    }
}

/// Depth-dependent reference fields, sampled at mesh vertices
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceState {
    /// Reference density `ρ̄`
    pub density: Vec<f64>,
    /// Reference temperature `T̄`
    pub temperature: Vec<f64>,
    /// Isobaric thermal expansivity `ᾱ`
    pub expansivity: Vec<f64>,
    /// Isobaric specific heat capacity `c̄p`
    pub specific_heat: Vec<f64>,
    /// Isothermal bulk modulus `χ̄`
    pub bulk_modulus: Vec<f64>,
    /// Gravitational acceleration `ḡ`
    pub gravity: Vec<f64>,
}

impl ReferenceState {
    /// Build the Adams-Williamson reference state on a mesh
    #[must_use]
    pub fn adams_williamson(mesh: &BoxMesh, constants: &PhysicalConstants) -> Self {
        let di = constants.dissipation;
        let t0 = constants.surface_temperature;
        let height = mesh.height();
        let depth = |y: f64| 1.0 - y / height;

        let n = mesh.node_count();
        Self {
            density: mesh.interpolate(|_, y| (depth(y) * di).exp()),
            temperature: mesh.interpolate(|_, y| t0 * (depth(y) * di).exp() - t0),
            expansivity: vec![1.0; n],
            specific_heat: vec![1.0; n],
            bulk_modulus: vec![1.0; n],
            gravity: vec![1.0; n],
        }
    }

    /// Number of vertices the fields are sampled on
    pub fn len(&self) -> usize {
        self.temperature.len()
    }

    /// Whether the reference state holds no samples
    pub fn is_empty(&self) -> bool {
        self.temperature.is_empty()
    }

    /// Reference fields under their output names
    pub fn named_fields(&self) -> [NamedField<'_>; 6] {
        [
            NamedField::scalar("CompRefDensity", &self.density),
            NamedField::scalar("CompRefTemperature", &self.temperature),
            NamedField::scalar("IsobaricThermalExpansivity", &self.expansivity),
            NamedField::scalar("IsobaricSpecificHeatCapacity", &self.specific_heat),
            NamedField::scalar("IsothermalBulkModulus", &self.bulk_modulus),
            NamedField::scalar("GravitationalAcceleration", &self.gravity),
        ]
    }
}

/// Anelastic Liquid Approximation: constants plus the reference state
///
/// Built once at setup and shared read-only with every collaborator for the
/// whole run.
#[derive(Debug, Clone)]
pub struct AnelasticLiquidApproximation {
    constants: PhysicalConstants,
    reference: ReferenceState,
}

impl AnelasticLiquidApproximation {
    /// Create the approximation from constants and a matching reference state
    #[must_use]
    pub fn new(constants: PhysicalConstants, reference: ReferenceState) -> Self {
        Self {
            constants,
            reference,
        }
    }

    /// Build constants and the Adams-Williamson reference state for a mesh
    #[must_use]
    pub fn for_mesh(mesh: &BoxMesh, constants: PhysicalConstants) -> Self {
        let reference = ReferenceState::adams_williamson(mesh, &constants);
        Self::new(constants, reference)
    }

    /// Rayleigh number
    pub fn rayleigh(&self) -> f64 {
        self.constants.rayleigh
    }

    /// Dissipation number
    pub fn dissipation(&self) -> f64 {
        self.constants.dissipation
    }

    /// Physical constants
    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    /// Reference fields
    pub fn reference(&self) -> &ReferenceState {
        &self.reference
    }

    /// Buoyancy coefficient `Ra · ρ̄ · ᾱ · ḡ` at a vertex
    pub fn buoyancy_coefficient(&self, node: usize) -> f64 {
        let r = &self.reference;
        self.constants.rayleigh * r.density[node] * r.expansivity[node] * r.gravity[node]
    }

    /// Pointwise rate of work against gravity, `Di · c̄p · ᾱ · ρ̄ · ḡ · T' · u_y`
    pub fn work_against_gravity(&self, node: usize, temperature: f64, velocity: &Vector2<f64>) -> f64 {
        let r = &self.reference;
        self.constants.dissipation
            * r.specific_heat[node]
            * r.expansivity[node]
            * r.density[node]
            * r.gravity[node]
            * temperature
            * velocity.y
    }

    /// Pointwise viscous dissipation, `(Di / Ra) · τ : ∇u`
    ///
    /// `τ = ∇u + ∇uᵀ − ⅔ (∇·u) I` for unit viscosity.
    pub fn viscous_dissipation(&self, velocity_gradient: &Matrix2<f64>) -> f64 {
        let divergence = velocity_gradient.trace();
        let stress = velocity_gradient + velocity_gradient.transpose()
            - Matrix2::identity() * (2.0 / 3.0 * divergence);
        self.constants.dissipation / self.constants.rayleigh * stress.component_mul(velocity_gradient).sum()
    }
}
