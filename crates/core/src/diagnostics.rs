//! Per-step geodynamical diagnostics
//!
//! Every quantity here is read-only with respect to the simulation: the engine
//! integrates over the mesh and returns an immutable [`DiagnosticSnapshot`].
//! Only `maxchange` (the L2 norm of the temperature change over the step) feeds
//! back into the run; the two energy-balance residuals are correctness checks
//! that should approach zero at steady state.

use std::sync::Arc;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fields::FieldState;
use crate::mesh::{BoundaryId, BoxMesh, BOTTOM_ID, TOP_ID};

/// Time bookkeeping of the run loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeState {
    /// Simulation time after the current step
    pub time: f64,
    /// Zero-based index of the current step
    pub step: usize,
    /// Length of the current step
    pub dt: f64,
}

/// Scalar diagnostics of one time step, in log-column order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    /// Step index
    pub timestep: usize,
    /// Simulation time after the step
    pub time: f64,
    /// Step length
    pub dt: f64,
    /// L2 norm of the temperature change over the step
    pub maxchange: f64,
    /// Domain rms velocity
    pub u_rms: f64,
    /// Surface rms velocity
    pub u_rms_surf: f64,
    /// Largest surface horizontal speed
    pub ux_max: f64,
    /// Bottom Nusselt number
    pub nu_base: f64,
    /// Top Nusselt number
    pub nu_top: f64,
    /// Heat-flux imbalance `| |nu_top| − |nu_base| |`
    pub energy: f64,
    /// Volume-averaged full temperature
    pub avg_t: f64,
    /// Rate of work against gravity
    pub rate_work_g: f64,
    /// Rate of viscous dissipation
    pub rate_viscous: f64,
    /// Work imbalance `|rate_work_g − rate_viscous|`
    pub energy_2: f64,
}

impl DiagnosticSnapshot {
    /// Log column names, in the order [`Self::values`] emits them
    pub const COLUMNS: [&'static str; 14] = [
        "timestep",
        "time",
        "dt",
        "maxchange",
        "u_rms",
        "u_rms_surf",
        "ux_max",
        "nu_base",
        "nu_top",
        "energy",
        "avg_t",
        "rate_work_g",
        "rate_viscous",
        "energy_2",
    ];

    /// Floating-point columns after `timestep`, in log order
    pub fn values(&self) -> [f64; 13] {
        [
            self.time,
            self.dt,
            self.maxchange,
            self.u_rms,
            self.u_rms_surf,
            self.ux_max,
            self.nu_base,
            self.nu_top,
            self.energy,
            self.avg_t,
            self.rate_work_g,
            self.rate_viscous,
            self.energy_2,
        ]
    }
}

/// Computes diagnostic snapshots from the simulation fields
#[derive(Debug, Clone)]
pub struct DiagnosticsEngine {
    mesh: Arc<BoxMesh>,
    bottom_id: BoundaryId,
    top_id: BoundaryId,
}

impl DiagnosticsEngine {
    /// Create an engine measuring fluxes on the bottom and top walls
    #[must_use]
    pub fn new(mesh: Arc<BoxMesh>) -> Self {
        Self::with_boundaries(mesh, BOTTOM_ID, TOP_ID)
    }

    /// Create an engine measuring fluxes on arbitrary boundaries
    #[must_use]
    pub fn with_boundaries(mesh: Arc<BoxMesh>, bottom_id: BoundaryId, top_id: BoundaryId) -> Self {
        Self {
            mesh,
            bottom_id,
            top_id,
        }
    }

    /// Mesh the engine integrates over
    pub fn mesh(&self) -> &BoxMesh {
        &self.mesh
    }

    /// Compute every diagnostic for the step described by `time`
    ///
    /// # Arguments
    ///
    /// * `fields` - Fields after the step
    /// * `time` - Time, index and length of the step
    /// * `previous_temperature` - Temperature perturbation before the step
    pub fn compute(
        &self,
        fields: &FieldState,
        time: &TimeState,
        previous_temperature: &[f64],
    ) -> DiagnosticSnapshot {
        let grad_t = self.mesh.gradient(fields.full_temperature());
        let nu_top = -self.boundary_flux(&grad_t, self.top_id);
        let nu_base = self.boundary_flux(&grad_t, self.bottom_id);
        let rate_work_g = self.rate_work_against_gravity(fields);
        let rate_viscous = self.rate_viscous_dissipation(fields);

        DiagnosticSnapshot {
            timestep: time.step,
            time: time.time,
            dt: time.dt,
            maxchange: self.temperature_change(fields.temperature(), previous_temperature),
            u_rms: self.u_rms(fields),
            u_rms_surf: self.u_rms_top(fields),
            ux_max: self.ux_max(fields, self.top_id),
            nu_base,
            nu_top,
            energy: (nu_top.abs() - nu_base.abs()).abs(),
            avg_t: self.t_avg(fields),
            rate_work_g,
            rate_viscous,
            energy_2: (rate_work_g - rate_viscous).abs(),
        }
    }

    /// `sqrt(∫ u·u dx / ∫ dx)`
    pub fn u_rms(&self, fields: &FieldState) -> f64 {
        let u = fields.velocity();
        (self.mesh.integrate_by(|n| u[n].norm_squared()) / self.mesh.area()).sqrt()
    }

    /// `sqrt(∫_top u·u ds / ∫_top ds)`
    pub fn u_rms_top(&self, fields: &FieldState) -> f64 {
        let u = fields.velocity();
        let length = self.mesh.boundary_length(self.top_id);
        if length == 0.0 {
            return 0.0;
        }
        (self
            .mesh
            .boundary_integrate_by(self.top_id, |n| u[n].norm_squared())
            / length)
            .sqrt()
    }

    /// Largest `|u_x|` on a boundary
    pub fn ux_max(&self, fields: &FieldState, id: BoundaryId) -> f64 {
        let u = fields.velocity();
        self.mesh
            .boundary_nodes(id)
            .into_iter()
            .map(|n| u[n].x.abs())
            .fold(0.0, f64::max)
    }

    /// Top Nusselt number (outward heat flux through the surface)
    pub fn nu_top(&self, fields: &FieldState) -> f64 {
        let grad_t = self.mesh.gradient(fields.full_temperature());
        -self.boundary_flux(&grad_t, self.top_id)
    }

    /// Bottom Nusselt number (heat flux into the domain through the base)
    pub fn nu_bottom(&self, fields: &FieldState) -> f64 {
        let grad_t = self.mesh.gradient(fields.full_temperature());
        self.boundary_flux(&grad_t, self.bottom_id)
    }

    /// Volume-averaged full temperature
    pub fn t_avg(&self, fields: &FieldState) -> f64 {
        self.mesh.integrate(fields.full_temperature()) / self.mesh.area()
    }

    /// `∫ Di · c̄p · ᾱ · ρ̄ · ḡ · T' · u_y dx`
    pub fn rate_work_against_gravity(&self, fields: &FieldState) -> f64 {
        let approximation = fields.approximation();
        let t = fields.temperature();
        let u = fields.velocity();
        self.mesh
            .integrate_by(|n| approximation.work_against_gravity(n, t[n], &u[n]))
    }

    /// `∫ (Di / Ra) · τ : ∇u dx`
    pub fn rate_viscous_dissipation(&self, fields: &FieldState) -> f64 {
        let approximation = fields.approximation();
        let grad_u = self.mesh.vector_gradient(fields.velocity());
        self.mesh
            .integrate_by(|n| approximation.viscous_dissipation(&grad_u[n]))
    }

    /// L2 norm of `current − previous` over the domain
    ///
    /// A previous field of the wrong length (a solver that has not run yet)
    /// yields infinity, which never satisfies a convergence tolerance.
    pub fn temperature_change(&self, current: &[f64], previous: &[f64]) -> f64 {
        if current.len() != previous.len() {
            warn!(
                current = current.len(),
                previous = previous.len(),
                "Previous temperature unavailable, change norm undefined"
            );
            return f64::INFINITY;
        }
        self.mesh
            .integrate_by(|n| {
                let d = current[n] - previous[n];
                d * d
            })
            .sqrt()
    }

    /// Mean outward normal gradient over a boundary
    fn boundary_flux(&self, grad: &[Vector2<f64>], id: BoundaryId) -> f64 {
        let length = self.mesh.boundary_length(id);
        if length == 0.0 {
            return 0.0;
        }
        let normal = self.mesh.outward_normal(id);
        self.mesh
            .boundary_integrate_by(id, |n| grad[n].dot(&normal))
            / length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::StokesSolution;
    use crate::reference::{AnelasticLiquidApproximation, PhysicalConstants};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn setup(n: usize, constants: PhysicalConstants) -> (Arc<BoxMesh>, Arc<AnelasticLiquidApproximation>) {
        let mesh = Arc::new(BoxMesh::unit_square(n, n));
        let approx = Arc::new(AnelasticLiquidApproximation::for_mesh(&mesh, constants));
        (mesh, approx)
    }

    /// Incompressible-reference constants: T̄ = 0, ρ̄ = 1
    fn boussinesq() -> PhysicalConstants {
        PhysicalConstants {
            rayleigh: 1e4,
            dissipation: 0.0,
            surface_temperature: 0.0,
        }
    }

    #[test]
    fn test_conductive_profile_has_unit_nusselt() {
        let (mesh, approx) = setup(16, boussinesq());
        let t = mesh.interpolate(|_, y| 1.0 - y);
        let fields = FieldState::new(approx, t).unwrap();
        let engine = DiagnosticsEngine::new(mesh);

        assert_relative_eq!(engine.nu_top(&fields), 1.0, epsilon = 1e-10);
        assert_relative_eq!(engine.nu_bottom(&fields), 1.0, epsilon = 1e-10);
        assert_relative_eq!(engine.t_avg(&fields), 0.5, epsilon = 1e-12);
        assert_eq!(engine.u_rms(&fields), 0.0);
    }

    #[test]
    fn test_velocity_norms() {
        let (mesh, approx) = setup(8, boussinesq());
        let nodes = mesh.node_count();
        let stokes = StokesSolution {
            velocity: vec![Vector2::new(3.0, -4.0); nodes],
            pressure: vec![0.0; nodes],
        };
        let fields = FieldState::with_stokes(approx, stokes, vec![0.0; nodes]).unwrap();
        let engine = DiagnosticsEngine::new(mesh);

        assert_relative_eq!(engine.u_rms(&fields), 5.0, epsilon = 1e-12);
        assert_relative_eq!(engine.u_rms_top(&fields), 5.0, epsilon = 1e-12);
        assert_eq!(engine.ux_max(&fields, TOP_ID), 3.0);
    }

    #[test]
    fn test_temperature_change_norm() {
        let (mesh, _) = setup(4, boussinesq());
        let engine = DiagnosticsEngine::new(mesh.clone());
        let current = vec![0.5; mesh.node_count()];
        let previous = vec![0.25; mesh.node_count()];

        assert_relative_eq!(engine.temperature_change(&current, &previous), 0.25, epsilon = 1e-12);
        assert_eq!(engine.temperature_change(&current, &current), 0.0);
        assert!(engine.temperature_change(&current, &[]).is_infinite());
    }

    #[test]
    fn test_snapshot_residuals_and_order() {
        let (mesh, approx) = setup(32, boussinesq());
        let nodes = mesh.node_count();
        // Single convection roll from ψ = sin(πx) sin(πy)
        let velocity: Vec<Vector2<f64>> = (0..nodes)
            .map(|n| {
                let (x, y) = mesh.coordinates(n);
                Vector2::new(PI * (PI * x).sin() * (PI * y).cos(), -PI * (PI * x).cos() * (PI * y).sin())
            })
            .collect();
        let t = mesh.interpolate(|_, y| 1.0 - y);
        let stokes = StokesSolution {
            velocity,
            pressure: vec![0.0; nodes],
        };
        let fields = FieldState::with_stokes(approx, stokes, t.clone()).unwrap();
        let engine = DiagnosticsEngine::new(mesh);
        let time = TimeState {
            time: 0.5,
            step: 7,
            dt: 0.01,
        };
        let snap = engine.compute(&fields, &time, &t);

        assert_eq!(snap.timestep, 7);
        assert_eq!(snap.values()[0], 0.5);
        assert_eq!(snap.maxchange, 0.0);
        assert_relative_eq!(snap.energy, (snap.nu_top.abs() - snap.nu_base.abs()).abs());
        assert_relative_eq!(snap.energy_2, (snap.rate_work_g - snap.rate_viscous).abs());
        // Di = 0 switches both work terms off
        assert_eq!(snap.rate_work_g, 0.0);
        assert_eq!(snap.rate_viscous, 0.0);
        assert!(snap.u_rms > 0.0);
        assert_eq!(DiagnosticSnapshot::COLUMNS.len(), snap.values().len() + 1);
    }
}
