//! Minimal PDE backend for the headless demo
//!
//! Just enough numerics to drive the benchmark end to end:
//!
//! - [`GalerkinStokes`] projects the buoyancy onto the gravest free-slip
//!   stream-function mode `ψ = A sin(πx/W) sin(πy/H)`, which satisfies the
//!   free-slip box conditions exactly. Pressure is not resolved and stays zero.
//! - [`UpwindEnergy`] advances the temperature perturbation with a first-order
//!   upwind finite-difference operator and a θ-scheme in time, relaxing the
//!   implicit system with parallel Jacobi sweeps.

use std::f64::consts::PI;
use std::sync::Arc;

use convection_core::{
    AnelasticLiquidApproximation, BoxMesh, EnergySolver, MomentumSolver, SolveStats,
    SolverDivergence, StokesBcs, TemperatureBcs, TimeIntegrationScheme,
};
use nalgebra::Vector2;
use rayon::prelude::*;

/// Single-mode Galerkin Stokes solve for a free-slip box
pub struct GalerkinStokes {
    mesh: Arc<BoxMesh>,
}

impl GalerkinStokes {
    pub fn new(mesh: Arc<BoxMesh>) -> Self {
        Self { mesh }
    }
}

impl MomentumSolver for GalerkinStokes {
    fn solve(
        &mut self,
        velocity: &mut [Vector2<f64>],
        pressure: &mut [f64],
        temperature: &[f64],
        approximation: &AnelasticLiquidApproximation,
        bcs: &StokesBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        // The basis only represents a box with no normal flow through any wall
        if !bcs.is_closed() {
            return Err(SolverDivergence::new(self.name(), 0, f64::NAN));
        }

        let mesh = &self.mesh;
        let (w, h) = (mesh.width(), mesh.height());
        let (kx, ky) = (PI / w, PI / h);
        let mode = |node: usize| {
            let (x, y) = mesh.coordinates(node);
            (kx * x).sin() * (ky * y).sin()
        };

        // ∇⁴φ = (kx² + ky²)² φ and ⟨φ, φ⟩ = WH/4
        let grad_t = mesh.gradient(temperature);
        let forcing =
            mesh.integrate_by(|n| approximation.buoyancy_coefficient(n) * grad_t[n].x * mode(n));
        let stiffness = (kx * kx + ky * ky).powi(2) * w * h / 4.0;
        let amplitude = forcing / stiffness;
        if !amplitude.is_finite() {
            return Err(SolverDivergence::new(self.name(), 1, amplitude));
        }

        velocity
            .par_iter_mut()
            .enumerate()
            .for_each(|(node, u)| {
                let (x, y) = mesh.coordinates(node);
                *u = Vector2::new(
                    amplitude * ky * (kx * x).sin() * (ky * y).cos(),
                    -amplitude * kx * (kx * x).cos() * (ky * y).sin(),
                );
            });
        pressure.fill(0.0);

        Ok(SolveStats {
            iterations: 0,
            residual: 0.0,
        })
    }

    fn name(&self) -> &str {
        "galerkin stokes"
    }
}

/// Upwind θ-scheme energy solve relaxed with Jacobi sweeps
pub struct UpwindEnergy {
    mesh: Arc<BoxMesh>,
    scheme: TimeIntegrationScheme,
    max_sweeps: usize,
    tolerance: f64,
    /// `∇²T̄`, the conduction of the reference profile
    reference_conduction: Vec<f64>,
    previous: Vec<f64>,
}

impl UpwindEnergy {
    /// Create a solver for `mesh`
    ///
    /// # Arguments
    ///
    /// * `max_sweeps` - Jacobi sweeps allowed per step before reporting divergence
    /// * `tolerance` - Largest update (relative to the field magnitude) accepted as converged
    pub fn new(
        mesh: Arc<BoxMesh>,
        approximation: &AnelasticLiquidApproximation,
        scheme: TimeIntegrationScheme,
        max_sweeps: usize,
        tolerance: f64,
    ) -> Self {
        let reference_conduction = Laplacian::new(&mesh).apply(&approximation.reference().temperature);
        Self {
            mesh,
            scheme,
            max_sweeps,
            tolerance,
            reference_conduction,
            previous: Vec::new(),
        }
    }
}

/// Neighbour layout of the structured vertex grid
struct Laplacian {
    nx: usize,
    ny: usize,
    inv_dx2: f64,
    inv_dy2: f64,
}

impl Laplacian {
    fn new(mesh: &BoxMesh) -> Self {
        Self {
            nx: mesh.nx(),
            ny: mesh.ny(),
            inv_dx2: 1.0 / (mesh.dx() * mesh.dx()),
            inv_dy2: 1.0 / (mesh.dy() * mesh.dy()),
        }
    }

    /// (west, east, south, north) neighbours, mirrored across the walls
    fn neighbours(&self, node: usize) -> [usize; 4] {
        let stride = self.nx + 1;
        let (i, j) = (node % stride, node / stride);
        let west = if i == 0 { 1 } else { i - 1 };
        let east = if i == self.nx { self.nx - 1 } else { i + 1 };
        let south = if j == 0 { 1 } else { j - 1 };
        let north = if j == self.ny { self.ny - 1 } else { j + 1 };
        [
            j * stride + west,
            j * stride + east,
            south * stride + i,
            north * stride + i,
        ]
    }

    fn apply(&self, values: &[f64]) -> Vec<f64> {
        (0..values.len())
            .map(|node| {
                let [w, e, s, n] = self.neighbours(node);
                (values[w] + values[e] - 2.0 * values[node]) * self.inv_dx2
                    + (values[s] + values[n] - 2.0 * values[node]) * self.inv_dy2
            })
            .collect()
    }
}

impl UpwindEnergy {
    /// Neighbour weights `[w, e, s, n]` of the upwinded advection-diffusion
    /// operator at a vertex; the diagonal is their sum
    fn weights(&self, lap: &Laplacian, density: f64, u: &Vector2<f64>) -> [f64; 4] {
        let (dx, dy) = (self.mesh.dx(), self.mesh.dy());
        [
            lap.inv_dx2 + density * u.x.max(0.0) / dx,
            lap.inv_dx2 + density * (-u.x).max(0.0) / dx,
            lap.inv_dy2 + density * u.y.max(0.0) / dy,
            lap.inv_dy2 + density * (-u.y).max(0.0) / dy,
        ]
    }
}

impl EnergySolver for UpwindEnergy {
    fn solve(
        &mut self,
        temperature: &mut [f64],
        velocity: &[Vector2<f64>],
        approximation: &AnelasticLiquidApproximation,
        dt: f64,
        bcs: &TemperatureBcs,
    ) -> Result<SolveStats, SolverDivergence> {
        self.previous.clear();
        self.previous.extend_from_slice(temperature);

        let mesh = &self.mesh;
        let lap = Laplacian::new(mesh);
        let theta = self.scheme.theta();
        let reference = approximation.reference();
        let old = &self.previous;
        let grad_u = mesh.vector_gradient(velocity);

        // Explicit part: ρ̄/Δt T'ⁿ + (1 − θ) L(T'ⁿ) + sources at the old level
        let rhs: Vec<f64> = (0..old.len())
            .into_par_iter()
            .map(|node| {
                let density = reference.density[node];
                let weights = self.weights(&lap, density, &velocity[node]);
                let neighbours = lap.neighbours(node);
                let operator: f64 = weights
                    .iter()
                    .zip(neighbours)
                    .map(|(c, nb)| c * (old[nb] - old[node]))
                    .sum();
                let full = old[node] + reference.temperature[node];
                let source = self.reference_conduction[node]
                    - approximation.work_against_gravity(node, full, &velocity[node])
                    + approximation.viscous_dissipation(&grad_u[node]);
                density / dt * old[node] + (1.0 - theta) * operator + source
            })
            .collect();

        let mut current = old.clone();
        bcs.apply(mesh, &mut current);
        let mut next = current.clone();

        for sweep in 1..=self.max_sweeps {
            next.par_iter_mut().enumerate().for_each(|(node, t)| {
                if bcs.constrains(mesh, node) {
                    return;
                }
                let density = reference.density[node];
                let weights = self.weights(&lap, density, &velocity[node]);
                let neighbours = lap.neighbours(node);
                let off_diagonal: f64 = weights
                    .iter()
                    .zip(neighbours)
                    .map(|(c, nb)| c * current[nb])
                    .sum();
                let diagonal = density / dt + theta * weights.iter().sum::<f64>();
                *t = (rhs[node] + theta * off_diagonal) / diagonal;
            });

            let (change, scale) = next
                .par_iter()
                .zip(current.par_iter())
                .map(|(a, b)| ((a - b).abs(), a.abs()))
                .reduce(|| (0.0, 0.0), |x, y| (x.0.max(y.0), x.1.max(y.1)));
            std::mem::swap(&mut current, &mut next);

            if !change.is_finite() {
                return Err(SolverDivergence::new(self.name(), sweep, change));
            }
            if change <= self.tolerance * scale.max(1.0) {
                temperature.copy_from_slice(&current);
                return Ok(SolveStats {
                    iterations: sweep,
                    residual: change,
                });
            }
        }

        temperature.copy_from_slice(&current);
        let residual = current
            .iter()
            .zip(&next)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        Err(SolverDivergence::new(self.name(), self.max_sweeps, residual))
    }

    fn previous_temperature(&self) -> &[f64] {
        &self.previous
    }

    fn scheme(&self) -> TimeIntegrationScheme {
        self.scheme
    }

    fn name(&self) -> &str {
        "upwind energy"
    }
}
