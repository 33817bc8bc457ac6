//! Box mesh and domain integration
//!
//! The driver never assembles anything itself, but it needs a description of the
//! domain to integrate diagnostics, measure cell sizes for the CFL bound and tag
//! boundaries for the solver collaborators. `BoxMesh` is that descriptor: a uniform
//! quadrilateral mesh of a rectangle with nodal (vertex) degrees of freedom stored
//! in row-major order (`j * (nx + 1) + i`).

use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Boundary identifier, matching the usual Cartesian box tagging
pub type BoundaryId = u32;

/// Left wall (x = 0)
pub const LEFT_ID: BoundaryId = 1;
/// Right wall (x = width)
pub const RIGHT_ID: BoundaryId = 2;
/// Bottom wall (y = 0), the core-mantle boundary
pub const BOTTOM_ID: BoundaryId = 3;
/// Top wall (y = height), the surface
pub const TOP_ID: BoundaryId = 4;

/// Uniform quadrilateral mesh of a rectangle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxMesh {
    /// Number of cells in x
    nx: usize,
    /// Number of cells in y
    ny: usize,
    /// Domain extent in x
    width: f64,
    /// Domain extent in y
    height: f64,
}

impl BoxMesh {
    /// Create a mesh of the unit square with `nx × ny` cells
    #[must_use]
    pub fn unit_square(nx: usize, ny: usize) -> Self {
        Self::new(nx, ny, 1.0, 1.0)
    }

    /// Create a mesh of `[0, width] × [0, height]` with `nx × ny` cells
    ///
    /// Cell counts are clamped to at least one cell per direction.
    #[must_use]
    pub fn new(nx: usize, ny: usize, width: f64, height: f64) -> Self {
        Self {
            nx: nx.max(1),
            ny: ny.max(1),
            width,
            height,
        }
    }

    /// Number of cells in x
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of cells in y
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Domain extent in x
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Domain extent in y
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Cell spacing in x
    pub fn dx(&self) -> f64 {
        self.width / self.nx as f64
    }

    /// Cell spacing in y
    pub fn dy(&self) -> f64 {
        self.height / self.ny as f64
    }

    /// Total number of vertices
    pub fn node_count(&self) -> usize {
        (self.nx + 1) * (self.ny + 1)
    }

    /// Total number of cells
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Domain area
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Flat index of vertex `(i, j)`
    #[inline]
    pub fn node_index(&self, i: usize, j: usize) -> usize {
        j * (self.nx + 1) + i
    }

    /// Physical coordinates of a vertex
    #[inline]
    pub fn coordinates(&self, node: usize) -> (f64, f64) {
        let i = node % (self.nx + 1);
        let j = node / (self.nx + 1);
        (i as f64 * self.dx(), j as f64 * self.dy())
    }

    /// Corner vertices of every cell, counter-clockwise from the lower left
    pub fn cells(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        (0..self.ny).flat_map(move |j| {
            (0..self.nx).map(move |i| {
                [
                    self.node_index(i, j),
                    self.node_index(i + 1, j),
                    self.node_index(i + 1, j + 1),
                    self.node_index(i, j + 1),
                ]
            })
        })
    }

    /// Evaluate `f(x, y)` at every vertex
    pub fn interpolate<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(f64, f64) -> f64,
    {
        (0..self.node_count())
            .map(|node| {
                let (x, y) = self.coordinates(node);
                f(x, y)
            })
            .collect()
    }

    /// Integrate a nodal integrand over the domain
    ///
    /// Uses the tensor-product trapezoidal rule, which is exact for the bilinear
    /// interpolant of the nodal values.
    ///
    /// # Arguments
    ///
    /// * `integrand` - Value of the integrand at a vertex index
    pub fn integrate_by<F>(&self, integrand: F) -> f64
    where
        F: Fn(usize) -> f64 + Sync,
    {
        let cell_area = self.dx() * self.dy();
        let nx = self.nx;
        let ny = self.ny;

        (0..=ny)
            .into_par_iter()
            .map(|j| {
                let wj = edge_weight(j, ny);
                let row: f64 = (0..=nx)
                    .map(|i| edge_weight(i, nx) * integrand(self.node_index(i, j)))
                    .sum();
                wj * row
            })
            .sum::<f64>()
            * cell_area
    }

    /// Integrate a nodal field over the domain
    pub fn integrate(&self, values: &[f64]) -> f64 {
        debug_assert_eq!(values.len(), self.node_count());
        self.integrate_by(|node| values[node])
    }

    /// Vertices lying on a boundary, ordered by increasing coordinate
    ///
    /// Unknown ids yield an empty list.
    pub fn boundary_nodes(&self, id: BoundaryId) -> Vec<usize> {
        match id {
            LEFT_ID => (0..=self.ny).map(|j| self.node_index(0, j)).collect(),
            RIGHT_ID => (0..=self.ny).map(|j| self.node_index(self.nx, j)).collect(),
            BOTTOM_ID => (0..=self.nx).map(|i| self.node_index(i, 0)).collect(),
            TOP_ID => (0..=self.nx).map(|i| self.node_index(i, self.ny)).collect(),
            _ => Vec::new(),
        }
    }

    /// Length of a boundary
    pub fn boundary_length(&self, id: BoundaryId) -> f64 {
        match id {
            LEFT_ID | RIGHT_ID => self.height,
            BOTTOM_ID | TOP_ID => self.width,
            _ => 0.0,
        }
    }

    /// Outward unit normal of a boundary
    pub fn outward_normal(&self, id: BoundaryId) -> Vector2<f64> {
        match id {
            LEFT_ID => Vector2::new(-1.0, 0.0),
            RIGHT_ID => Vector2::new(1.0, 0.0),
            BOTTOM_ID => Vector2::new(0.0, -1.0),
            TOP_ID => Vector2::new(0.0, 1.0),
            _ => Vector2::zeros(),
        }
    }

    /// Integrate a nodal integrand along a boundary (trapezoidal rule)
    pub fn boundary_integrate_by<F>(&self, id: BoundaryId, integrand: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let nodes = self.boundary_nodes(id);
        if nodes.len() < 2 {
            return 0.0;
        }
        let n = nodes.len() - 1;
        let spacing = self.boundary_length(id) / n as f64;
        nodes
            .iter()
            .enumerate()
            .map(|(k, &node)| edge_weight(k, n) * integrand(node))
            .sum::<f64>()
            * spacing
    }

    /// Nodal gradient of a scalar field
    ///
    /// Central differences in the interior and second-order one-sided
    /// differences on the walls, so boundary fluxes stay second-order accurate.
    pub fn gradient(&self, values: &[f64]) -> Vec<Vector2<f64>> {
        debug_assert_eq!(values.len(), self.node_count());
        let (dx, dy) = (self.dx(), self.dy());
        (0..self.node_count())
            .into_par_iter()
            .map(|node| {
                let i = node % (self.nx + 1);
                let j = node / (self.nx + 1);
                let ddx = line_derivative(|k| values[self.node_index(k, j)], i, self.nx, dx);
                let ddy = line_derivative(|k| values[self.node_index(i, k)], j, self.ny, dy);
                Vector2::new(ddx, ddy)
            })
            .collect()
    }

    /// Nodal gradient of a vector field
    ///
    /// Row `r` of each matrix holds the gradient of component `r`, i.e.
    /// `G[(r, c)] = ∂u_r / ∂x_c`.
    pub fn vector_gradient(&self, values: &[Vector2<f64>]) -> Vec<Matrix2<f64>> {
        let ux: Vec<f64> = values.iter().map(|u| u.x).collect();
        let uy: Vec<f64> = values.iter().map(|u| u.y).collect();
        let gx = self.gradient(&ux);
        let gy = self.gradient(&uy);
        gx.into_iter()
            .zip(gy)
            .map(|(a, b)| Matrix2::new(a.x, a.y, b.x, b.y))
            .collect()
    }
}

/// Trapezoidal weight of sample `k` out of `0..=n`
#[inline]
fn edge_weight(k: usize, n: usize) -> f64 {
    if k == 0 || k == n {
        0.5
    } else {
        1.0
    }
}

/// Finite-difference derivative of samples `f(0..=n)` with spacing `h` at `k`
fn line_derivative<F>(f: F, k: usize, n: usize, h: f64) -> f64
where
    F: Fn(usize) -> f64,
{
    if n == 1 {
        return (f(1) - f(0)) / h;
    }
    if k == 0 {
        (-3.0 * f(0) + 4.0 * f(1) - f(2)) / (2.0 * h)
    } else if k == n {
        (3.0 * f(n) - 4.0 * f(n - 1) + f(n - 2)) / (2.0 * h)
    } else {
        (f(k + 1) - f(k - 1)) / (2.0 * h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_and_coordinates() {
        let mesh = BoxMesh::unit_square(4, 2);
        assert_eq!(mesh.node_count(), 15);
        assert_eq!(mesh.cell_count(), 8);
        assert_eq!(mesh.coordinates(mesh.node_index(4, 2)), (1.0, 1.0));
        assert_eq!(mesh.cells().count(), 8);
    }

    #[test]
    fn test_integrate_linear_is_exact() {
        let mesh = BoxMesh::unit_square(8, 8);
        let f = mesh.interpolate(|x, y| 1.0 + x + 2.0 * y);
        assert_relative_eq!(mesh.integrate(&f), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_boundary_integral_of_constant_is_length() {
        let mesh = BoxMesh::new(5, 3, 2.0, 1.0);
        assert_relative_eq!(mesh.boundary_integrate_by(TOP_ID, |_| 1.0), 2.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.boundary_integrate_by(LEFT_ID, |_| 1.0), 1.0, epsilon = 1e-12);
        assert_eq!(mesh.boundary_integrate_by(99, |_| 1.0), 0.0);
    }

    #[test]
    fn test_gradient_of_quadratic_is_exact() {
        let mesh = BoxMesh::unit_square(6, 6);
        let f = mesh.interpolate(|x, y| x * x + 3.0 * y);
        let grad = mesh.gradient(&f);
        for (node, g) in grad.iter().enumerate() {
            let (x, _) = mesh.coordinates(node);
            assert_relative_eq!(g.x, 2.0 * x, epsilon = 1e-10);
            assert_relative_eq!(g.y, 3.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_vector_gradient_layout() {
        let mesh = BoxMesh::unit_square(3, 3);
        let u: Vec<Vector2<f64>> = (0..mesh.node_count())
            .map(|n| {
                let (x, y) = mesh.coordinates(n);
                Vector2::new(2.0 * y, 5.0 * x)
            })
            .collect();
        let g = mesh.vector_gradient(&u);
        assert_relative_eq!(g[0][(0, 1)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(g[0][(1, 0)], 5.0, epsilon = 1e-12);
        assert_relative_eq!(g[0][(0, 0)], 0.0, epsilon = 1e-12);
    }
}
