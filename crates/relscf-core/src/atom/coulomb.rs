use super::orbital::Orbital;
use crate::domain::{Categorized, ErrorCategory};
use crate::numerics::grid::Grid;
use crate::numerics::integration::{integrate_on_grid, step_integral};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CoulombError {
    #[error("orbital index {index} is out of range for {count} orbitals")]
    UnknownOrbital { index: usize, count: usize },
    #[error("input length mismatch for {name}: need {need}, got {got}")]
    LengthMismatch {
        name: &'static str,
        need: usize,
        got: usize,
    },
}

impl Categorized for CoulombError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::InternalError
    }
}

/// Canonical key of a radial Coulomb integral
/// `R^k_abcd = ∫ (f_a f_c + g_a g_c)(r) y^k_bd(r) dr`.
///
/// `R^k` is unchanged by `a ↔ c`, by `b ↔ d` and by exchanging the pairs
/// `(a, c) ↔ (b, d)`; all eight orderings map to the smallest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoulombKey {
    pub k: u32,
    pub indices: [usize; 4],
}

impl CoulombKey {
    pub fn normal_ordered(k: u32, a: usize, b: usize, c: usize, d: usize) -> Self {
        let candidates = [
            [a, b, c, d],
            [c, b, a, d],
            [a, d, c, b],
            [c, d, a, b],
            [b, a, d, c],
            [d, a, b, c],
            [b, c, d, a],
            [d, c, b, a],
        ];
        let indices = candidates.into_iter().min().unwrap_or([a, b, c, d]);
        Self { k, indices }
    }

    pub fn contains(&self, orbital: usize) -> bool {
        self.indices.contains(&orbital)
    }
}

pub(crate) fn lookup<'a>(orbitals: &'a [Orbital], index: usize) -> Result<&'a Orbital, CoulombError> {
    orbitals.get(index).ok_or(CoulombError::UnknownOrbital {
        index,
        count: orbitals.len(),
    })
}

/// Multipole screening function
/// `y^k_ab(r) = ∫ r_<^k / r_>^{k+1} (f_a f_b + g_a g_b)(r') dr'`.
///
/// Built from two running integrals carried as ratios `(r'/r)^k` so no power
/// of a small radius is ever formed.
pub fn yk_ab(grid: &Grid, k: u32, a: &Orbital, b: &Orbital) -> Result<Vec<f64>, CoulombError> {
    let n = grid.num_points();
    for (name, len) in [("f_a", a.f.len()), ("g_a", a.g.len()), ("f_b", b.f.len()), ("g_b", b.g.len())] {
        if len != n {
            return Err(CoulombError::LengthMismatch { name, need: n, got: len });
        }
    }
    Ok(yk_from_density(grid, k, &a.density_with(b)))
}

pub fn yk_from_density(grid: &Grid, k: u32, density: &[f64]) -> Vec<f64> {
    let n = grid.num_points();
    let k = k as i32;
    let h = grid.du();
    let scaled: Vec<f64> = (0..n).map(|i| density[i] * grid.drdu(i)).collect();

    // inner[i] = ∫_0^{r_i} (r'/r_i)^k ρ dr'
    let mut inner = vec![0.0; n];
    inner[0] = 0.5 * grid.r0() * density[0];
    let mut weighted = vec![0.0; n];
    for i in 1..n {
        let ri = grid.r(i);
        for j in i.saturating_sub(2)..(i + 2).min(n) {
            weighted[j] = scaled[j] * (grid.r(j) / ri).powi(k);
        }
        let ratio = (grid.r(i - 1) / ri).powi(k);
        inner[i] = inner[i - 1] * ratio + step_integral(&weighted, i, h);
    }

    // outer[i] = ∫_{r_i}^∞ (r_i/r')^{k+1} ρ dr'
    let mut outer = vec![0.0; n];
    for i in (0..n - 1).rev() {
        let ri = grid.r(i);
        for j in i.saturating_sub(1)..(i + 3).min(n) {
            weighted[j] = scaled[j] * (ri / grid.r(j)).powi(k + 1);
        }
        let ratio = (ri / grid.r(i + 1)).powi(k + 1);
        outer[i] = outer[i + 1] * ratio + step_integral(&weighted, i + 1, h);
    }

    (0..n).map(|i| (inner[i] + outer[i]) / grid.r(i)).collect()
}

/// `∫ (f_a f_c + g_a g_c) y dr`.
pub fn radial_integral_with_yk(grid: &Grid, a: &Orbital, c: &Orbital, yk: &[f64]) -> f64 {
    let end = a.pinf.min(c.pinf) + 1;
    integrate_on_grid(grid, end, |i| (a.f[i] * c.f[i] + a.g[i] * c.g[i]) * yk[i])
}

#[cfg(test)]
mod tests {
    use super::{CoulombKey, yk_ab, yk_from_density};
    use crate::atom::orbital::Orbital;
    use crate::numerics::grid::{Grid, GridKind, GridParameters};

    fn grid() -> Grid {
        Grid::new(&GridParameters::new(1.0e-6, 60.0, 1500, GridKind::LogLinear { b: 4.0 }))
            .expect("grid should build")
    }

    fn hydrogen_1s(grid: &Grid) -> Orbital {
        let mut orbital = Orbital::empty(1, -1, grid.num_points());
        for i in 0..grid.num_points() {
            let r = grid.r(i);
            orbital.f[i] = 2.0 * r * (-r).exp();
        }
        orbital
    }

    #[test]
    fn monopole_of_hydrogen_density_matches_closed_form() {
        let grid = grid();
        let orbital = hydrogen_1s(&grid);
        let y0 = yk_ab(&grid, 0, &orbital, &orbital).expect("lengths match");
        // y^0(r) = 1/r - (1 + 1/r) e^{-2r}
        for i in [200_usize, 800, 1200, 1499] {
            let r = grid.r(i);
            let expected = 1.0 / r - (1.0 + 1.0 / r) * (-2.0 * r).exp();
            assert!(
                (y0[i] - expected).abs() <= 1.0e-6 * expected.abs().max(1.0),
                "r={r} y0={} expected={expected}",
                y0[i]
            );
        }
    }

    #[test]
    fn dipole_of_point_like_density_decays_as_r_squared() {
        let grid = grid();
        let density: Vec<f64> = grid.radii().iter().map(|r| 4.0 * r * r * (-2.0 * r).exp()).collect();
        let y1 = yk_from_density(&grid, 1, &density);
        let far = grid.index_of(40.0);
        let r = grid.r(far);
        // ∫ r' ρ dr' = 3/2 for the hydrogen ground-state density.
        assert!((y1[far] * r * r - 1.5).abs() <= 1.0e-6);
    }

    #[test]
    fn normal_ordering_merges_all_symmetric_permutations() {
        let key = CoulombKey::normal_ordered(2, 3, 1, 0, 2);
        let permutations = [
            (3, 1, 0, 2),
            (0, 1, 3, 2),
            (3, 2, 0, 1),
            (0, 2, 3, 1),
            (1, 3, 2, 0),
            (2, 3, 1, 0),
            (1, 0, 2, 3),
            (2, 0, 1, 3),
        ];
        for (a, b, c, d) in permutations {
            assert_eq!(CoulombKey::normal_ordered(2, a, b, c, d), key);
        }
        assert_eq!(key.indices, [0, 1, 3, 2]);
        assert_ne!(CoulombKey::normal_ordered(2, 3, 0, 1, 2), key);
        assert!(key.contains(3));
        assert!(!key.contains(7));
    }
}
