use crate::numerics::grid::Grid;
use crate::numerics::integration::integrate_on_grid;
use crate::numerics::wigner::{l_of_kappa, twoj_of_kappa};

/// Relative amplitude below which a sample is treated as zero when counting nodes.
pub const NODE_AMPLITUDE_CUTOFF: f64 = 1.0e-7;

/// Bound radial Dirac orbital: large (`f`) and small (`g`) components on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbital {
    pub n: i32,
    pub kappa: i32,
    pub energy: f64,
    pub f: Vec<f64>,
    pub g: Vec<f64>,
    /// Last grid index carrying a non-negligible amplitude.
    pub pinf: usize,
    /// Number of electrons in the subshell, at most `2j + 1`.
    pub occupancy: f64,
}

impl Orbital {
    pub fn empty(n: i32, kappa: i32, num_points: usize) -> Self {
        Self {
            n,
            kappa,
            energy: 0.0,
            f: vec![0.0; num_points],
            g: vec![0.0; num_points],
            pinf: num_points.saturating_sub(1),
            occupancy: f64::from(twoj_of_kappa(kappa) + 1),
        }
    }

    pub fn l(&self) -> i32 {
        l_of_kappa(self.kappa)
    }

    pub fn twoj(&self) -> i32 {
        twoj_of_kappa(self.kappa)
    }

    pub fn degeneracy(&self) -> f64 {
        f64::from(self.twoj() + 1)
    }

    pub fn occupation_fraction(&self) -> f64 {
        self.occupancy / self.degeneracy()
    }

    pub fn symbol(&self) -> String {
        orbital_symbol(self.n, self.kappa)
    }

    pub fn expected_nodes(&self) -> usize {
        expected_nodes(self.n, self.kappa)
    }

    pub fn count_nodes(&self) -> usize {
        count_nodes(&self.f[..=self.pinf.min(self.f.len().saturating_sub(1))])
    }

    /// `∫ (f² + g²) dr`.
    pub fn norm(&self, grid: &Grid) -> f64 {
        self.overlap(self, grid)
    }

    /// `<self|other> = ∫ (f_a f_b + g_a g_b) dr`.
    pub fn overlap(&self, other: &Orbital, grid: &Grid) -> f64 {
        let end = self.pinf.min(other.pinf) + 1;
        integrate_on_grid(grid, end, |i| self.f[i] * other.f[i] + self.g[i] * other.g[i])
    }

    /// `<r^power>` for a normalised orbital.
    pub fn expectation_r(&self, grid: &Grid, power: i32) -> f64 {
        integrate_on_grid(grid, self.pinf + 1, |i| {
            (self.f[i] * self.f[i] + self.g[i] * self.g[i]) * grid.r(i).powi(power)
        })
    }

    /// Density `f_a f_b + g_a g_b` on every grid point.
    pub fn density_with(&self, other: &Orbital) -> Vec<f64> {
        self.f
            .iter()
            .zip(&self.g)
            .zip(other.f.iter().zip(&other.g))
            .map(|((fa, ga), (fb, gb))| fa * fb + ga * gb)
            .collect()
    }
}

/// Spectroscopic label: `2s`, `2p-` (j = l - 1/2) or `2p+` (j = l + 1/2).
pub fn orbital_symbol(n: i32, kappa: i32) -> String {
    const LETTERS: [char; 7] = ['s', 'p', 'd', 'f', 'g', 'h', 'i'];
    let l = l_of_kappa(kappa);
    let letter = usize::try_from(l)
        .ok()
        .and_then(|index| LETTERS.get(index).copied())
        .map_or_else(|| format!("[l={l}]"), |c| c.to_string());
    let suffix = match (l, kappa > 0) {
        (0, _) => "",
        (_, true) => "-",
        (_, false) => "+",
    };
    format!("{n}{letter}{suffix}")
}

pub fn expected_nodes(n: i32, kappa: i32) -> usize {
    usize::try_from(n - l_of_kappa(kappa) - 1).unwrap_or(0)
}

/// Sign changes of `values`, skipping samples below the amplitude cutoff.
pub fn count_nodes(values: &[f64]) -> usize {
    let max = values.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
    if max == 0.0 {
        return 0;
    }
    let cutoff = NODE_AMPLITUDE_CUTOFF * max;
    let mut nodes = 0;
    let mut last_sign = 0.0_f64;
    for value in values {
        if value.abs() < cutoff {
            continue;
        }
        let sign = value.signum();
        if last_sign != 0.0 && sign != last_sign {
            nodes += 1;
        }
        last_sign = sign;
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::{Orbital, count_nodes, expected_nodes, orbital_symbol};
    use crate::numerics::grid::{Grid, GridKind, GridParameters};

    #[test]
    fn symbols_follow_relativistic_notation() {
        assert_eq!(orbital_symbol(1, -1), "1s");
        assert_eq!(orbital_symbol(2, 1), "2p-");
        assert_eq!(orbital_symbol(2, -2), "2p+");
        assert_eq!(orbital_symbol(3, 2), "3d-");
        assert_eq!(orbital_symbol(4, -4), "4f+");
    }

    #[test]
    fn expected_nodes_use_orbital_angular_momentum() {
        assert_eq!(expected_nodes(1, -1), 0);
        assert_eq!(expected_nodes(3, -1), 2);
        assert_eq!(expected_nodes(3, 1), 1);
        assert_eq!(expected_nodes(3, -3), 0);
    }

    #[test]
    fn node_count_ignores_noise_near_zero() {
        let values = [1.0e-12, -1.0e-12, 0.5, 1.0, 0.2, -0.3, -0.1, 1.0e-10, -1.0e-10];
        assert_eq!(count_nodes(&values), 1);
        assert_eq!(count_nodes(&[0.0; 4]), 0);
    }

    #[test]
    fn hydrogen_like_density_integrals_match_analytic_values() {
        let grid = Grid::new(&GridParameters::new(1.0e-6, 60.0, 1500, GridKind::LogLinear {
            b: 4.0,
        }))
        .expect("grid should build");
        let mut orbital = Orbital::empty(1, -1, grid.num_points());
        for i in 0..grid.num_points() {
            let r = grid.r(i);
            orbital.f[i] = 2.0 * r * (-r).exp();
        }
        assert!((orbital.norm(&grid) - 1.0).abs() <= 1.0e-8);
        assert!((orbital.expectation_r(&grid, 1) - 1.5).abs() <= 1.0e-8);
        assert!((orbital.expectation_r(&grid, -1) - 1.0).abs() <= 1.0e-8);
        assert_eq!(orbital.count_nodes(), 0);
        assert_eq!(orbital.occupation_fraction(), 1.0);
    }
}
