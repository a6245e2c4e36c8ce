use crate::common::constants::{PI, THIRD};
use crate::numerics::grid::Grid;

/// Local part of the mean field: nuclear attraction plus electron repulsion.
///
/// Orbital-dependent exchange is kept separately by the SCF driver and added
/// per orbital through [`Potential::with_exchange`].
#[derive(Debug, Clone, PartialEq)]
pub struct Potential {
    pub nuclear: Vec<f64>,
    pub direct: Vec<f64>,
}

impl Potential {
    pub fn new(nuclear: Vec<f64>, direct: Vec<f64>) -> Self {
        Self { nuclear, direct }
    }

    pub fn local(&self) -> Vec<f64> {
        self.nuclear
            .iter()
            .zip(&self.direct)
            .map(|(vn, vd)| vn + vd)
            .collect()
    }

    /// Total local potential seen by one orbital with its localised exchange.
    pub fn with_exchange(&self, exchange: &[f64]) -> Vec<f64> {
        self.nuclear
            .iter()
            .zip(&self.direct)
            .zip(exchange)
            .map(|((vn, vd), vx)| vn + vd + vx)
            .collect()
    }
}

/// Screening potential of `electrons` distributed as in a Thomas-Fermi atom of charge `z`.
///
/// Rational fit to the Thomas-Fermi screening function; tends to `electrons / r`
/// far from the nucleus and stays finite at the origin.
pub fn thomas_fermi_screening(r: f64, z: f64, electrons: f64) -> f64 {
    if r <= 0.0 || electrons < 1.0e-4 || z <= 0.0 {
        return 0.0;
    }
    let w = (r * z.powf(THIRD) / 0.8853).sqrt();
    let t = w * (0.60112 * w + 1.81061) + 1.0;
    let denominator =
        w * (w * (w * (w * (0.04793 * w + 0.21465) + 0.77112) + 1.39515) + 1.81061) + 1.0;
    electrons * (1.0 - (t / denominator).powi(2)) / r
}

pub fn thomas_fermi_potential(grid: &Grid, z: f64, electrons: f64) -> Vec<f64> {
    grid.radii()
        .iter()
        .map(|&r| thomas_fermi_screening(r, z, electrons))
        .collect()
}

/// Local Slater exchange `(f/r) (r ρ)^{1/3}` with `ρ = Σ_b n_b (f_b² + g_b²) / r²`,
/// switched to the Latter tail `-z_ion/r` once it falls below it.
///
/// `rho_r2` is the radial density `r² ρ(r)`, i.e. the sum of occupancies times `f² + g²`.
pub fn slater_exchange_with_latter(
    grid: &Grid,
    rho_r2: &[f64],
    direct: &[f64],
    nuclear: &[f64],
    ion_charge: f64,
) -> Vec<f64> {
    let prefactor = -(2.0 / 3.0) * (81.0 / (32.0 * PI * PI)).powf(THIRD);
    let mut exchange: Vec<f64> = (0..grid.num_points())
        .map(|i| {
            let r = grid.r(i);
            let density_r = rho_r2[i].max(0.0) * r;
            prefactor / r * density_r.powf(THIRD)
        })
        .collect();

    // Latter correction: the total potential never rises above -(z_ion + 1)/r.
    let tail_charge = ion_charge + 1.0;
    for i in 0..exchange.len() {
        let r = grid.r(i);
        let total = nuclear[i] + direct[i] + exchange[i];
        if total > -tail_charge / r {
            exchange[i] = -tail_charge / r - nuclear[i] - direct[i];
        }
    }
    exchange
}
