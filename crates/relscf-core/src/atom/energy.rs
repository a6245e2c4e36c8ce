use super::cache::IntegralCache;
use super::coulomb::CoulombError;
use super::orbital::Orbital;
use crate::common::constants::{ALPHA, ALPHA_INV};
use crate::numerics::grid::Grid;
use crate::numerics::wigner::l_of_kappa;

/// Exact Dirac-Coulomb binding energy of a point-nucleus hydrogen-like ion,
/// rest mass removed.
pub fn hydrogenic_energy(z: f64, n: i32, kappa: i32) -> f64 {
    let c2 = ALPHA_INV * ALPHA_INV;
    let kappa = f64::from(kappa);
    let alpha_z = ALPHA * z;
    let gamma = (kappa * kappa - alpha_z * alpha_z).sqrt();
    let denominator = f64::from(n) - kappa.abs() + gamma;
    c2 / (1.0 + (alpha_z / denominator).powi(2)).sqrt() - c2
}

/// Screened hydrogenic estimate for a core orbital.
///
/// The effective charge removes every electron in lower shells and half of
/// those in the same `(n, l)` shell.
pub fn core_energy_guess(z: f64, core: &[Orbital], n: i32, kappa: i32) -> f64 {
    let l = l_of_kappa(kappa);
    let mut below = 0.0;
    let mut same_shell = 0.0;
    for orbital in core {
        if orbital.n == n && orbital.l() == l {
            same_shell += orbital.occupancy;
        }
        if orbital.n < n || (orbital.n == n && orbital.l() < l) {
            below += orbital.occupancy;
        }
    }

    let z_eff = (1.0 + z - below - 0.5 * same_shell).max(1.0);
    let mut energy = -0.5 * (z_eff / f64::from(n)).powi(2);
    if n > 1 {
        energy *= 0.5;
    }
    if z_eff < 10.0 {
        match l {
            0 => energy *= 2.5,
            1 => energy *= 3.5,
            _ => {}
        }
    }
    energy
}

/// Quantum-defect style estimate for a valence orbital outside `core`.
pub fn valence_energy_guess(z: f64, core: &[Orbital], n: i32, kappa: i32) -> f64 {
    let max_core_n = core.iter().map(|orbital| orbital.n).max().unwrap_or(0);
    let core_electrons: f64 = core.iter().map(|orbital| orbital.occupancy).sum();
    let l = l_of_kappa(kappa);

    let mut z_eff = z - core_electrons;
    if z_eff <= 0.0 {
        z_eff = 0.5;
    }
    let x = if max_core_n < 4 { 0.25 } else { 1.0 };
    let mut n_eff = 1.0 + f64::from(n - max_core_n);
    match l {
        0 => {}
        1 => n_eff += 0.5 * x,
        2 => n_eff += 2.0 * x.sqrt(),
        _ => n_eff += 4.0 * x,
    }
    -0.5 * z_eff * z_eff / (n_eff * n_eff)
}

/// Total energy of the closed core,
/// `E = Σ_a x_a ε_a − ½ Σ_ab x_a x_b (R⁰_abab − Σ_k Λ^k_ab R^k_abba)`.
///
/// Orbital indices refer to positions in `core`, which must be the slice the
/// cache entries were computed from.
pub fn core_energy(grid: &Grid, cache: &IntegralCache, core: &[Orbital]) -> Result<f64, CoulombError> {
    let mut total = 0.0;
    for (a, orbital_a) in core.iter().enumerate() {
        let x_a = orbital_a.occupancy;
        let mut direct = 0.0;
        let mut exchange = 0.0;
        for (b, orbital_b) in core.iter().enumerate() {
            let x_b = orbital_b.occupancy;
            direct += x_a * x_b * cache.radial_integral(grid, core, 0, a, b, a, b)?;

            let k_min = (orbital_a.twoj() - orbital_b.twoj()).abs() / 2;
            let k_max = (orbital_a.twoj() + orbital_b.twoj()) / 2;
            for k in k_min..=k_max {
                let lambda = cache.lambda_k(k, orbital_a.kappa, orbital_b.kappa);
                if lambda == 0.0 {
                    continue;
                }
                let r_k = cache.radial_integral(grid, core, k as u32, a, b, b, a)?;
                exchange += x_a * x_b * lambda * r_k;
            }
        }
        total += x_a * orbital_a.energy - 0.5 * (direct - exchange);
    }
    Ok(total)
}
