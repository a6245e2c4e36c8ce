use rayon::prelude::*;

use super::cache::IntegralCache;
use super::coulomb::{CoulombError, yk_ab};
use super::orbital::Orbital;
use crate::numerics::grid::Grid;
use crate::numerics::integration::integrate_on_grid;

/// Fraction of `max |f_a|` below which `f_b / f_a` is not formed.
pub const EXCHANGE_CUTOFF: f64 = 0.003;

/// Both components of a non-local operator applied to one orbital.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeTerm {
    pub f: Vec<f64>,
    pub g: Vec<f64>,
}

impl ExchangeTerm {
    pub fn zeros(num_points: usize) -> Self {
        Self {
            f: vec![0.0; num_points],
            g: vec![0.0; num_points],
        }
    }

    fn add_scaled(&mut self, weight: &[f64], orbital: &Orbital, end: usize) {
        for i in 0..end {
            self.f[i] += weight[i] * orbital.f[i];
            self.g[i] += weight[i] * orbital.g[i];
        }
    }

    /// `<orbital|term> = ∫ (f F_f + g F_g) dr`.
    pub fn expectation(&self, grid: &Grid, orbital: &Orbital) -> f64 {
        integrate_on_grid(grid, orbital.pinf + 1, |i| {
            orbital.f[i] * self.f[i] + orbital.g[i] * self.g[i]
        })
    }
}

fn ensure_grid_length(grid: &Grid, name: &'static str, orbital: &Orbital) -> Result<(), CoulombError> {
    let need = grid.num_points();
    for len in [orbital.f.len(), orbital.g.len()] {
        if len != need {
            return Err(CoulombError::LengthMismatch {
                name,
                need,
                got: len,
            });
        }
    }
    Ok(())
}

/// `-x_b (f_a f_b + g_a g_b) / (f_a² + g_a²)` where `f_a` is large enough to divide by.
fn exchange_ratio(a: &Orbital, b: &Orbital, end: usize) -> Vec<f64> {
    let max_f = a.f.iter().fold(0.0_f64, |acc, f| acc.max(f.abs()));
    let cutoff = EXCHANGE_CUTOFF * max_f;
    let mut ratio = vec![0.0; a.f.len()];
    for i in 0..end {
        if a.f[i].abs() < cutoff {
            continue;
        }
        let top = a.f[i] * b.f[i] + a.g[i] * b.g[i];
        let bottom = a.f[i] * a.f[i] + a.g[i] * a.g[i];
        ratio[i] = -b.occupancy * top / bottom;
    }
    ratio
}

fn multipole_range(a: &Orbital, b: &Orbital) -> std::ops::RangeInclusive<i32> {
    (a.twoj() - b.twoj()).abs() / 2..=(a.twoj() + b.twoj()) / 2
}

/// Local approximation `v_a(r) ≈ [V_ex f_a](r) / f_a(r)` of the non-local
/// exchange seen by core orbital `index`.
///
/// The self term `b = a` needs no division and is kept over the whole orbital;
/// the other core orbitals only contribute where `f_a` is not near a node.
pub fn localized_core_exchange(
    grid: &Grid,
    cache: &IntegralCache,
    core: &[Orbital],
    index: usize,
) -> Result<Vec<f64>, CoulombError> {
    let orbital_a = core.get(index).ok_or(CoulombError::UnknownOrbital {
        index,
        count: core.len(),
    })?;
    for orbital in core {
        ensure_grid_length(grid, "core orbital", orbital)?;
    }
    let mut exchange = vec![0.0; grid.num_points()];

    for (b, orbital_b) in core.iter().enumerate() {
        if b == index {
            continue;
        }
        let end = orbital_a.pinf.min(orbital_b.pinf);
        let ratio = exchange_ratio(orbital_a, orbital_b, end);
        for k in multipole_range(orbital_a, orbital_b) {
            let lambda = cache.lambda_k(k, orbital_a.kappa, orbital_b.kappa);
            if lambda == 0.0 {
                continue;
            }
            let yk = cache.yk(grid, core, k as u32, b, index)?;
            for i in 0..end {
                exchange[i] += lambda * yk[i] * ratio[i];
            }
        }
    }

    for k in 0..=orbital_a.twoj() {
        let lambda = cache.lambda_k(k, orbital_a.kappa, orbital_a.kappa);
        if lambda == 0.0 {
            continue;
        }
        let yk = cache.yk(grid, core, k as u32, index, index)?;
        for i in 0..orbital_a.pinf {
            exchange[i] -= lambda * yk[i] * orbital_a.occupancy;
        }
    }
    Ok(exchange)
}

/// Localised exchange of every core orbital, built in parallel.
pub fn core_exchange_potentials(
    grid: &Grid,
    cache: &IntegralCache,
    core: &[Orbital],
) -> Result<Vec<Vec<f64>>, CoulombError> {
    (0..core.len())
        .into_par_iter()
        .map(|index| localized_core_exchange(grid, cache, core, index))
        .collect()
}

/// Localised exchange between a valence orbital and the frozen core.
///
/// The valence orbital is not part of the cached orbital set, so its
/// screening functions are formed directly; angular factors still come from
/// `cache`.
pub fn localized_valence_exchange(
    grid: &Grid,
    cache: &IntegralCache,
    core: &[Orbital],
    valence: &Orbital,
) -> Result<Vec<f64>, CoulombError> {
    ensure_grid_length(grid, "valence orbital", valence)?;
    for orbital in core {
        ensure_grid_length(grid, "core orbital", orbital)?;
    }
    let mut exchange = vec![0.0; grid.num_points()];
    for orbital_b in core {
        let end = valence.pinf.min(orbital_b.pinf);
        let ratio = exchange_ratio(valence, orbital_b, end);
        for k in multipole_range(valence, orbital_b) {
            let lambda = cache.lambda_k(k, valence.kappa, orbital_b.kappa);
            if lambda == 0.0 {
                continue;
            }
            let yk = yk_ab(grid, k as u32, orbital_b, valence)?;
            for i in 0..end {
                if ratio[i] != 0.0 {
                    exchange[i] += lambda * yk[i] * ratio[i];
                }
            }
        }
    }
    Ok(exchange)
}

/// Non-local exchange `V_ex F_a = -Σ_b x_b Σ_k Λ^k_ab y^k_ab F_b` acting on
/// core orbital `index`, with the screening functions taken from `cache`.
pub fn core_exchange_term(
    grid: &Grid,
    cache: &IntegralCache,
    core: &[Orbital],
    index: usize,
) -> Result<ExchangeTerm, CoulombError> {
    let orbital_a = core.get(index).ok_or(CoulombError::UnknownOrbital {
        index,
        count: core.len(),
    })?;
    for orbital in core {
        ensure_grid_length(grid, "core orbital", orbital)?;
    }

    let num_points = grid.num_points();
    let mut term = ExchangeTerm::zeros(num_points);
    let mut weight = vec![0.0; num_points];
    for (b, orbital_b) in core.iter().enumerate() {
        weight.iter_mut().for_each(|value| *value = 0.0);
        let end = orbital_b.pinf + 1;
        for k in multipole_range(orbital_a, orbital_b) {
            let lambda = cache.lambda_k(k, orbital_a.kappa, orbital_b.kappa);
            if lambda == 0.0 {
                continue;
            }
            let yk = cache.yk(grid, core, k as u32, b, index)?;
            let factor = -orbital_b.occupancy * lambda;
            for i in 0..end {
                weight[i] += factor * yk[i];
            }
        }
        term.add_scaled(&weight, orbital_b, end);
    }
    Ok(term)
}

/// Non-local exchange of the frozen core acting on a valence orbital.
pub fn valence_exchange_term(
    grid: &Grid,
    cache: &IntegralCache,
    core: &[Orbital],
    valence: &Orbital,
) -> Result<ExchangeTerm, CoulombError> {
    ensure_grid_length(grid, "valence orbital", valence)?;
    for orbital in core {
        ensure_grid_length(grid, "core orbital", orbital)?;
    }

    let num_points = grid.num_points();
    let mut term = ExchangeTerm::zeros(num_points);
    let mut weight = vec![0.0; num_points];
    for orbital_b in core {
        weight.iter_mut().for_each(|value| *value = 0.0);
        let end = orbital_b.pinf + 1;
        for k in multipole_range(valence, orbital_b) {
            let lambda = cache.lambda_k(k, valence.kappa, orbital_b.kappa);
            if lambda == 0.0 {
                continue;
            }
            let yk = yk_ab(grid, k as u32, orbital_b, valence)?;
            let factor = -orbital_b.occupancy * lambda;
            for i in 0..end {
                weight[i] += factor * yk[i];
            }
        }
        term.add_scaled(&weight, orbital_b, end);
    }
    Ok(term)
}
