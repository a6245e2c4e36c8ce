use tracing::debug;

use super::orbital::{Orbital, count_nodes, expected_nodes};
use crate::common::constants::{ALPHA, ALPHA_INV};
use crate::domain::{Categorized, ErrorCategory};
use crate::numerics::adams::{
    AdamsIntegrator, CoupledOde, DEFAULT_ADAMS_ORDER, DEFAULT_CORRECTOR_ITERATIONS, Direction,
    IntegratorError,
};
use crate::numerics::grid::Grid;
use crate::numerics::integration::integrate_on_grid;
use crate::numerics::wigner::l_of_kappa;

pub const DEFAULT_ENERGY_TOLERANCE: f64 = 1.0e-10;
pub const DEFAULT_MAX_SHOOTING_ITERATIONS: usize = 100;

/// `(v - e) r²` beyond which the bound orbital is treated as zero.
const PRACTICAL_INFINITY: f64 = 800.0;
const SERIES_TERMS: usize = 8;

/// Small-radius behaviour used for the outward starting values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OriginBehaviour {
    /// `r v(r) → -z`: solutions start as `r^γ` with `γ = sqrt(κ² - (αz)²)`.
    PointNucleus { z: f64 },
    /// Finite potential at the origin: solutions start as `r^|κ|`.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigensolverOptions {
    pub order: usize,
    pub corrector_iterations: usize,
    /// Converged once the energy correction is below this fraction of the energy.
    pub energy_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for EigensolverOptions {
    fn default() -> Self {
        Self {
            order: DEFAULT_ADAMS_ORDER,
            corrector_iterations: DEFAULT_CORRECTOR_ITERATIONS,
            energy_tolerance: DEFAULT_ENERGY_TOLERANCE,
            max_iterations: DEFAULT_MAX_SHOOTING_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundStateRequest<'a> {
    pub n: i32,
    pub kappa: i32,
    pub energy_guess: f64,
    pub potential: &'a [f64],
    pub origin: OriginBehaviour,
}

/// Bound-state problem with a non-local term evaluated on a fixed spinor and
/// moved to the right-hand side: `(H_local - ε) F = -(S_f, S_g)`.
#[derive(Debug, Clone, Copy)]
pub struct InhomogeneousRequest<'a> {
    pub n: i32,
    pub kappa: i32,
    pub energy_guess: f64,
    pub potential: &'a [f64],
    pub source_f: &'a [f64],
    pub source_g: &'a [f64],
    pub origin: OriginBehaviour,
}

impl InhomogeneousRequest<'_> {
    fn local(&self) -> BoundStateRequest<'_> {
        BoundStateRequest {
            n: self.n,
            kappa: self.kappa,
            energy_guess: self.energy_guess,
            potential: self.potential,
            origin: self.origin,
        }
    }
}

/// Converged orbital with shooting diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundState {
    pub orbital: Orbital,
    pub iterations: usize,
    /// Last relative energy correction `|δE / E|`.
    pub residual: f64,
    /// Jump in `f'/f` between the outward and inward branches at the match point.
    pub log_derivative_mismatch: f64,
    pub match_index: usize,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BoundStateError {
    #[error("invalid quantum numbers n={n}, kappa={kappa}")]
    InvalidQuantumNumbers { n: i32, kappa: i32 },
    #[error("input length mismatch for {name}: need {need}, got {got}")]
    LengthMismatch {
        name: &'static str,
        need: usize,
        got: usize,
    },
    #[error("grid has {points} points, shooting needs at least {need}")]
    GridTooSmall { points: usize, need: usize },
    #[error("point charge z={z} is too large for kappa={kappa}")]
    SupercriticalCharge { z: f64, kappa: i32 },
    #[error("potential has no binding region for n={n}, kappa={kappa} (minimum {emin})")]
    NoBindingRegion { n: i32, kappa: i32, emin: f64 },
    #[error(
        "eigenvalue for n={n}, kappa={kappa} not found after {iterations} iterations (energy {energy}, residual {residual:e}, nodes {nodes}/{expected})"
    )]
    NotConverged {
        n: i32,
        kappa: i32,
        iterations: usize,
        energy: f64,
        residual: f64,
        nodes: usize,
        expected: usize,
    },
    #[error("energy bracket for n={n}, kappa={kappa} collapsed at {energy} with {nodes}/{expected} nodes")]
    BracketCollapsed {
        n: i32,
        kappa: i32,
        energy: f64,
        nodes: usize,
        expected: usize,
    },
    #[error("inward and outward solutions cannot be joined at grid index {index}")]
    DegenerateMatch { index: usize },
    #[error("orbital norm must be finite and > 0, got {0}")]
    NonPositiveNorm(f64),
    #[error("trial energy must be finite and < 0, got {0}")]
    InvalidTrialEnergy(f64),
    #[error(transparent)]
    Integrator(#[from] IntegratorError),
}

impl Categorized for BoundStateError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuantumNumbers { .. }
            | Self::GridTooSmall { .. }
            | Self::SupercriticalCharge { .. } => ErrorCategory::ConfigurationError,
            Self::LengthMismatch { .. } => ErrorCategory::InternalError,
            Self::NoBindingRegion { .. }
            | Self::NotConverged { .. }
            | Self::BracketCollapsed { .. }
            | Self::InvalidTrialEnergy(_) => ErrorCategory::EigenvalueNotFound,
            Self::DegenerateMatch { .. } | Self::NonPositiveNorm(_) => {
                ErrorCategory::NumericalDivergence
            }
            Self::Integrator(error) => error.category(),
        }
    }
}

/// Spinor `scale · (S_f, S_g)` moved to the right-hand side of `(H - ε) F = -S`.
#[derive(Clone, Copy)]
struct Source<'a> {
    f: &'a [f64],
    g: &'a [f64],
    scale: f64,
}

/// Radial Dirac equation in the grid variable `u` for a fixed energy.
struct DiracOde<'a> {
    grid: &'a Grid,
    potential: &'a [f64],
    kappa: f64,
    energy: f64,
    source: Option<Source<'a>>,
}

impl<'a> DiracOde<'a> {
    fn homogeneous(grid: &'a Grid, potential: &'a [f64], kappa: i32, energy: f64) -> Self {
        Self {
            grid,
            potential,
            kappa: f64::from(kappa),
            energy,
            source: None,
        }
    }

    fn with_source(&self, source: Source<'a>) -> Self {
        Self {
            source: Some(source),
            ..*self
        }
    }
}

impl CoupledOde for DiracOde<'_> {
    fn derivative(&self, index: usize, f: f64, g: f64) -> (f64, f64) {
        let e_minus_v = self.energy - self.potential[index];
        let drdu = self.grid.drdu(index);
        let kappa_term = self.kappa * self.grid.drduor(index);
        let (mut df, mut dg) = (
            -kappa_term * f + drdu * (2.0 * ALPHA_INV + ALPHA * e_minus_v) * g,
            -drdu * ALPHA * e_minus_v * f + kappa_term * g,
        );
        if let Some(source) = self.source {
            let weight = drdu * ALPHA * source.scale;
            df -= weight * source.g[index];
            dg += weight * source.f[index];
        }
        (df, dg)
    }
}

/// Regular outward and decaying inward solutions of the homogeneous equation
/// at one energy, each valid up to the match point.
struct Branches {
    f_out: Vec<f64>,
    g_out: Vec<f64>,
    f_in: Vec<f64>,
    g_in: Vec<f64>,
    match_index: usize,
    pinf: usize,
    gamma: f64,
}

/// One outward/inward integration at a fixed trial energy.
struct Shot {
    f: Vec<f64>,
    g: Vec<f64>,
    match_index: usize,
    pinf: usize,
    nodes: usize,
    /// `∫ (f² + g²) dr` of the joined, unnormalised solution.
    norm: f64,
    f_match: f64,
    g_out: f64,
    g_in: f64,
}

/// Shooting solver for bound states of the radial Dirac equation.
#[derive(Debug, Clone)]
pub struct RadialEigensolver<'g> {
    grid: &'g Grid,
    integrator: AdamsIntegrator,
    options: EigensolverOptions,
}

impl<'g> RadialEigensolver<'g> {
    pub fn new(grid: &'g Grid, options: EigensolverOptions) -> Result<Self, BoundStateError> {
        let integrator =
            AdamsIntegrator::new(options.order, options.corrector_iterations, grid.du())?;
        let need = 4 * options.order + 2;
        if grid.num_points() < need {
            return Err(BoundStateError::GridTooSmall {
                points: grid.num_points(),
                need,
            });
        }
        Ok(Self {
            grid,
            integrator,
            options,
        })
    }

    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn options(&self) -> EigensolverOptions {
        self.options
    }

    /// Finds the eigenpair with `n - l - 1` nodes nearest the trial energy.
    pub fn solve(&self, request: &BoundStateRequest<'_>) -> Result<BoundState, BoundStateError> {
        let BoundStateRequest {
            n,
            kappa,
            energy_guess,
            potential,
            ..
        } = *request;

        let l = l_of_kappa(kappa);
        if kappa == 0 || n < 1 || l >= n {
            return Err(BoundStateError::InvalidQuantumNumbers { n, kappa });
        }
        let num_points = self.grid.num_points();
        if potential.len() != num_points {
            return Err(BoundStateError::LengthMismatch {
                name: "potential",
                need: num_points,
                got: potential.len(),
            });
        }

        let expected = expected_nodes(n, kappa);
        let emin = self.effective_potential_minimum(potential, l);
        if emin >= 0.0 {
            return Err(BoundStateError::NoBindingRegion { n, kappa, emin });
        }

        let mut e_lo = emin;
        let mut e_hi = 0.0_f64;
        let mut energy = if energy_guess.is_finite() && energy_guess > emin && energy_guess < 0.0
        {
            energy_guess
        } else if emin < -0.5 {
            -0.5
        } else {
            0.5 * emin
        };

        let mut last_nodes = 0;
        let mut residual = f64::INFINITY;
        for iteration in 1..=self.options.max_iterations {
            let shot = self.shoot(request, energy)?;
            last_nodes = shot.nodes;

            if shot.nodes != expected {
                if shot.nodes > expected {
                    e_hi = energy;
                    energy = (1.25 * energy).max(0.5 * (e_lo + energy));
                } else {
                    e_lo = energy;
                    energy = (0.75 * energy).min(0.5 * (energy + e_hi));
                }
                if (e_hi - e_lo).abs() <= f64::EPSILON * energy.abs() {
                    return Err(BoundStateError::BracketCollapsed {
                        n,
                        kappa,
                        energy,
                        nodes: shot.nodes,
                        expected,
                    });
                }
                continue;
            }

            let delta = ALPHA_INV * shot.f_match * (shot.g_out - shot.g_in) / shot.norm;
            if !delta.is_finite() {
                return Err(BoundStateError::DegenerateMatch {
                    index: shot.match_index,
                });
            }
            residual = (delta / energy).abs();
            if residual < self.options.energy_tolerance {
                let mismatch = self.log_derivative_mismatch(potential, energy, &shot);
                debug!(
                    n,
                    kappa,
                    iterations = iteration,
                    energy,
                    residual,
                    "bound state converged"
                );
                return self.finish(n, kappa, energy, shot, iteration, residual, mismatch);
            }

            if delta > 0.0 {
                e_lo = energy;
            } else {
                e_hi = energy;
            }
            let step = delta
                .clamp(-0.5 * (energy - e_lo), 0.5 * (e_hi - energy))
                .clamp(-energy.abs(), 0.5 * energy.abs());
            energy += step;

            if e_hi - e_lo <= f64::EPSILON * energy.abs() {
                return Err(BoundStateError::BracketCollapsed {
                    n,
                    kappa,
                    energy,
                    nodes: shot.nodes,
                    expected,
                });
            }
        }

        Err(BoundStateError::NotConverged {
            n,
            kappa,
            iterations: self.options.max_iterations,
            energy,
            residual,
            nodes: last_nodes,
            expected,
        })
    }

    /// Solves `(H_local - ε) F = -S` for the energy at which `F` is normalised.
    ///
    /// For a fixed source the norm behaves like `c² / (e - ε)²` near the
    /// local eigenvalue `e`, so `ε` is updated by Newton steps on `N^{-1/2}`,
    /// which is linear in `ε` in that limit. A vanishing source reduces to
    /// [`Self::solve`].
    pub fn solve_inhomogeneous(
        &self,
        request: &InhomogeneousRequest<'_>,
    ) -> Result<BoundState, BoundStateError> {
        let InhomogeneousRequest {
            n,
            kappa,
            energy_guess,
            potential,
            source_f,
            source_g,
            origin,
        } = *request;

        let l = l_of_kappa(kappa);
        if kappa == 0 || n < 1 || l >= n {
            return Err(BoundStateError::InvalidQuantumNumbers { n, kappa });
        }
        let num_points = self.grid.num_points();
        for (name, len) in [
            ("potential", potential.len()),
            ("source_f", source_f.len()),
            ("source_g", source_g.len()),
        ] {
            if len != num_points {
                return Err(BoundStateError::LengthMismatch {
                    name,
                    need: num_points,
                    got: len,
                });
            }
        }
        if source_f.iter().chain(source_g).all(|value| *value == 0.0) {
            return self.solve(&request.local());
        }
        if !(energy_guess.is_finite() && energy_guess < 0.0) {
            return Err(BoundStateError::InvalidTrialEnergy(energy_guess));
        }

        let source = Source {
            f: source_f,
            g: source_g,
            scale: 1.0,
        };
        let mut energy = energy_guess;
        let mut residual = f64::INFINITY;
        let mut last_nodes = 0;
        for iteration in 1..=self.options.max_iterations {
            let branches = self.branches(potential, kappa, origin, energy)?;
            let ode = DiracOde::homogeneous(self.grid, potential, kappa, energy);
            let (f, g) = self.particular(&ode.with_source(source), &branches)?;
            let end = branches.pinf + 1;
            let norm = integrate_on_grid(self.grid, end, |i| f[i] * f[i] + g[i] * g[i]);
            if !(norm.is_finite() && norm > 0.0) {
                return Err(BoundStateError::NonPositiveNorm(norm));
            }
            last_nodes = count_nodes(&f[..end]);

            // dF/dε solves the same equation with the source -F.
            let slope_source = Source {
                f: &f,
                g: &g,
                scale: -1.0,
            };
            let (df, dg) = self.particular(&ode.with_source(slope_source), &branches)?;
            let slope = integrate_on_grid(self.grid, end, |i| f[i] * df[i] + g[i] * dg[i]);
            let delta = norm * (1.0 - norm.sqrt()) / slope;
            if !delta.is_finite() {
                return Err(BoundStateError::DegenerateMatch {
                    index: branches.match_index,
                });
            }

            residual = (delta / energy).abs();
            if residual < self.options.energy_tolerance {
                debug!(
                    n,
                    kappa,
                    iterations = iteration,
                    energy,
                    residual,
                    nodes = last_nodes,
                    "inhomogeneous bound state converged"
                );
                let shot = Shot {
                    f,
                    g,
                    match_index: branches.match_index,
                    pinf: branches.pinf,
                    nodes: last_nodes,
                    norm,
                    f_match: 0.0,
                    g_out: 0.0,
                    g_in: 0.0,
                };
                return self.finish(n, kappa, energy, shot, iteration, residual, 0.0);
            }
            energy += delta.clamp(-0.5 * energy.abs(), 0.5 * energy.abs());
        }

        Err(BoundStateError::NotConverged {
            n,
            kappa,
            iterations: self.options.max_iterations,
            energy,
            residual,
            nodes: last_nodes,
            expected: expected_nodes(n, kappa),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        n: i32,
        kappa: i32,
        energy: f64,
        shot: Shot,
        iterations: usize,
        residual: f64,
        log_derivative_mismatch: f64,
    ) -> Result<BoundState, BoundStateError> {
        if !(shot.norm.is_finite() && shot.norm > 0.0) {
            return Err(BoundStateError::NonPositiveNorm(shot.norm));
        }
        let scale = shot.norm.sqrt().recip();
        let mut orbital = Orbital::empty(n, kappa, self.grid.num_points());
        orbital.energy = energy;
        orbital.pinf = shot.pinf;
        for (target, source) in orbital.f.iter_mut().zip(&shot.f) {
            *target = source * scale;
        }
        for (target, source) in orbital.g.iter_mut().zip(&shot.g) {
            *target = source * scale;
        }
        Ok(BoundState {
            orbital,
            iterations,
            residual,
            log_derivative_mismatch,
            match_index: shot.match_index,
        })
    }

    fn effective_potential_minimum(&self, potential: &[f64], l: i32) -> f64 {
        let centrifugal = f64::from(l * (l + 1)) * 0.5;
        potential
            .iter()
            .zip(self.grid.radii())
            .map(|(v, r)| v + centrifugal / (r * r))
            .fold(f64::INFINITY, f64::min)
    }

    fn log_derivative_mismatch(&self, potential: &[f64], energy: f64, shot: &Shot) -> f64 {
        let i = shot.match_index;
        let a = 2.0 * ALPHA_INV + ALPHA * (energy - potential[i]);
        if shot.f_match == 0.0 {
            return f64::INFINITY;
        }
        a * (shot.g_out - shot.g_in) / shot.f_match
    }

    fn branches(
        &self,
        potential: &[f64],
        kappa: i32,
        origin: OriginBehaviour,
        energy: f64,
    ) -> Result<Branches, BoundStateError> {
        let num_points = self.grid.num_points();
        let order = self.integrator.order();
        let ode = DiracOde::homogeneous(self.grid, potential, kappa, energy);

        let pinf = self.practical_infinity(potential, energy);
        let match_index = self.turning_point(potential, energy, kappa, pinf);

        let mut f_out = vec![0.0; num_points];
        let mut g_out = vec![0.0; num_points];
        let gamma = self.origin_start(potential, kappa, origin, energy, &mut f_out, &mut g_out)?;
        self.integrator.drive(
            &ode,
            &mut f_out,
            &mut g_out,
            order - 1,
            Direction::Outward,
            match_index - (order - 1),
        )?;

        let mut f_in = vec![0.0; num_points];
        let mut g_in = vec![0.0; num_points];
        self.asymptotic_start(potential, energy, kappa, pinf, &mut f_in, &mut g_in);
        let inward_start = pinf + 1 - order;
        self.integrator.drive(
            &ode,
            &mut f_in,
            &mut g_in,
            inward_start,
            Direction::Inward,
            inward_start - match_index,
        )?;

        Ok(Branches {
            f_out,
            g_out,
            f_in,
            g_in,
            match_index,
            pinf,
            gamma,
        })
    }

    fn shoot(&self, request: &BoundStateRequest<'_>, energy: f64) -> Result<Shot, BoundStateError> {
        let Branches {
            f_out,
            g_out,
            f_in,
            g_in,
            match_index,
            pinf,
            gamma,
        } = self.branches(request.potential, request.kappa, request.origin, energy)?;

        let f_match = f_out[match_index];
        let inward_at_match = f_in[match_index];
        if inward_at_match == 0.0 || !inward_at_match.is_finite() || !f_match.is_finite() {
            return Err(BoundStateError::DegenerateMatch { index: match_index });
        }
        let scale = f_match / inward_at_match;

        let mut f = f_out;
        let mut g = g_out;
        for i in match_index + 1..=pinf {
            f[i] = scale * f_in[i];
            g[i] = scale * g_in[i];
        }
        let g_outward = g[match_index];
        let g_inward = scale * g_in[match_index];

        let nodes = count_nodes(&f[..=pinf]);
        let origin_tail = self.grid.r0() * (f[0] * f[0] + g[0] * g[0]) / (2.0 * gamma + 1.0);
        let norm =
            integrate_on_grid(self.grid, pinf + 1, |i| f[i] * f[i] + g[i] * g[i]) + origin_tail;

        Ok(Shot {
            f,
            g,
            match_index,
            pinf,
            nodes,
            norm,
            f_match,
            g_out: g_outward,
            g_in: g_inward,
        })
    }

    /// Solution of `(H - ε) F = -S` that is regular at the origin and decays
    /// beyond the practical infinity, built from particular solutions started
    /// at rest plus the homogeneous branches joined in both components.
    fn particular(
        &self,
        ode: &DiracOde<'_>,
        branches: &Branches,
    ) -> Result<(Vec<f64>, Vec<f64>), BoundStateError> {
        let num_points = self.grid.num_points();
        let order = self.integrator.order();
        let m = branches.match_index;
        let pinf = branches.pinf;

        let mut f_out = vec![0.0; num_points];
        let mut g_out = vec![0.0; num_points];
        self.integrator.drive(
            ode,
            &mut f_out,
            &mut g_out,
            order - 1,
            Direction::Outward,
            m - (order - 1),
        )?;

        let mut f_in = vec![0.0; num_points];
        let mut g_in = vec![0.0; num_points];
        let inward_start = pinf + 1 - order;
        self.integrator.drive(
            ode,
            &mut f_in,
            &mut g_in,
            inward_start,
            Direction::Inward,
            inward_start - m,
        )?;

        let (out_f, out_g) = (branches.f_out[m], branches.g_out[m]);
        let (in_f, in_g) = (branches.f_in[m], branches.g_in[m]);
        let det = in_f * out_g - out_f * in_g;
        let size = (out_f.abs() + out_g.abs()) * (in_f.abs() + in_g.abs());
        if !det.is_finite() || det.abs() <= f64::EPSILON * size {
            return Err(BoundStateError::DegenerateMatch { index: m });
        }
        let jump_f = f_in[m] - f_out[m];
        let jump_g = g_in[m] - g_out[m];
        let outward_weight = (in_f * jump_g - in_g * jump_f) / det;
        let inward_weight = (out_f * jump_g - out_g * jump_f) / det;

        let mut f = vec![0.0; num_points];
        let mut g = vec![0.0; num_points];
        for i in 0..=m {
            f[i] = f_out[i] + outward_weight * branches.f_out[i];
            g[i] = g_out[i] + outward_weight * branches.g_out[i];
        }
        for i in m + 1..=pinf {
            f[i] = f_in[i] + inward_weight * branches.f_in[i];
            g[i] = g_in[i] + inward_weight * branches.g_in[i];
        }
        Ok((f, g))
    }

    fn practical_infinity(&self, potential: &[f64], energy: f64) -> usize {
        let last = self.grid.num_points() - 1;
        let mut index = last;
        while index > 0 {
            let r = self.grid.r(index);
            if (potential[index] - energy) * r * r <= PRACTICAL_INFINITY {
                break;
            }
            index -= 1;
        }
        let floor = 4 * self.integrator.order();
        (index + 1).max(floor).min(last)
    }

    /// Outermost classical turning point, kept far enough from both ends for a multistep start.
    fn turning_point(&self, potential: &[f64], energy: f64, kappa: i32, pinf: usize) -> usize {
        let l = l_of_kappa(kappa);
        let centrifugal = f64::from(l * (l + 1)) * 0.5;
        let order = self.integrator.order();
        let turning = (1..pinf)
            .rev()
            .find(|&i| {
                let r = self.grid.r(i);
                energy > potential[i] + centrifugal / (r * r)
            })
            .unwrap_or(pinf / 2);
        turning.clamp(2 * order, pinf - 2 * order)
    }

    /// Frobenius series `r^γ Σ (a_m, b_m) r^m` for `r v(r) ≈ c0 + c1 r`.
    fn origin_start(
        &self,
        potential: &[f64],
        kappa_value: i32,
        origin: OriginBehaviour,
        energy: f64,
        f: &mut [f64],
        g: &mut [f64],
    ) -> Result<f64, BoundStateError> {
        let kappa = f64::from(kappa_value);
        let r0 = self.grid.r0();
        let v0 = potential[0];

        let (alpha_z, c1, gamma) = match origin {
            OriginBehaviour::PointNucleus { z } => {
                let alpha_z = ALPHA * z;
                let gamma_sq = kappa * kappa - alpha_z * alpha_z;
                if gamma_sq <= 0.0 {
                    return Err(BoundStateError::SupercriticalCharge {
                        z,
                        kappa: kappa_value,
                    });
                }
                (alpha_z, v0 + z / r0, gamma_sq.sqrt())
            }
            OriginBehaviour::Extended => (0.0, v0, kappa.abs()),
        };

        let p = 2.0 * ALPHA_INV + ALPHA * (energy - c1);
        let q = ALPHA * (c1 - energy);

        let mut a = [0.0_f64; SERIES_TERMS];
        let mut b = [0.0_f64; SERIES_TERMS];
        if alpha_z > 0.0 {
            a[0] = 1.0;
            b[0] = (gamma + kappa) / alpha_z;
        } else if kappa < 0.0 {
            a[0] = 1.0;
        } else {
            b[0] = 1.0;
        }

        for m in 1..SERIES_TERMS {
            let gm = gamma + m as f64;
            let rhs_f = p * b[m - 1];
            let rhs_g = q * a[m - 1];
            if alpha_z > 0.0 {
                let det = gm * gm - kappa * kappa + alpha_z * alpha_z;
                a[m] = (rhs_f * (gm - kappa) + alpha_z * rhs_g) / det;
                b[m] = ((gm + kappa) * rhs_g - alpha_z * rhs_f) / det;
            } else {
                a[m] = rhs_f / (gm + kappa);
                b[m] = rhs_g / (gm - kappa);
            }
        }

        for i in 0..self.integrator.order() {
            let r = self.grid.r(i);
            let leading = r.powf(gamma);
            let mut power = 1.0;
            let mut sum_f = 0.0;
            let mut sum_g = 0.0;
            for m in 0..SERIES_TERMS {
                sum_f += a[m] * power;
                sum_g += b[m] * power;
                power *= r;
            }
            f[i] = leading * sum_f;
            g[i] = leading * sum_g;
        }
        Ok(gamma)
    }

    /// Decaying exponential `f ~ exp(-∫λ dr)` with `λ² = 2(v-e) - α²(v-e)²`.
    fn asymptotic_start(
        &self,
        potential: &[f64],
        energy: f64,
        kappa: i32,
        pinf: usize,
        f: &mut [f64],
        g: &mut [f64],
    ) {
        let kappa = f64::from(kappa);
        let decay = |i: usize| {
            let v_minus_e = potential[i] - energy;
            (2.0 * v_minus_e - ALPHA * ALPHA * v_minus_e * v_minus_e)
                .max(0.0)
                .sqrt()
        };
        let small_component = |i: usize, f_value: f64| {
            let v_minus_e = potential[i] - energy;
            let a = 2.0 * ALPHA_INV - ALPHA * v_minus_e;
            (kappa / self.grid.r(i) - decay(i)) * f_value / a
        };

        f[pinf] = 1.0;
        g[pinf] = small_component(pinf, 1.0);
        let first = pinf + 1 - self.integrator.order();
        for i in (first..pinf).rev() {
            let lambda = 0.5 * (decay(i) + decay(i + 1));
            f[i] = f[i + 1] * (lambda * (self.grid.r(i + 1) - self.grid.r(i))).exp();
            g[i] = small_component(i, f[i]);
        }
    }
}
