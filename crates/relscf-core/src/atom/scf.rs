use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::bound_state::{
    BoundState, BoundStateError, BoundStateRequest, EigensolverOptions, InhomogeneousRequest,
    RadialEigensolver,
};
use super::cache::IntegralCache;
use super::coulomb::CoulombError;
use super::energy::{core_energy, core_energy_guess, valence_energy_guess};
use super::exchange::{
    core_exchange_potentials, core_exchange_term, localized_valence_exchange,
    valence_exchange_term,
};
use super::nucleus::{NuclearModel, NucleusError};
use super::orbital::Orbital;
use super::potential::{Potential, slater_exchange_with_latter, thomas_fermi_potential};
use crate::domain::{Categorized, ErrorCategory};
use crate::numerics::grid::Grid;
use crate::numerics::integration::integrate_on_grid;
use crate::numerics::wigner::l_of_kappa;

pub const DEFAULT_MAX_SCF_ITERATIONS: usize = 128;
pub const DEFAULT_SCF_ENERGY_TOLERANCE: f64 = 1.0e-8;
pub const DEFAULT_SCF_POTENTIAL_TOLERANCE: f64 = 1.0e-6;
pub const DEFAULT_CONSECUTIVE_HITS: usize = 2;
pub const DEFAULT_DAMPING: f64 = 0.5;
pub const DEFAULT_VALENCE_DAMPING: f64 = 0.6;
pub const DEFAULT_ORBITAL_MIXING: f64 = 0.65;
pub const DEFAULT_MAX_RETRIES: usize = 4;

const ADAPTIVE_DAMPING_STEP: f64 = 0.1;
const ADAPTIVE_DAMPING_MIN: f64 = 0.1;
const ADAPTIVE_DAMPING_MAX: f64 = 0.9;

/// Form of the electron-electron potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Thomas-Fermi screening only; orbitals are solved once.
    Local,
    /// Direct potential scaled by `(N - 1) / N`, no exchange.
    Hartree,
    /// Direct potential plus local Slater exchange with the Latter tail.
    KohnSham,
    /// Direct potential plus orbital-dependent localised exchange.
    ApproxHartreeFock,
    /// Non-local exchange solved as an inhomogeneous Dirac equation, seeded
    /// from a [`Method::ApproxHartreeFock`] run.
    #[default]
    HartreeFock,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Hartree => "hartree",
            Self::KohnSham => "kohn_sham",
            Self::ApproxHartreeFock => "approx_hartree_fock",
            Self::HartreeFock => "hartree_fock",
        }
    }

    fn uses_localized_exchange(self) -> bool {
        matches!(self, Self::ApproxHartreeFock)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the mixing weight of the freshly computed potential evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DampingSchedule {
    #[default]
    Fixed,
    /// Step the weight up while the residual shrinks and down when it grows.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScfState {
    Initializing,
    IteratingOrbital,
    UpdatingPotential,
    CheckingConvergence,
    Converged,
    Failed,
}

impl ScfState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::IteratingOrbital => "iterating_orbital",
            Self::UpdatingPotential => "updating_potential",
            Self::CheckingConvergence => "checking_convergence",
            Self::Converged => "converged",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScfOptions {
    pub method: Method,
    pub max_iterations: usize,
    /// Bound on `max_a |Δε_a / ε_a|` between successive iterations.
    pub energy_tolerance: f64,
    /// Bound on `max |Δv_dir| / max |v_dir|` between successive iterations.
    pub potential_tolerance: f64,
    /// Iterations in a row that must meet both tolerances.
    pub consecutive: usize,
    /// Weight of the newly computed potential: `v = α v_new + (1 - α) v_old`.
    pub damping: f64,
    pub schedule: DampingSchedule,
    /// Weight of the new exchange potential (or, for Hartree-Fock, of the new
    /// orbital) in the frozen-core valence loop.
    pub valence_damping: f64,
    /// Weight of each newly solved core orbital in Hartree-Fock iterations.
    pub orbital_mixing: f64,
    /// Extra attempts with a perturbed trial energy after an orbital fails.
    pub max_retries: usize,
    pub eigensolver: EigensolverOptions,
}

impl Default for ScfOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            max_iterations: DEFAULT_MAX_SCF_ITERATIONS,
            energy_tolerance: DEFAULT_SCF_ENERGY_TOLERANCE,
            potential_tolerance: DEFAULT_SCF_POTENTIAL_TOLERANCE,
            consecutive: DEFAULT_CONSECUTIVE_HITS,
            damping: DEFAULT_DAMPING,
            schedule: DampingSchedule::default(),
            valence_damping: DEFAULT_VALENCE_DAMPING,
            orbital_mixing: DEFAULT_ORBITAL_MIXING,
            max_retries: DEFAULT_MAX_RETRIES,
            eigensolver: EigensolverOptions::default(),
        }
    }
}

impl ScfOptions {
    pub fn validate(&self) -> Result<(), ScfError> {
        let fractions = [
            ("damping", self.damping),
            ("valence_damping", self.valence_damping),
            ("orbital_mixing", self.orbital_mixing),
        ];
        for (field, value) in fractions {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                return Err(ScfError::InvalidOption { field, value });
            }
        }
        let tolerances = [
            ("energy_tolerance", self.energy_tolerance),
            ("potential_tolerance", self.potential_tolerance),
        ];
        for (field, value) in tolerances {
            if !(value.is_finite() && value > 0.0) {
                return Err(ScfError::InvalidOption { field, value });
            }
        }
        if self.max_iterations == 0 {
            return Err(ScfError::InvalidOption {
                field: "max_iterations",
                value: 0.0,
            });
        }
        if self.consecutive == 0 {
            return Err(ScfError::InvalidOption {
                field: "consecutive",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// Residuals recorded at the end of one outer iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScfIteration {
    pub iteration: usize,
    /// Method solved in this iteration; Hartree-Fock runs start with localised exchange.
    pub phase: Method,
    pub energy_residual: f64,
    pub potential_residual: f64,
    pub worst_orbital: String,
    pub damping: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScfReport {
    pub state: ScfState,
    pub method: Method,
    pub iterations: usize,
    pub energy_residual: f64,
    pub potential_residual: f64,
    pub worst_orbital: Option<String>,
    /// Orbital solves that needed a perturbed trial energy.
    pub retries: usize,
    pub history: Vec<ScfIteration>,
}

impl ScfReport {
    fn new(method: Method) -> Self {
        Self {
            state: ScfState::Initializing,
            method,
            iterations: 0,
            energy_residual: f64::INFINITY,
            potential_residual: f64::INFINITY,
            worst_orbital: None,
            retries: 0,
            history: Vec::new(),
        }
    }

    pub fn converged(&self) -> bool {
        self.state == ScfState::Converged
    }
}

/// Core orbitals and mean field at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScfOutcome {
    pub orbitals: Vec<Orbital>,
    pub potential: Potential,
    /// Localised exchange per core orbital; all zero unless the method uses it.
    pub exchange: Vec<Vec<f64>>,
    pub core_energy: f64,
    pub report: ScfReport,
}

/// Valence orbital solved in the frozen core.
#[derive(Debug, Clone, PartialEq)]
pub struct ValenceOrbital {
    pub orbital: Orbital,
    pub iterations: usize,
    pub residual: f64,
    /// Localised exchange with the core; zero unless the method is approximate Hartree-Fock.
    pub exchange: Vec<f64>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScfError {
    #[error("invalid SCF option '{field}': {value}")]
    InvalidOption { field: &'static str, value: f64 },
    #[error("orbital {symbol} (n={n}, kappa={kappa}) is not a valid bound state")]
    InvalidOrbital { symbol: String, n: i32, kappa: i32 },
    #[error("orbital {symbol} occupancy {occupancy} must be in (0, {max}]")]
    InvalidOccupancy {
        symbol: String,
        occupancy: f64,
        max: f64,
    },
    #[error("orbital {symbol} is listed more than once")]
    DuplicateOrbital { symbol: String },
    #[error("frozen-core valence solve requires a converged core, state is {state}")]
    CoreNotConverged { state: ScfState },
    #[error(transparent)]
    Nucleus(#[from] NucleusError),
    #[error(transparent)]
    Solver(#[from] BoundStateError),
    #[error(transparent)]
    Coulomb(#[from] CoulombError),
    #[error("orbital {symbol} failed at SCF iteration {iteration}: {source}")]
    Orbital {
        symbol: String,
        iteration: usize,
        #[source]
        source: BoundStateError,
    },
    #[error(
        "SCF not converged after {iterations} iterations (energy residual {energy_residual:e}, potential residual {potential_residual:e})"
    )]
    NotConverged {
        iterations: usize,
        energy_residual: f64,
        potential_residual: f64,
        best: Box<ScfOutcome>,
    },
    #[error("valence orbital {symbol} not converged after {iterations} iterations (residual {residual:e})")]
    ValenceNotConverged {
        symbol: String,
        iterations: usize,
        residual: f64,
    },
}

impl Categorized for ScfError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidOption { .. }
            | Self::InvalidOrbital { .. }
            | Self::InvalidOccupancy { .. }
            | Self::DuplicateOrbital { .. } => ErrorCategory::ConfigurationError,
            Self::CoreNotConverged { .. } | Self::Coulomb(_) => ErrorCategory::InternalError,
            Self::Nucleus(error) => error.category(),
            Self::Solver(error) => error.category(),
            Self::Orbital { source, .. } => source.category(),
            Self::NotConverged { .. } | Self::ValenceNotConverged { .. } => {
                ErrorCategory::ScfNotConverged
            }
        }
    }
}

/// `1, 1.1, 0.9, 1.2, 0.8, ...`
fn retry_factor(attempt: usize) -> f64 {
    if attempt == 0 {
        return 1.0;
    }
    let step = 0.1 * attempt.div_ceil(2) as f64;
    if attempt % 2 == 1 { 1.0 + step } else { 1.0 - step }
}

fn is_retryable(error: &BoundStateError) -> bool {
    matches!(
        error.category(),
        ErrorCategory::EigenvalueNotFound | ErrorCategory::NumericalDivergence
    )
}

/// Runs `solve` on the trial energy, retrying a bounded number of times with a perturbed guess.
fn retry_perturbed<F>(
    n: i32,
    kappa: i32,
    energy_guess: f64,
    max_retries: usize,
    solve: F,
) -> Result<(BoundState, usize), BoundStateError>
where
    F: Fn(f64) -> Result<BoundState, BoundStateError>,
{
    let mut attempt = 0;
    loop {
        match solve(energy_guess * retry_factor(attempt)) {
            Ok(state) => return Ok((state, attempt)),
            Err(error) if attempt < max_retries && is_retryable(&error) => {
                attempt += 1;
                warn!(
                    n,
                    kappa,
                    attempt,
                    error = %error,
                    "Orbital solve failed; retrying with a perturbed energy."
                );
            }
            Err(error) => return Err(error),
        }
    }
}

fn solve_with_retries(
    solver: &RadialEigensolver<'_>,
    request: BoundStateRequest<'_>,
    max_retries: usize,
) -> Result<(BoundState, usize), BoundStateError> {
    retry_perturbed(
        request.n,
        request.kappa,
        request.energy_guess,
        max_retries,
        |energy_guess| {
            solver.solve(&BoundStateRequest {
                energy_guess,
                ..request
            })
        },
    )
}

fn solve_inhomogeneous_with_retries(
    solver: &RadialEigensolver<'_>,
    request: InhomogeneousRequest<'_>,
    max_retries: usize,
) -> Result<(BoundState, usize), BoundStateError> {
    retry_perturbed(
        request.n,
        request.kappa,
        request.energy_guess,
        max_retries,
        |energy_guess| {
            solver.solve_inhomogeneous(&InhomogeneousRequest {
                energy_guess,
                ..request
            })
        },
    )
}

/// Fraction of the direct potential kept in the local operator of a
/// Hartree-Fock solve; the rest joins the non-local source so the local
/// field still binds the outermost shell.
fn direct_local_fraction(electrons: f64) -> f64 {
    if electrons <= 1.0 {
        return 0.5;
    }
    0.5 * (1.0 + (electrons - 1.0) / electrons)
}

/// `weight · new + (1 - weight) · previous`, renormalised; the energy stays that of `new`.
fn mix_orbitals(grid: &Grid, previous: &Orbital, mut new: Orbital, weight: f64) -> Orbital {
    if weight >= 1.0 {
        return new;
    }
    new.pinf = new.pinf.max(previous.pinf);
    for (value, old) in new.f.iter_mut().zip(&previous.f) {
        *value = weight * *value + (1.0 - weight) * old;
    }
    for (value, old) in new.g.iter_mut().zip(&previous.g) {
        *value = weight * *value + (1.0 - weight) * old;
    }
    let norm = new.norm(grid);
    if norm.is_finite() && norm > 0.0 {
        let scale = norm.sqrt().recip();
        new.f.iter_mut().chain(new.g.iter_mut()).for_each(|value| *value *= scale);
    }
    new
}

fn mix(previous: &[f64], computed: &[f64], weight: f64) -> Vec<f64> {
    previous
        .iter()
        .zip(computed)
        .map(|(old, new)| weight * new + (1.0 - weight) * old)
        .collect()
}

fn relative_change(previous: &[f64], computed: &[f64]) -> f64 {
    let scale = computed.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return 0.0;
    }
    let change = previous
        .iter()
        .zip(computed)
        .fold(0.0_f64, |acc, (old, new)| acc.max((new - old).abs()));
    change / scale
}

fn with_occupancy(mut orbital: Orbital, occupancy: f64) -> Orbital {
    orbital.occupancy = occupancy;
    orbital
}

/// Self-consistent Dirac mean field for the core of one atom.
///
/// Each outer iteration rebuilds the potential from the current orbitals,
/// damps it against the previous one, then re-solves every core orbital in
/// parallel against that fixed snapshot.
#[derive(Debug)]
pub struct SelfConsistentField<'g> {
    grid: &'g Grid,
    z: f64,
    nucleus: NuclearModel,
    options: ScfOptions,
    solver: RadialEigensolver<'g>,
    cache: IntegralCache,
    state: ScfState,
    core: Vec<Orbital>,
    potential: Potential,
    exchange: Vec<Vec<f64>>,
    previous_direct: Vec<f64>,
    previous_exchange: Vec<Vec<f64>>,
    report: ScfReport,
}

impl<'g> SelfConsistentField<'g> {
    /// `core` lists the subshells to converge; only `n`, `kappa` and
    /// `occupancy` of each entry are used.
    pub fn new(
        grid: &'g Grid,
        z: f64,
        nucleus: NuclearModel,
        core: Vec<Orbital>,
        options: ScfOptions,
    ) -> Result<Self, ScfError> {
        options.validate()?;
        let nuclear = nucleus.potential(grid, z)?;
        let solver = RadialEigensolver::new(grid, options.eigensolver)?;

        let num_points = grid.num_points();
        let mut orbitals: Vec<Orbital> = Vec::with_capacity(core.len());
        for template in core {
            validate_orbital(&template)?;
            if orbitals
                .iter()
                .any(|seen| seen.n == template.n && seen.kappa == template.kappa)
            {
                return Err(ScfError::DuplicateOrbital {
                    symbol: template.symbol(),
                });
            }
            orbitals.push(with_occupancy(
                Orbital::empty(template.n, template.kappa, num_points),
                template.occupancy,
            ));
        }

        let count = orbitals.len();
        Ok(Self {
            grid,
            z,
            nucleus,
            options,
            solver,
            cache: IntegralCache::new(),
            state: ScfState::Initializing,
            core: orbitals,
            potential: Potential::new(nuclear, vec![0.0; num_points]),
            exchange: vec![vec![0.0; num_points]; count],
            previous_direct: vec![0.0; num_points],
            previous_exchange: vec![vec![0.0; num_points]; count],
            report: ScfReport::new(options.method),
        })
    }

    pub fn state(&self) -> ScfState {
        self.state
    }

    pub fn grid(&self) -> &Grid {
        self.grid
    }

    pub fn options(&self) -> &ScfOptions {
        &self.options
    }

    pub fn orbitals(&self) -> &[Orbital] {
        &self.core
    }

    pub fn potential(&self) -> &Potential {
        &self.potential
    }

    /// Integral tables keyed by indices into [`Self::orbitals`].
    pub fn cache(&self) -> &IntegralCache {
        &self.cache
    }

    pub fn report(&self) -> &ScfReport {
        &self.report
    }

    pub fn core_electrons(&self) -> f64 {
        self.core.iter().map(|orbital| orbital.occupancy).sum()
    }

    fn transition(&mut self, next: ScfState) {
        debug!(from = %self.state, to = %next, "SCF state change");
        self.state = next;
        self.report.state = next;
    }

    fn fail(&mut self, error: ScfError) -> ScfError {
        self.transition(ScfState::Failed);
        warn!(error = %error, "SCF run failed.");
        error
    }

    /// Runs the core to self-consistency.
    #[instrument(skip_all, name = "scf_run", fields(z = self.z, method = %self.options.method))]
    pub fn run(&mut self) -> Result<ScfOutcome, ScfError> {
        self.transition(ScfState::Initializing);
        self.report = ScfReport::new(self.options.method);
        if let Err(error) = self.initialize() {
            return Err(self.fail(error));
        }

        if self.options.method == Method::Local || self.core.is_empty() {
            self.report.energy_residual = 0.0;
            self.report.potential_residual = 0.0;
            self.transition(ScfState::Converged);
            return self.outcome().map_err(|error| self.fail(error));
        }

        if self.options.method == Method::HartreeFock {
            match self.iterate_to_convergence(Method::ApproxHartreeFock) {
                Ok(true) => info!(
                    iterations = self.report.iterations,
                    "Localised-exchange seed converged."
                ),
                Ok(false) => warn!(
                    iterations = self.report.iterations,
                    energy_residual = self.report.energy_residual,
                    "Localised-exchange seed did not converge; continuing with Hartree-Fock."
                ),
                Err(error) => return Err(self.fail(error)),
            }
        }

        match self.iterate_to_convergence(self.options.method) {
            Ok(true) => {
                self.transition(ScfState::Converged);
                info!(iterations = self.report.iterations, "SCF converged.");
                return self.outcome().map_err(|error| self.fail(error));
            }
            Ok(false) => {}
            Err(error) => return Err(self.fail(error)),
        }

        self.transition(ScfState::Failed);
        warn!(
            iterations = self.report.iterations,
            energy_residual = self.report.energy_residual,
            potential_residual = self.report.potential_residual,
            "SCF did not converge."
        );
        let best = self.snapshot(f64::NAN);
        Err(ScfError::NotConverged {
            iterations: self.report.iterations,
            energy_residual: self.report.energy_residual,
            potential_residual: self.report.potential_residual,
            best: Box::new(best),
        })
    }

    /// Iterates `phase` until the convergence window is met (`true`) or the
    /// iteration budget of the phase is spent (`false`).
    fn iterate_to_convergence(&mut self, phase: Method) -> Result<bool, ScfError> {
        let mut damping = self.options.damping;
        let mut hits = 0;
        let mut previous_residual = f64::INFINITY;
        for step in 1..=self.options.max_iterations {
            let iteration = self.report.iterations + 1;
            self.transition(ScfState::UpdatingPotential);
            let potential_residual = self.update_potential(phase, damping, step == 1)?;

            self.transition(ScfState::IteratingOrbital);
            let (energy_residual, worst) = self.iterate_orbitals(phase, iteration)?;

            self.transition(ScfState::CheckingConvergence);
            self.report.iterations = iteration;
            self.report.energy_residual = energy_residual;
            self.report.potential_residual = potential_residual;
            self.report.worst_orbital = Some(worst.clone());
            self.report.history.push(ScfIteration {
                iteration,
                phase,
                energy_residual,
                potential_residual,
                worst_orbital: worst.clone(),
                damping,
            });
            info!(
                iteration,
                phase = %phase,
                energy_residual,
                potential_residual,
                worst_orbital = %worst,
                damping,
                "SCF iteration finished."
            );

            if energy_residual <= self.options.energy_tolerance
                && potential_residual <= self.options.potential_tolerance
            {
                hits += 1;
            } else {
                hits = 0;
            }
            if hits >= self.options.consecutive {
                return Ok(true);
            }

            if self.options.schedule == DampingSchedule::Adaptive {
                let residual = energy_residual.max(potential_residual);
                damping = if residual < previous_residual {
                    (damping + ADAPTIVE_DAMPING_STEP).min(ADAPTIVE_DAMPING_MAX)
                } else {
                    (damping - ADAPTIVE_DAMPING_STEP).max(ADAPTIVE_DAMPING_MIN)
                };
                previous_residual = residual;
            }
        }
        Ok(false)
    }

    /// Thomas-Fermi starting potential and a first solve of every core orbital.
    fn initialize(&mut self) -> Result<(), ScfError> {
        let screened = (self.core_electrons() - 1.0).max(0.0);
        self.potential.direct = thomas_fermi_potential(self.grid, self.z, screened);
        self.previous_direct = self.potential.direct.clone();
        for exchange in self.exchange.iter_mut().chain(self.previous_exchange.iter_mut()) {
            exchange.iter_mut().for_each(|value| *value = 0.0);
        }

        let local = self.potential.local();
        let origin = self.nucleus.origin_behaviour(self.z);
        let mut previous_energy: Option<f64> = None;
        for index in 0..self.core.len() {
            let (n, kappa, occupancy) = {
                let orbital = &self.core[index];
                (orbital.n, orbital.kappa, orbital.occupancy)
            };
            let mut guess = core_energy_guess(self.z, &self.core, n, kappa);
            // j = l + 1/2 partners sit just above the j = l - 1/2 state solved before them.
            if kappa < -1 {
                if let Some(previous) = previous_energy.filter(|energy| *energy < 0.0) {
                    guess = 0.95 * previous;
                }
            }

            let request = BoundStateRequest {
                n,
                kappa,
                energy_guess: guess,
                potential: &local,
                origin,
            };
            let (state, retries) =
                solve_with_retries(&self.solver, request, self.options.max_retries).map_err(
                    |source| ScfError::Orbital {
                        symbol: self.core[index].symbol(),
                        iteration: 0,
                        source,
                    },
                )?;
            self.report.retries += retries;
            previous_energy = Some(state.orbital.energy);
            self.core[index] = with_occupancy(state.orbital, occupancy);
        }
        self.cache.clear_radial();
        debug!(orbitals = self.core.len(), "initial orbitals solved");
        Ok(())
    }

    /// Rebuilds and damps the direct (and exchange) potential; returns the
    /// relative change of the undamped direct potential.
    fn update_potential(
        &mut self,
        phase: Method,
        damping: f64,
        first: bool,
    ) -> Result<f64, ScfError> {
        let computed_direct = self.direct_potential()?;
        let computed_exchange = if phase.uses_localized_exchange() {
            core_exchange_potentials(self.grid, &self.cache, &self.core)?
        } else {
            vec![vec![0.0; self.grid.num_points()]; self.core.len()]
        };

        let residual = relative_change(&self.potential.direct, &computed_direct);
        let mixed_direct = mix(&self.potential.direct, &computed_direct, damping);
        self.previous_direct = std::mem::replace(&mut self.potential.direct, mixed_direct);

        let mixed_exchange: Vec<Vec<f64>> = if first {
            computed_exchange
        } else {
            self.exchange
                .iter()
                .zip(&computed_exchange)
                .map(|(old, new)| mix(old, new, damping))
                .collect()
        };
        self.previous_exchange = std::mem::replace(&mut self.exchange, mixed_exchange);
        Ok(residual)
    }

    /// `Σ_b x_b y⁰_bb`, scaled or extended according to the method.
    fn direct_potential(&self) -> Result<Vec<f64>, ScfError> {
        let num_points = self.grid.num_points();
        let electrons = self.core_electrons();
        let scale = match self.options.method {
            Method::Hartree if electrons > 0.0 => (electrons - 1.0) / electrons,
            _ => 1.0,
        };

        let mut direct = vec![0.0; num_points];
        for (b, orbital) in self.core.iter().enumerate() {
            let y0 = self.cache.yk(self.grid, &self.core, 0, b, b)?;
            let weight = scale * orbital.occupancy;
            for (value, y) in direct.iter_mut().zip(y0.iter()) {
                *value += weight * y;
            }
        }

        if self.options.method == Method::KohnSham {
            let mut density = vec![0.0; num_points];
            for orbital in &self.core {
                for (i, value) in density.iter_mut().enumerate() {
                    *value += orbital.occupancy
                        * (orbital.f[i] * orbital.f[i] + orbital.g[i] * orbital.g[i]);
                }
            }
            let ion_charge = self.z - electrons;
            let exchange = slater_exchange_with_latter(
                self.grid,
                &density,
                &direct,
                &self.potential.nuclear,
                ion_charge,
            );
            for (value, vx) in direct.iter_mut().zip(exchange) {
                *value += vx;
            }
        }
        Ok(direct)
    }

    /// Solves every core orbital against the current potential snapshot.
    fn iterate_orbitals(
        &mut self,
        phase: Method,
        iteration: usize,
    ) -> Result<(f64, String), ScfError> {
        let results = if phase == Method::HartreeFock {
            self.solve_core_non_local(iteration)
        } else {
            self.solve_core_local(iteration)
        };

        let mut energy_residual = 0.0_f64;
        let mut worst = String::new();
        for (index, result) in results.into_iter().enumerate() {
            let (orbital, retries) = result?;
            self.report.retries += retries;
            let previous = &self.core[index];
            let change = ((orbital.energy - previous.energy) / orbital.energy).abs();
            if change >= energy_residual {
                energy_residual = change;
                worst = previous.symbol();
            }
            let orbital = with_occupancy(orbital, previous.occupancy);
            let replaced = *previous != orbital;
            self.core[index] = orbital;
            if replaced {
                self.cache.invalidate_orbital(index);
            }
        }
        Ok((energy_residual, worst))
    }

    fn solve_core_local(&self, iteration: usize) -> Vec<Result<(Orbital, usize), ScfError>> {
        let grid = self.grid;
        let origin = self.nucleus.origin_behaviour(self.z);
        (0..self.core.len())
            .into_par_iter()
            .map(|index| {
                let orbital = &self.core[index];
                let exchange = &self.exchange[index];
                let previous_exchange = &self.previous_exchange[index];
                let potential = self.potential.with_exchange(exchange);

                // First-order shift <a|Δv|a> of the energy from the potential update.
                let shift = integrate_on_grid(grid, orbital.pinf + 1, |i| {
                    let dv = self.potential.direct[i] - self.previous_direct[i] + exchange[i]
                        - previous_exchange[i];
                    (orbital.f[i] * orbital.f[i] + orbital.g[i] * orbital.g[i]) * dv
                });
                let guess = if orbital.energy < -shift {
                    orbital.energy + shift
                } else {
                    orbital.energy
                };

                let request = BoundStateRequest {
                    n: orbital.n,
                    kappa: orbital.kappa,
                    energy_guess: guess,
                    potential: &potential,
                    origin,
                };
                solve_with_retries(&self.solver, request, self.options.max_retries)
                    .map(|(state, retries)| (state.orbital, retries))
                    .map_err(|source| ScfError::Orbital {
                        symbol: orbital.symbol(),
                        iteration,
                        source,
                    })
            })
            .collect()
    }

    /// Hartree-Fock orbital phase: each orbital sees the nucleus plus part of
    /// the direct potential locally, and the rest of the direct potential plus
    /// the exchange with every core orbital (itself included) as a source
    /// built from the previous iterate.
    fn solve_core_non_local(&self, iteration: usize) -> Vec<Result<(Orbital, usize), ScfError>> {
        let grid = self.grid;
        let origin = self.nucleus.origin_behaviour(self.z);
        let fraction = direct_local_fraction(self.core_electrons());
        let local: Vec<f64> = self
            .potential
            .nuclear
            .iter()
            .zip(&self.potential.direct)
            .map(|(vn, vd)| vn + fraction * vd)
            .collect();
        let remainder: Vec<f64> = self
            .potential
            .direct
            .iter()
            .map(|vd| (1.0 - fraction) * vd)
            .collect();

        (0..self.core.len())
            .into_par_iter()
            .map(|index| -> Result<(Orbital, usize), ScfError> {
                let orbital = &self.core[index];
                let mut source = core_exchange_term(grid, &self.cache, &self.core, index)?;
                for (i, dv) in remainder.iter().enumerate() {
                    source.f[i] += dv * orbital.f[i];
                    source.g[i] += dv * orbital.g[i];
                }

                let request = InhomogeneousRequest {
                    n: orbital.n,
                    kappa: orbital.kappa,
                    energy_guess: orbital.energy,
                    potential: &local,
                    source_f: &source.f,
                    source_g: &source.g,
                    origin,
                };
                let (state, retries) =
                    solve_inhomogeneous_with_retries(&self.solver, request, self.options.max_retries)
                        .map_err(|source| ScfError::Orbital {
                            symbol: orbital.symbol(),
                            iteration,
                            source,
                        })?;
                let mixed = mix_orbitals(grid, orbital, state.orbital, self.options.orbital_mixing);
                Ok((mixed, retries))
            })
            .collect()
    }

    fn snapshot(&self, core_energy: f64) -> ScfOutcome {
        ScfOutcome {
            orbitals: self.core.clone(),
            potential: self.potential.clone(),
            exchange: self.exchange.clone(),
            core_energy,
            report: self.report.clone(),
        }
    }

    fn outcome(&mut self) -> Result<ScfOutcome, ScfError> {
        self.cache.clear_radial();
        let energy = core_energy(self.grid, &self.cache, &self.core)?;
        info!(core_energy = energy, "Core energy evaluated.");
        Ok(self.snapshot(energy))
    }

    /// Solves valence orbitals one by one in the frozen converged core.
    ///
    /// Each orbital sees the core mean field plus, for methods with exchange,
    /// its exchange with the core: localised for approximate Hartree-Fock,
    /// non-local for Hartree-Fock. Either is iterated with damping until the
    /// energy settles.
    #[instrument(skip_all, name = "scf_valence", fields(count = valence.len()))]
    pub fn solve_valence(&self, valence: &[Orbital]) -> Result<Vec<ValenceOrbital>, ScfError> {
        if self.state != ScfState::Converged {
            return Err(ScfError::CoreNotConverged { state: self.state });
        }
        for orbital in valence {
            validate_orbital(orbital)?;
            if self
                .core
                .iter()
                .any(|core| core.n == orbital.n && core.kappa == orbital.kappa)
            {
                return Err(ScfError::DuplicateOrbital {
                    symbol: orbital.symbol(),
                });
            }
        }

        let results: Vec<Result<ValenceOrbital, ScfError>> = valence
            .par_iter()
            .map(|template| self.solve_one_valence(template))
            .collect();
        let mut solved = Vec::with_capacity(results.len());
        for result in results {
            let state = result?;
            info!(
                orbital = %state.orbital.symbol(),
                energy = state.orbital.energy,
                iterations = state.iterations,
                "Valence orbital converged."
            );
            solved.push(state);
        }
        Ok(solved)
    }

    fn solve_one_valence(&self, template: &Orbital) -> Result<ValenceOrbital, ScfError> {
        let symbol = template.symbol();
        let origin = self.nucleus.origin_behaviour(self.z);
        let local = self.potential.local();
        let as_orbital_error = |iteration: usize| {
            let symbol = symbol.clone();
            move |source| ScfError::Orbital {
                symbol,
                iteration,
                source,
            }
        };

        let guess = valence_energy_guess(self.z, &self.core, template.n, template.kappa);
        let request = BoundStateRequest {
            n: template.n,
            kappa: template.kappa,
            energy_guess: guess,
            potential: &local,
            origin,
        };
        let (state, _) = solve_with_retries(&self.solver, request, self.options.max_retries)
            .map_err(as_orbital_error(0))?;
        let mut orbital = with_occupancy(state.orbital, template.occupancy);

        if self.core.is_empty() {
            return Ok(ValenceOrbital {
                orbital,
                iterations: 0,
                residual: 0.0,
                exchange: vec![0.0; self.grid.num_points()],
            });
        }
        if self.options.method == Method::HartreeFock {
            return self.iterate_valence_non_local(template, orbital, &local);
        }
        if !self.options.method.uses_localized_exchange() {
            return Ok(ValenceOrbital {
                orbital,
                iterations: 0,
                residual: 0.0,
                exchange: vec![0.0; self.grid.num_points()],
            });
        }

        let mut exchange: Option<Vec<f64>> = None;
        let mut residual = f64::INFINITY;
        for iteration in 1..=self.options.max_iterations {
            let computed = localized_valence_exchange(self.grid, &self.cache, &self.core, &orbital)?;
            let mixed = match &exchange {
                Some(previous) => mix(previous, &computed, self.options.valence_damping),
                None => computed,
            };
            let potential = self.potential.with_exchange(&mixed);
            let request = BoundStateRequest {
                n: template.n,
                kappa: template.kappa,
                energy_guess: orbital.energy,
                potential: &potential,
                origin,
            };
            let (state, _) = solve_with_retries(&self.solver, request, self.options.max_retries)
                .map_err(as_orbital_error(iteration))?;
            residual = ((state.orbital.energy - orbital.energy) / state.orbital.energy).abs();
            orbital = with_occupancy(state.orbital, template.occupancy);
            if residual <= self.options.energy_tolerance {
                return Ok(ValenceOrbital {
                    orbital,
                    iterations: iteration,
                    residual,
                    exchange: mixed,
                });
            }
            exchange = Some(mixed);
        }

        warn!(orbital = %symbol, residual, "Valence orbital did not converge.");
        Err(ScfError::ValenceNotConverged {
            symbol,
            iterations: self.options.max_iterations,
            residual,
        })
    }

    /// Frozen-core Hartree-Fock for one valence orbital, starting from its
    /// solution in `local` (nucleus plus core direct potential).
    fn iterate_valence_non_local(
        &self,
        template: &Orbital,
        mut orbital: Orbital,
        local: &[f64],
    ) -> Result<ValenceOrbital, ScfError> {
        let origin = self.nucleus.origin_behaviour(self.z);
        let mut residual = f64::INFINITY;
        for iteration in 1..=self.options.max_iterations {
            let source = valence_exchange_term(self.grid, &self.cache, &self.core, &orbital)?;
            // The local eigenvalue is a pole of the inhomogeneous solve; start
            // the first iteration from its first-order shift instead.
            let guess = if iteration == 1 {
                let shifted = orbital.energy + source.expectation(self.grid, &orbital);
                if shifted < 0.0 { shifted } else { orbital.energy }
            } else {
                orbital.energy
            };
            let request = InhomogeneousRequest {
                n: template.n,
                kappa: template.kappa,
                energy_guess: guess,
                potential: local,
                source_f: &source.f,
                source_g: &source.g,
                origin,
            };
            let (state, _) =
                solve_inhomogeneous_with_retries(&self.solver, request, self.options.max_retries)
                    .map_err(|source| ScfError::Orbital {
                        symbol: template.symbol(),
                        iteration,
                        source,
                    })?;
            residual = ((state.orbital.energy - orbital.energy) / state.orbital.energy).abs();
            let mixed = mix_orbitals(
                self.grid,
                &orbital,
                state.orbital,
                self.options.valence_damping,
            );
            orbital = with_occupancy(mixed, template.occupancy);
            debug!(
                orbital = %template.symbol(),
                iteration,
                energy = orbital.energy,
                residual,
                "Valence Hartree-Fock iteration."
            );
            if residual <= self.options.energy_tolerance && iteration > 1 {
                return Ok(ValenceOrbital {
                    orbital,
                    iterations: iteration,
                    residual,
                    exchange: vec![0.0; self.grid.num_points()],
                });
            }
        }

        warn!(orbital = %template.symbol(), residual, "Valence orbital did not converge.");
        Err(ScfError::ValenceNotConverged {
            symbol: template.symbol(),
            iterations: self.options.max_iterations,
            residual,
        })
    }
}

fn validate_orbital(orbital: &Orbital) -> Result<(), ScfError> {
    let l = l_of_kappa(orbital.kappa);
    if orbital.kappa == 0 || orbital.n < 1 || l >= orbital.n {
        return Err(ScfError::InvalidOrbital {
            symbol: orbital.symbol(),
            n: orbital.n,
            kappa: orbital.kappa,
        });
    }
    let max = orbital.degeneracy();
    if !(orbital.occupancy.is_finite() && orbital.occupancy > 0.0 && orbital.occupancy <= max) {
        return Err(ScfError::InvalidOccupancy {
            symbol: orbital.symbol(),
            occupancy: orbital.occupancy,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        DampingSchedule, Method, ScfError, ScfOptions, ScfState, SelfConsistentField,
        relative_change, retry_factor,
    };
    use crate::atom::nucleus::NuclearModel;
    use crate::atom::orbital::Orbital;
    use crate::domain::{Categorized, ErrorCategory};
    use crate::numerics::grid::{Grid, GridKind, GridParameters};

    fn grid() -> Grid {
        Grid::new(&GridParameters::new(1.0e-6, 40.0, 1200, GridKind::LogLinear { b: 4.0 }))
            .expect("grid should build")
    }

    #[test]
    fn retry_factors_alternate_around_the_guess() {
        let factors: Vec<f64> = (0..5).map(retry_factor).collect();
        let expected = [1.0, 1.1, 0.9, 1.2, 0.8];
        for (actual, expected) in factors.iter().zip(expected) {
            assert!((actual - expected).abs() <= 1.0e-12);
        }
    }

    #[test]
    fn relative_change_is_scaled_by_the_new_potential() {
        assert_eq!(relative_change(&[1.0, 2.0], &[1.0, 4.0]), 0.5);
        assert_eq!(relative_change(&[0.0], &[0.0]), 0.0);
    }

    #[test]
    fn invalid_options_and_orbitals_are_configuration_errors() {
        let grid = grid();
        let options = ScfOptions {
            damping: 0.0,
            ..ScfOptions::default()
        };
        let error = SelfConsistentField::new(&grid, 2.0, NuclearModel::Point, Vec::new(), options)
            .expect_err("zero damping is rejected");
        assert!(matches!(error, ScfError::InvalidOption { field: "damping", .. }));
        assert_eq!(error.category(), ErrorCategory::ConfigurationError);

        let mut overfilled = Orbital::empty(1, -1, 4);
        overfilled.occupancy = 3.0;
        let error = SelfConsistentField::new(
            &grid,
            2.0,
            NuclearModel::Point,
            vec![overfilled],
            ScfOptions::default(),
        )
        .expect_err("1s holds two electrons");
        assert!(matches!(error, ScfError::InvalidOccupancy { .. }));

        let error = SelfConsistentField::new(
            &grid,
            2.0,
            NuclearModel::Point,
            vec![Orbital::empty(1, -1, 4), Orbital::empty(1, -1, 4)],
            ScfOptions::default(),
        )
        .expect_err("duplicate 1s");
        assert!(matches!(error, ScfError::DuplicateOrbital { .. }));
    }

    #[test]
    fn local_method_solves_once_and_reports_converged() {
        let grid = grid();
        let options = ScfOptions {
            method: Method::Local,
            ..ScfOptions::default()
        };
        let mut scf = SelfConsistentField::new(
            &grid,
            2.0,
            NuclearModel::Point,
            vec![Orbital::empty(1, -1, grid.num_points())],
            options,
        )
        .expect("valid setup");
        let outcome = scf.run().expect("local run converges trivially");
        assert_eq!(scf.state(), ScfState::Converged);
        assert_eq!(outcome.report.iterations, 0);
        let orbital = &outcome.orbitals[0];
        assert_eq!(orbital.occupancy, 2.0);
        // Screened by one electron: between the bare He+ and H energies.
        assert!(orbital.energy < -0.5 && orbital.energy > -2.0);
    }

    #[test]
    fn valence_requires_a_converged_core() {
        let grid = grid();
        let scf = SelfConsistentField::new(
            &grid,
            3.0,
            NuclearModel::Point,
            vec![Orbital::empty(1, -1, grid.num_points())],
            ScfOptions {
                schedule: DampingSchedule::Adaptive,
                ..ScfOptions::default()
            },
        )
        .expect("valid setup");
        let error = scf
            .solve_valence(&[Orbital::empty(2, -1, grid.num_points())])
            .expect_err("core has not been run");
        assert!(matches!(error, ScfError::CoreNotConverged { state: ScfState::Initializing }));
        assert_eq!(error.category(), ErrorCategory::InternalError);
    }
}
