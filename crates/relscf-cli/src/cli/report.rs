use relscf_core::atom::ValenceOrbital;
use relscf_core::{Grid, Method, Orbital, ScfOutcome, ScfReport, ScfState};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub(super) struct OrbitalRow {
    pub(super) symbol: String,
    pub(super) n: i32,
    pub(super) kappa: i32,
    pub(super) occupancy: f64,
    pub(super) energy: f64,
    pub(super) mean_radius: f64,
    pub(super) nodes: usize,
    pub(super) iterations: usize,
    pub(super) residual: f64,
}

impl OrbitalRow {
    fn from_orbital(grid: &Grid, orbital: &Orbital, iterations: usize, residual: f64) -> Self {
        Self {
            symbol: orbital.symbol(),
            n: orbital.n,
            kappa: orbital.kappa,
            occupancy: orbital.occupancy,
            energy: orbital.energy,
            mean_radius: orbital.expectation_r(grid, 1),
            nodes: orbital.count_nodes(),
            iterations,
            residual,
        }
    }
}

/// Machine-readable result of `relscf run`.
#[derive(Debug, Clone, Serialize)]
pub(super) struct RunSummary {
    pub(super) label: String,
    pub(super) z: f64,
    pub(super) method: Method,
    pub(super) state: ScfState,
    /// Absent when the core did not converge.
    pub(super) core_energy: Option<f64>,
    pub(super) report: ScfReport,
    pub(super) core: Vec<OrbitalRow>,
    pub(super) valence: Vec<OrbitalRow>,
}

impl RunSummary {
    pub(super) fn new(label: String, z: f64, grid: &Grid, outcome: &ScfOutcome) -> Self {
        let report = outcome.report.clone();
        let core = outcome
            .orbitals
            .iter()
            .map(|orbital| {
                OrbitalRow::from_orbital(grid, orbital, report.iterations, report.energy_residual)
            })
            .collect();
        Self {
            label,
            z,
            method: report.method,
            state: report.state,
            core_energy: outcome.core_energy.is_finite().then_some(outcome.core_energy),
            report,
            core,
            valence: Vec::new(),
        }
    }

    pub(super) fn with_valence(mut self, grid: &Grid, valence: &[ValenceOrbital]) -> Self {
        self.valence = valence
            .iter()
            .map(|state| {
                OrbitalRow::from_orbital(grid, &state.orbital, state.iterations, state.residual)
            })
            .collect();
        self
    }

    pub(super) fn render(&self) -> String {
        let mut lines = vec![format!(
            "{} (Z={}) {}: {} after {} iterations",
            self.label, self.z, self.method, self.state, self.report.iterations
        )];
        lines.push(table_header());
        lines.extend(self.core.iter().map(table_row));
        if !self.valence.is_empty() {
            lines.push("valence:".to_string());
            lines.extend(self.valence.iter().map(table_row));
        }
        if let Some(energy) = self.core_energy {
            lines.push(format!("core energy: {energy:.10} Ha"));
        }
        lines.join("\n")
    }
}

pub(super) fn table_header() -> String {
    format!(
        "{:<7} {:>9} {:>20} {:>14} {:>6} {:>6} {:>11}",
        "orbital", "occupancy", "energy (Ha)", "<r> (a0)", "nodes", "iter", "residual"
    )
}

pub(super) fn table_row(row: &OrbitalRow) -> String {
    format!(
        "{:<7} {:>9.4} {:>20.10} {:>14.6} {:>6} {:>6} {:>11.3e}",
        row.symbol, row.occupancy, row.energy, row.mean_radius, row.nodes, row.iterations, row.residual
    )
}
