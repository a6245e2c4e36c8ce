use super::CliError;
use super::report::{OrbitalRow, RunSummary, table_header, table_row};
use anyhow::Context;
use relscf_core::common::{load_atom_config, parse_orbital_symbol};
use relscf_core::domain::{Categorized, RelScfError};
use relscf_core::{
    BoundStateRequest, EigensolverOptions, Grid, GridKind, GridParameters, Orbital,
    OriginBehaviour, RadialEigensolver, ScfError, SelfConsistentField, hydrogenic_energy,
};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Atom configuration (JSON)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Write a JSON summary of the run to this path
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct HydrogenicArgs {
    /// Nuclear charge
    #[arg(long)]
    z: f64,

    /// Comma-separated orbital symbols, e.g. 1s,2p-,3d+
    #[arg(long, value_delimiter = ',', default_value = "1s")]
    orbitals: Vec<String>,

    /// First grid point (bohr)
    #[arg(long, default_value_t = 1.0e-6)]
    r0: f64,

    /// Last grid point (bohr); defaults to a radius that holds every requested orbital
    #[arg(long)]
    rmax: Option<f64>,

    /// Number of grid points
    #[arg(long, default_value_t = 3000)]
    points: usize,
}

fn component<E>(placeholder: &'static str) -> impl FnOnce(E) -> CliError
where
    E: Categorized + Display,
{
    move |error| CliError::Compute(RelScfError::from_component(placeholder, &error))
}

pub(super) fn run_atom_command(args: RunArgs) -> Result<i32, CliError> {
    let config = load_atom_config(&args.config).map_err(component("CONFIG.LOAD"))?;
    let grid = config.grid.build().map_err(component("CONFIG.GRID"))?;
    let core: Vec<Orbital> = config
        .core_orbitals()
        .map_err(component("CONFIG.CORE"))?
        .iter()
        .map(|entry| entry.to_orbital(grid.num_points()))
        .collect();
    let valence: Vec<Orbital> = config
        .valence_orbitals()
        .map_err(component("CONFIG.VALENCE"))?
        .iter()
        .map(|entry| entry.to_orbital(grid.num_points()))
        .collect();

    let label = config.display_label();
    info!(label = %label, z = config.z, core = core.len(), valence = valence.len(), "Starting run.");
    let mut scf = SelfConsistentField::new(
        &grid,
        config.z,
        config.nucleus.model,
        core,
        config.scf_options(),
    )
    .map_err(component("CONFIG.SCF"))?;

    let outcome = match scf.run() {
        Ok(outcome) => outcome,
        Err(error) => {
            if let ScfError::NotConverged { best, .. } = &error {
                let summary = RunSummary::new(label, config.z, &grid, best);
                println!("{}", summary.render());
                if let Some(path) = &args.json {
                    write_summary(path, &summary)?;
                }
            }
            return Err(component("RUN.SCF")(error));
        }
    };

    let solved = scf
        .solve_valence(&valence)
        .map_err(component("RUN.VALENCE"))?;
    let summary = RunSummary::new(label, config.z, &grid, &outcome).with_valence(&grid, &solved);
    println!("{}", summary.render());
    if let Some(path) = &args.json {
        write_summary(path, &summary)?;
        println!("JSON summary: {}", path.display());
    }
    Ok(0)
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

pub(super) fn run_hydrogenic_command(args: HydrogenicArgs) -> Result<i32, CliError> {
    if !(args.z.is_finite() && args.z > 0.0) {
        return Err(CliError::Usage(format!(
            "Invalid nuclear charge '{}'; expected a positive number.",
            args.z
        )));
    }
    let states = args
        .orbitals
        .iter()
        .map(|symbol| parse_orbital_symbol(symbol.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(component("CONFIG.ORBITAL"))?;
    if states.is_empty() {
        return Err(CliError::Usage("No orbitals requested.".to_string()));
    }

    let n_max = states.iter().map(|(n, _)| *n).max().unwrap_or(1);
    let rmax = args
        .rmax
        .unwrap_or_else(|| 10.0 + 40.0 * f64::from(n_max * n_max) / args.z);
    let grid = Grid::new(&GridParameters::new(
        args.r0,
        rmax,
        args.points,
        GridKind::default(),
    ))
    .map_err(component("CONFIG.GRID"))?;
    let solver = RadialEigensolver::new(&grid, EigensolverOptions::default())
        .map_err(component("CONFIG.SOLVER"))?;
    let potential: Vec<f64> = grid.radii().iter().map(|r| -args.z / r).collect();

    println!("Hydrogen-like ion Z={} on {} points to r={rmax}", args.z, grid.num_points());
    println!("{} {:>20} {:>11}", table_header(), "exact (Ha)", "rel. error");
    for (n, kappa) in states {
        let exact = hydrogenic_energy(args.z, n, kappa);
        let state = solver
            .solve(&BoundStateRequest {
                n,
                kappa,
                energy_guess: 0.9 * exact,
                potential: &potential,
                origin: OriginBehaviour::PointNucleus { z: args.z },
            })
            .map_err(component("RUN.EIGENVALUE"))?;
        let orbital = &state.orbital;
        let row = OrbitalRow {
            symbol: orbital.symbol(),
            n,
            kappa,
            occupancy: orbital.occupancy,
            energy: orbital.energy,
            mean_radius: orbital.expectation_r(&grid, 1),
            nodes: orbital.count_nodes(),
            iterations: state.iterations,
            residual: state.residual,
        };
        let relative = ((orbital.energy - exact) / exact).abs();
        println!("{} {:>20.10} {:>11.3e}", table_row(&row), exact, relative);
    }
    Ok(0)
}
