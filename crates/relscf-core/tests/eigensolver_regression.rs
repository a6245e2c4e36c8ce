use relscf_core::atom::{count_nodes, expected_nodes};
use relscf_core::{
    BoundStateRequest, Categorized, EigensolverOptions, ErrorCategory, Grid, GridKind,
    GridParameters, NuclearModel, OriginBehaviour, RadialEigensolver, hydrogenic_energy,
};

fn coulomb_grid(rmax: f64, points: usize) -> Grid {
    Grid::new(&GridParameters::new(
        1.0e-6,
        rmax,
        points,
        GridKind::LogLinear { b: 4.0 },
    ))
    .expect("grid should build")
}

fn point_potential(grid: &Grid, z: f64) -> Vec<f64> {
    grid.radii().iter().map(|r| -z / r).collect()
}

#[test]
fn hydrogen_like_levels_match_the_dirac_formula() {
    let cases = [
        (1.0, 1, -1, 60.0),
        (1.0, 2, -1, 80.0),
        (1.0, 2, 1, 80.0),
        (1.0, 3, -3, 120.0),
        (30.0, 1, -1, 10.0),
        (30.0, 2, 1, 10.0),
        (30.0, 2, -2, 10.0),
        (30.0, 3, 2, 12.0),
    ];

    for (z, n, kappa, rmax) in cases {
        let grid = coulomb_grid(rmax, 2500);
        let solver =
            RadialEigensolver::new(&grid, EigensolverOptions::default()).expect("valid options");
        let potential = point_potential(&grid, z);
        let exact = hydrogenic_energy(z, n, kappa);
        let state = solver
            .solve(&BoundStateRequest {
                n,
                kappa,
                energy_guess: 0.8 * exact,
                potential: &potential,
                origin: OriginBehaviour::PointNucleus { z },
            })
            .expect("hydrogen-like level should converge");

        let label = format!("z={z} n={n} kappa={kappa}");
        assert_scalar_close(&label, exact, state.orbital.energy, 0.0, 1.0e-6);
        assert_eq!(
            state.orbital.count_nodes(),
            expected_nodes(n, kappa),
            "{label} node count"
        );
        assert_eq!(count_nodes(&state.orbital.f), expected_nodes(n, kappa));
        assert_scalar_close(&label, 1.0, state.orbital.norm(&grid), 1.0e-8, 0.0);
        assert!(state.residual <= EigensolverOptions::default().energy_tolerance);
    }
}

#[test]
fn hydrogen_1s_expectation_value_of_r() {
    let grid = coulomb_grid(60.0, 2500);
    let solver =
        RadialEigensolver::new(&grid, EigensolverOptions::default()).expect("valid options");
    let potential = point_potential(&grid, 1.0);
    let state = solver
        .solve(&BoundStateRequest {
            n: 1,
            kappa: -1,
            energy_guess: -0.6,
            potential: &potential,
            origin: OriginBehaviour::PointNucleus { z: 1.0 },
        })
        .expect("1s should converge");
    // Non-relativistic <r> = 3/2; the Dirac correction is of order (αZ)².
    assert_scalar_close("<r>", 1.5, state.orbital.expectation_r(&grid, 1), 0.0, 1.0e-4);
}

#[test]
fn finite_nucleus_raises_deep_levels() {
    let z = 80.0;
    let grid = Grid::new(&GridParameters::new(
        1.0e-7,
        5.0,
        2500,
        GridKind::LogLinear { b: 2.0 },
    ))
    .expect("grid should build");
    let solver =
        RadialEigensolver::new(&grid, EigensolverOptions::default()).expect("valid options");

    let point = NuclearModel::Point
        .potential(&grid, z)
        .expect("point nucleus potential");
    let point_state = solver
        .solve(&BoundStateRequest {
            n: 1,
            kappa: -1,
            energy_guess: -3000.0,
            potential: &point,
            origin: NuclearModel::Point.origin_behaviour(z),
        })
        .expect("point nucleus 1s");

    let ball = NuclearModel::Ball { rms_fm: None };
    let extended = ball.potential(&grid, z).expect("ball nucleus potential");
    let ball_state = solver
        .solve(&BoundStateRequest {
            n: 1,
            kappa: -1,
            energy_guess: -3000.0,
            potential: &extended,
            origin: ball.origin_behaviour(z),
        })
        .expect("ball nucleus 1s");

    assert_scalar_close(
        "point 1s",
        hydrogenic_energy(z, 1, -1),
        point_state.orbital.energy,
        0.0,
        1.0e-6,
    );
    assert!(ball_state.orbital.energy > point_state.orbital.energy);
    let shift = (ball_state.orbital.energy - point_state.orbital.energy) / point_state.orbital.energy;
    assert!(shift.abs() < 1.0e-2, "finite-size shift {shift} too large");
}

#[test]
fn shallow_well_without_bound_state_reports_eigenvalue_failure() {
    let grid = coulomb_grid(50.0, 1000);
    let solver =
        RadialEigensolver::new(&grid, EigensolverOptions::default()).expect("valid options");
    let potential: Vec<f64> = grid
        .radii()
        .iter()
        .map(|&r| if r < 1.0 { -0.02 } else { 0.0 })
        .collect();

    let error = solver
        .solve(&BoundStateRequest {
            n: 2,
            kappa: -1,
            energy_guess: -0.01,
            potential: &potential,
            origin: OriginBehaviour::Extended,
        })
        .expect_err("a 0.02 hartree well of radius 1 bohr binds nothing");
    assert_eq!(error.category(), ErrorCategory::EigenvalueNotFound);
}

#[test]
fn potential_of_the_wrong_length_is_rejected() {
    let grid = coulomb_grid(50.0, 1000);
    let solver =
        RadialEigensolver::new(&grid, EigensolverOptions::default()).expect("valid options");
    let potential = vec![-1.0; 10];
    let error = solver
        .solve(&BoundStateRequest {
            n: 1,
            kappa: -1,
            energy_guess: -0.5,
            potential: &potential,
            origin: OriginBehaviour::Extended,
        })
        .expect_err("length mismatch");
    assert_eq!(error.category(), ErrorCategory::InternalError);

    let invalid = solver
        .solve(&BoundStateRequest {
            n: 1,
            kappa: 1,
            energy_guess: -0.5,
            potential: &point_potential(&grid, 1.0),
            origin: OriginBehaviour::PointNucleus { z: 1.0 },
        })
        .expect_err("1p- does not exist");
    assert_eq!(invalid.category(), ErrorCategory::ConfigurationError);
}

fn assert_scalar_close(label: &str, expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) {
    let diff = (expected - actual).abs();
    let tolerance = abs_tol.max(rel_tol * expected.abs());
    assert!(
        diff <= tolerance,
        "{label} mismatch: expected={expected:.15e} actual={actual:.15e} diff={diff:.15e} tol={tolerance:.15e}"
    );
}
