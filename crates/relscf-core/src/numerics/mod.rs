pub mod adams;
pub mod grid;
pub mod integration;
pub mod wigner;

pub use adams::{
    AdamsCoefficients, AdamsIntegrator, CoupledOde, DEFAULT_ADAMS_ORDER,
    DEFAULT_CORRECTOR_ITERATIONS, Direction, IntegratorError,
};
pub use grid::{Grid, GridError, GridKind, GridParameters, MIN_POINTS};
pub use integration::{
    IntegrationError, cumulative_integral, integrate_on_grid, integrate_sampled,
};
pub use wigner::{
    Wigner3jInput, Wigner6jInput, l_of_kappa, lambda_k, reduced_ck, twoj_of_kappa, wigner_3j,
    wigner_6j,
};
