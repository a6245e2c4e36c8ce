pub mod atom;
pub mod common;
pub mod domain;
pub mod numerics;

pub use atom::{
    BoundState, BoundStateError, BoundStateRequest, CoulombKey, DampingSchedule,
    EigensolverOptions, InhomogeneousRequest, IntegralCache, Method, NuclearModel, Orbital,
    OriginBehaviour, RadialEigensolver, ScfError, ScfOptions, ScfOutcome, ScfReport, ScfState,
    SelfConsistentField, hydrogenic_energy,
};
pub use common::config::AtomConfig;
pub use domain::{Categorized, ErrorCategory, RelScfError, RelScfResult};
pub use numerics::{
    AdamsCoefficients, AdamsIntegrator, CoupledOde, Direction, Grid, GridError, GridKind,
    GridParameters, IntegratorError,
};
