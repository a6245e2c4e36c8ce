pub mod bound_state;
pub mod cache;
pub mod coulomb;
pub mod energy;
pub mod exchange;
pub mod nucleus;
pub mod orbital;
pub mod potential;
pub mod scf;

pub use bound_state::{
    BoundState, BoundStateError, BoundStateRequest, DEFAULT_ENERGY_TOLERANCE,
    DEFAULT_MAX_SHOOTING_ITERATIONS, EigensolverOptions, InhomogeneousRequest, OriginBehaviour,
    RadialEigensolver,
};
pub use cache::IntegralCache;
pub use coulomb::{CoulombError, CoulombKey, radial_integral_with_yk, yk_ab, yk_from_density};
pub use energy::{core_energy, core_energy_guess, hydrogenic_energy, valence_energy_guess};
pub use exchange::{
    EXCHANGE_CUTOFF, ExchangeTerm, core_exchange_potentials, core_exchange_term,
    localized_core_exchange, localized_valence_exchange, valence_exchange_term,
};
pub use nucleus::{NuclearModel, NucleusError, default_rms_radius_fm};
pub use orbital::{Orbital, count_nodes, expected_nodes, orbital_symbol};
pub use potential::{
    Potential, slater_exchange_with_latter, thomas_fermi_potential, thomas_fermi_screening,
};
pub use scf::{
    DampingSchedule, Method, ScfError, ScfIteration, ScfOptions, ScfOutcome, ScfReport,
    ScfState, SelfConsistentField, ValenceOrbital,
};
