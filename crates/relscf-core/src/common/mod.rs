pub mod config;
pub mod constants;

pub use config::{
    AtomConfig, ConfigError, DampingConfig, GridConfig, NucleusConfig, OrbitalSpec,
    ScfSettings, load_atom_config, parse_core_configuration, parse_orbital_symbol,
};
