//! Run configuration for one atom: nucleus, grid, electron configuration and
//! SCF controls, read from JSON.
//!
//! Core configurations use the conventional notation (`[Ne],3s2`) and are
//! split into relativistic subshells with occupations proportional to `2j+1`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::atom::bound_state::{
    DEFAULT_ENERGY_TOLERANCE, DEFAULT_MAX_SHOOTING_ITERATIONS, EigensolverOptions,
};
use crate::atom::nucleus::NuclearModel;
use crate::atom::orbital::{Orbital, orbital_symbol};
use crate::atom::scf::{
    DEFAULT_CONSECUTIVE_HITS, DEFAULT_DAMPING, DEFAULT_MAX_RETRIES, DEFAULT_MAX_SCF_ITERATIONS,
    DEFAULT_ORBITAL_MIXING, DEFAULT_SCF_ENERGY_TOLERANCE, DEFAULT_SCF_POTENTIAL_TOLERANCE, DEFAULT_VALENCE_DAMPING,
    DampingSchedule, Method, ScfOptions,
};
use crate::domain::{Categorized, ErrorCategory};
use crate::numerics::adams::{DEFAULT_ADAMS_ORDER, DEFAULT_CORRECTOR_ITERATIONS};
use crate::numerics::grid::{Grid, GridError, GridKind, GridParameters};

const SHELL_LETTERS: [char; 7] = ['s', 'p', 'd', 'f', 'g', 'h', 'i'];

const HELIUM_CORE: &str = "1s2";
const NEON_CORE: &str = "1s2,2s2,2p6";
const ARGON_CORE: &str = "1s2,2s2,2p6,3s2,3p6";
const KRYPTON_CORE: &str = "1s2,2s2,2p6,3s2,3p6,3d10,4s2,4p6";
const XENON_CORE: &str = "1s2,2s2,2p6,3s2,3p6,3d10,4s2,4p6,4d10,5s2,5p6";
const RADON_CORE: &str =
    "1s2,2s2,2p6,3s2,3p6,3d10,4s2,4p6,4d10,5s2,5p6,4f14,5d10,6s2,6p6";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read atom configuration '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse atom configuration '{origin}': {source}")]
    Parse {
        origin: String,
        source: serde_json::Error,
    },
    #[error("nuclear charge must be finite and > 0, got {0}")]
    InvalidCharge(f64),
    #[error("unknown noble-gas core '{0}'")]
    UnknownCore(String),
    #[error("invalid shell '{shell}': {reason}")]
    InvalidShell { shell: String, reason: &'static str },
    #[error("shell '{shell}' holds at most {max} electrons, got {occupancy}")]
    OverfilledShell {
        shell: String,
        occupancy: f64,
        max: f64,
    },
    #[error("invalid orbital symbol '{0}'")]
    InvalidOrbital(String),
}

impl Categorized for ConfigError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Read { .. } => ErrorCategory::IoSystemError,
            _ => ErrorCategory::ConfigurationError,
        }
    }
}

/// One relativistic subshell with its electron count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitalSpec {
    pub n: i32,
    pub kappa: i32,
    pub occupancy: f64,
}

impl OrbitalSpec {
    pub fn symbol(&self) -> String {
        orbital_symbol(self.n, self.kappa)
    }

    pub fn to_orbital(&self, num_points: usize) -> Orbital {
        let mut orbital = Orbital::empty(self.n, self.kappa, num_points);
        orbital.occupancy = self.occupancy;
        orbital
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct NucleusConfig {
    pub model: NuclearModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub r0: f64,
    pub rmax: f64,
    pub points: usize,
    pub kind: GridKind,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            r0: 1.0e-6,
            rmax: 120.0,
            points: 3000,
            kind: GridKind::default(),
        }
    }
}

impl GridConfig {
    pub fn parameters(&self) -> GridParameters {
        GridParameters::new(self.r0, self.rmax, self.points, self.kind)
    }

    pub fn build(&self) -> Result<Grid, GridError> {
        Grid::new(&self.parameters())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DampingConfig {
    /// Weight of the newly computed core potential.
    pub factor: f64,
    pub schedule: DampingSchedule,
    /// Weight of the newly computed valence exchange (or orbital, for Hartree-Fock).
    pub valence: f64,
    /// Weight of each newly solved core orbital in Hartree-Fock iterations.
    pub orbital: f64,
}

impl Default for DampingConfig {
    fn default() -> Self {
        Self {
            factor: DEFAULT_DAMPING,
            schedule: DampingSchedule::default(),
            valence: DEFAULT_VALENCE_DAMPING,
            orbital: DEFAULT_ORBITAL_MIXING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScfSettings {
    pub method: Method,
    pub max_iterations: usize,
    pub energy_tolerance: f64,
    pub potential_tolerance: f64,
    pub consecutive: usize,
    pub damping: DampingConfig,
    pub max_retries: usize,
    pub adams_order: usize,
    pub corrector_iterations: usize,
    pub eigen_tolerance: f64,
    pub max_shooting_iterations: usize,
}

impl Default for ScfSettings {
    fn default() -> Self {
        Self {
            method: Method::default(),
            max_iterations: DEFAULT_MAX_SCF_ITERATIONS,
            energy_tolerance: DEFAULT_SCF_ENERGY_TOLERANCE,
            potential_tolerance: DEFAULT_SCF_POTENTIAL_TOLERANCE,
            consecutive: DEFAULT_CONSECUTIVE_HITS,
            damping: DampingConfig::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            adams_order: DEFAULT_ADAMS_ORDER,
            corrector_iterations: DEFAULT_CORRECTOR_ITERATIONS,
            eigen_tolerance: DEFAULT_ENERGY_TOLERANCE,
            max_shooting_iterations: DEFAULT_MAX_SHOOTING_ITERATIONS,
        }
    }
}

impl ScfSettings {
    pub fn options(&self) -> ScfOptions {
        ScfOptions {
            method: self.method,
            max_iterations: self.max_iterations,
            energy_tolerance: self.energy_tolerance,
            potential_tolerance: self.potential_tolerance,
            consecutive: self.consecutive,
            damping: self.damping.factor,
            schedule: self.damping.schedule,
            valence_damping: self.damping.valence,
            orbital_mixing: self.damping.orbital,
            max_retries: self.max_retries,
            eigensolver: EigensolverOptions {
                order: self.adams_order,
                corrector_iterations: self.corrector_iterations,
                energy_tolerance: self.eigen_tolerance,
                max_iterations: self.max_shooting_iterations,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomConfig {
    #[serde(default)]
    pub label: Option<String>,
    pub z: f64,
    #[serde(default)]
    pub nucleus: NucleusConfig,
    #[serde(default)]
    pub grid: GridConfig,
    /// Core electron configuration, e.g. `[Ne]` or `[Ar],3d10`.
    #[serde(default)]
    pub core: String,
    /// Valence orbital symbols solved in the frozen core, e.g. `["3s", "3p-"]`.
    #[serde(default)]
    pub valence: Vec<String>,
    #[serde(default)]
    pub scf: ScfSettings,
}

impl AtomConfig {
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source).map_err(|source| ConfigError::Parse {
            origin: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.z.is_finite() && self.z > 0.0) {
            return Err(ConfigError::InvalidCharge(self.z));
        }
        self.core_orbitals()?;
        self.valence_orbitals()?;
        Ok(())
    }

    pub fn display_label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("Z={}", self.z))
    }

    pub fn core_orbitals(&self) -> Result<Vec<OrbitalSpec>, ConfigError> {
        parse_core_configuration(&self.core)
    }

    /// Valence orbitals, each holding a single electron.
    pub fn valence_orbitals(&self) -> Result<Vec<OrbitalSpec>, ConfigError> {
        self.valence
            .iter()
            .map(|symbol| {
                let (n, kappa) = parse_orbital_symbol(symbol)?;
                Ok(OrbitalSpec {
                    n,
                    kappa,
                    occupancy: 1.0,
                })
            })
            .collect()
    }

    pub fn scf_options(&self) -> ScfOptions {
        self.scf.options()
    }
}

pub fn load_atom_config(path: impl AsRef<Path>) -> Result<AtomConfig, ConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AtomConfig =
        serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
            origin: path.display().to_string(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

fn noble_gas_core(symbol: &str) -> Option<&'static str> {
    match symbol.to_ascii_lowercase().as_str() {
        "he" => Some(HELIUM_CORE),
        "ne" => Some(NEON_CORE),
        "ar" => Some(ARGON_CORE),
        "kr" => Some(KRYPTON_CORE),
        "xe" => Some(XENON_CORE),
        "rn" => Some(RADON_CORE),
        _ => None,
    }
}

fn shell_letter_to_l(letter: char) -> Option<i32> {
    SHELL_LETTERS
        .iter()
        .position(|candidate| *candidate == letter.to_ascii_lowercase())
        .and_then(|index| i32::try_from(index).ok())
}

/// `(n, l, electrons)` from a non-relativistic shell such as `3d10`.
fn parse_shell(token: &str) -> Result<(i32, i32, f64), ConfigError> {
    let invalid = |reason| ConfigError::InvalidShell {
        shell: token.to_string(),
        reason,
    };
    let letter_at = token
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| invalid("missing orbital letter"))?;
    let n: i32 = token[..letter_at]
        .parse()
        .map_err(|_| invalid("missing principal quantum number"))?;
    let mut rest = token[letter_at..].chars();
    let letter = rest.next().ok_or_else(|| invalid("missing orbital letter"))?;
    let l = shell_letter_to_l(letter).ok_or_else(|| invalid("unknown orbital letter"))?;
    let count: f64 = rest
        .as_str()
        .parse()
        .map_err(|_| invalid("missing electron count"))?;

    if n < 1 || l >= n {
        return Err(invalid("requires 0 <= l < n"));
    }
    if !(count.is_finite() && count >= 0.0) {
        return Err(invalid("electron count must be >= 0"));
    }
    Ok((n, l, count))
}

/// Expands a core configuration string into relativistic subshells.
///
/// Tokens are separated by commas or whitespace; repeated shells accumulate.
/// Subshells appear in first-mention order with `j = l - 1/2` before
/// `j = l + 1/2`.
pub fn parse_core_configuration(text: &str) -> Result<Vec<OrbitalSpec>, ConfigError> {
    let mut shells: Vec<(i32, i32, f64)> = Vec::new();
    let mut push = |n: i32, l: i32, count: f64| {
        if let Some(existing) = shells.iter_mut().find(|(sn, sl, _)| *sn == n && *sl == l) {
            existing.2 += count;
        } else {
            shells.push((n, l, count));
        }
    };

    for token in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        if let Some(inner) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            let expansion =
                noble_gas_core(inner).ok_or_else(|| ConfigError::UnknownCore(token.to_string()))?;
            for shell in expansion.split(',') {
                let (n, l, count) = parse_shell(shell)?;
                push(n, l, count);
            }
        } else {
            let (n, l, count) = parse_shell(token)?;
            push(n, l, count);
        }
    }

    let mut orbitals = Vec::new();
    for (n, l, count) in shells {
        let capacity = f64::from(4 * l + 2);
        if count > capacity {
            return Err(ConfigError::OverfilledShell {
                shell: format!("{n}{}", SHELL_LETTERS[l as usize]),
                occupancy: count,
                max: capacity,
            });
        }
        if count == 0.0 {
            continue;
        }
        if l == 0 {
            orbitals.push(OrbitalSpec {
                n,
                kappa: -1,
                occupancy: count,
            });
            continue;
        }
        let lower = f64::from(2 * l);
        let upper = f64::from(2 * l + 2);
        orbitals.push(OrbitalSpec {
            n,
            kappa: l,
            occupancy: count * lower / capacity,
        });
        orbitals.push(OrbitalSpec {
            n,
            kappa: -l - 1,
            occupancy: count * upper / capacity,
        });
    }
    Ok(orbitals)
}

/// `(n, kappa)` from `2s`, `2p-` (j = l - 1/2), `2p+` or `2p` (j = l + 1/2).
pub fn parse_orbital_symbol(symbol: &str) -> Result<(i32, i32), ConfigError> {
    let invalid = || ConfigError::InvalidOrbital(symbol.to_string());
    let trimmed = symbol.trim();
    let letter_at = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(invalid)?;
    let n: i32 = trimmed[..letter_at].parse().map_err(|_| invalid())?;
    let mut rest = trimmed[letter_at..].chars();
    let l = rest
        .next()
        .and_then(shell_letter_to_l)
        .ok_or_else(invalid)?;
    let kappa = match rest.as_str() {
        "" | "+" => -l - 1,
        "-" if l > 0 => l,
        _ => return Err(invalid()),
    };
    if n < 1 || l >= n {
        return Err(invalid());
    }
    Ok((n, kappa))
}

#[cfg(test)]
mod tests {
    use super::{AtomConfig, ConfigError, parse_core_configuration, parse_orbital_symbol};
    use crate::atom::nucleus::NuclearModel;
    use crate::atom::scf::{DampingSchedule, Method};
    use crate::domain::{Categorized, ErrorCategory};
    use crate::numerics::grid::GridKind;

    #[test]
    fn orbital_symbols_map_to_kappa() {
        assert_eq!(parse_orbital_symbol("1s").expect("1s"), (1, -1));
        assert_eq!(parse_orbital_symbol("2p-").expect("2p-"), (2, 1));
        assert_eq!(parse_orbital_symbol("2p+").expect("2p+"), (2, -2));
        assert_eq!(parse_orbital_symbol("2p").expect("2p"), (2, -2));
        assert_eq!(parse_orbital_symbol(" 4f- ").expect("4f-"), (4, 3));
        for bad in ["2s-", "1p", "s", "3x", "2p*", ""] {
            assert!(parse_orbital_symbol(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn noble_gas_cores_expand_into_relativistic_subshells() {
        let core = parse_core_configuration("[Ne]").expect("neon core");
        let summary: Vec<(i32, i32, f64)> = core
            .iter()
            .map(|orbital| (orbital.n, orbital.kappa, orbital.occupancy))
            .collect();
        assert_eq!(
            summary,
            vec![(1, -1, 2.0), (2, -1, 2.0), (2, 1, 2.0), (2, -2, 4.0)]
        );

        let copper = parse_core_configuration("[Ar] 3d10").expect("copper core");
        let electrons: f64 = copper.iter().map(|orbital| orbital.occupancy).sum();
        assert_eq!(electrons, 28.0);
        assert_eq!(copper.len(), 9);
    }

    #[test]
    fn open_shells_split_by_degeneracy_and_bad_shells_fail() {
        let carbon = parse_core_configuration("[He],2s2,2p2").expect("carbon");
        let p_minus = carbon.iter().find(|o| o.kappa == 1).expect("2p-");
        let p_plus = carbon.iter().find(|o| o.kappa == -2).expect("2p+");
        assert!((p_minus.occupancy - 2.0 / 3.0).abs() <= 1.0e-12);
        assert!((p_plus.occupancy - 4.0 / 3.0).abs() <= 1.0e-12);

        assert!(matches!(
            parse_core_configuration("[Ne],3s3"),
            Err(ConfigError::OverfilledShell { .. })
        ));
        assert!(matches!(
            parse_core_configuration("[Qq]"),
            Err(ConfigError::UnknownCore(_))
        ));
        assert!(matches!(
            parse_core_configuration("1d2"),
            Err(ConfigError::InvalidShell { .. })
        ));
        assert!(parse_core_configuration("").expect("empty core").is_empty());
    }

    #[test]
    fn hartree_fock_is_the_default_method_with_orbital_mixing() {
        let config = AtomConfig::from_json(r#"{ "z": 10, "core": "[Ne]" }"#)
            .expect("valid configuration");
        let options = config.scf_options();
        assert_eq!(options.method, Method::HartreeFock);
        assert_eq!(options.orbital_mixing, 0.65);

        let config = AtomConfig::from_json(
            r#"{ "z": 10, "core": "[Ne]", "scf": { "damping": { "orbital": 0.5 } } }"#,
        )
        .expect("valid configuration");
        assert_eq!(config.scf_options().orbital_mixing, 0.5);
    }

    #[test]
    fn json_configuration_applies_defaults() {
        let config = AtomConfig::from_json(
            r#"{
                "label": "Na",
                "z": 11,
                "core": "[Ne]",
                "valence": ["3s", "3p-"],
                "nucleus": { "model": { "type": "fermi", "c_fm": 2.9, "t_fm": 2.3 } },
                "grid": { "points": 2500, "kind": { "type": "log_linear", "b": 3.5 } },
                "scf": { "damping": { "schedule": "adaptive" }, "method": "kohn_sham" }
            }"#,
        )
        .expect("valid configuration");

        assert_eq!(config.display_label(), "Na");
        assert_eq!(
            config.nucleus.model,
            NuclearModel::Fermi {
                c_fm: 2.9,
                t_fm: 2.3
            }
        );
        assert_eq!(config.grid.points, 2500);
        assert_eq!(config.grid.r0, 1.0e-6);
        assert_eq!(config.grid.kind, GridKind::LogLinear { b: 3.5 });
        let options = config.scf_options();
        assert_eq!(options.method, Method::KohnSham);
        assert_eq!(options.schedule, DampingSchedule::Adaptive);
        assert_eq!(options.damping, 0.5);
        assert_eq!(options.eigensolver.order, 8);

        let valence = config.valence_orbitals().expect("valence");
        assert_eq!(valence.len(), 2);
        assert_eq!(valence[1].symbol(), "3p-");
        assert_eq!(config.core_orbitals().expect("core").len(), 4);
    }

    #[test]
    fn invalid_json_and_charge_are_configuration_errors() {
        let error = AtomConfig::from_json(r#"{ "z": -3 }"#).expect_err("negative charge");
        assert!(matches!(error, ConfigError::InvalidCharge(_)));
        assert_eq!(error.category(), ErrorCategory::ConfigurationError);

        let error = AtomConfig::from_json(r#"{ "z": 3, "unknown": 1 }"#)
            .expect_err("unknown fields are rejected");
        assert!(matches!(error, ConfigError::Parse { .. }));

        let error = AtomConfig::from_json(r#"{ "z": 3, "valence": ["2s-"] }"#)
            .expect_err("2s- does not exist");
        assert!(matches!(error, ConfigError::InvalidOrbital(_)));
    }
}
