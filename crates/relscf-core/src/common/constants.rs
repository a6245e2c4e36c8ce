//! Physical constants in atomic (Hartree) units.
//!
//! Shared by the solver kernels so the speed of light and unit conversions
//! are defined once.

pub const PI: f64 = std::f64::consts::PI;
pub const FOUR_PI: f64 = 4.0 * PI;
pub const THIRD: f64 = 1.0 / 3.0;

/// Inverse fine-structure constant (CODATA 2018), equal to c in atomic units.
pub const ALPHA_INV: f64 = 137.035_999_084_f64;
pub const ALPHA: f64 = 1.0 / ALPHA_INV;
pub const ALPHA2: f64 = ALPHA * ALPHA;
pub const C2: f64 = ALPHA_INV * ALPHA_INV;

pub const BOHR_ANGSTROM: f64 = 0.529_177_210_903_f64;
pub const FM_PER_BOHR: f64 = BOHR_ANGSTROM * 1.0e5;
pub const HARTREE_EV: f64 = 27.211_386_245_988_f64;
