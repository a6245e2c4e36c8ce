use serde::{Deserialize, Serialize};

use super::bound_state::OriginBehaviour;
use crate::common::constants::FM_PER_BOHR;
use crate::domain::{Categorized, ErrorCategory};
use crate::numerics::grid::Grid;
use crate::numerics::integration::cumulative_integral;

/// Charge distribution of the nucleus. Radii are in femtometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NuclearModel {
    #[default]
    Point,
    /// Uniformly charged sphere; `rms_fm` defaults to the empirical estimate.
    Ball {
        #[serde(default)]
        rms_fm: Option<f64>,
    },
    /// Two-parameter Fermi distribution with half-density radius `c_fm` and
    /// 90%-10% skin thickness `t_fm`.
    Fermi { c_fm: f64, t_fm: f64 },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum NucleusError {
    #[error("nuclear charge must be finite and > 0, got {0}")]
    InvalidCharge(f64),
    #[error("nuclear parameter '{field}' must be finite and > 0, got {value}")]
    InvalidParameter { field: &'static str, value: f64 },
    #[error("nuclear charge distribution integrates to {0} on this grid")]
    EmptyDistribution(f64),
}

impl Categorized for NucleusError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::ConfigurationError
    }
}

/// Empirical rms charge radius `0.836 A^{1/3} + 0.570` fm with `A ≈ 2.5 Z`.
pub fn default_rms_radius_fm(z: f64) -> f64 {
    let mass_number = (2.5 * z).max(1.0);
    0.836 * mass_number.cbrt() + 0.570
}

impl NuclearModel {
    pub fn origin_behaviour(&self, z: f64) -> OriginBehaviour {
        match self {
            Self::Point => OriginBehaviour::PointNucleus { z },
            Self::Ball { .. } | Self::Fermi { .. } => OriginBehaviour::Extended,
        }
    }

    /// Nuclear potential energy of an electron at each grid point.
    pub fn potential(&self, grid: &Grid, z: f64) -> Result<Vec<f64>, NucleusError> {
        if !z.is_finite() || z <= 0.0 {
            return Err(NucleusError::InvalidCharge(z));
        }
        match *self {
            Self::Point => Ok(grid.radii().iter().map(|r| -z / r).collect()),
            Self::Ball { rms_fm } => {
                let rms = rms_fm.unwrap_or_else(|| default_rms_radius_fm(z));
                ensure_positive("rms_fm", rms)?;
                let radius = (5.0_f64 / 3.0).sqrt() * rms / FM_PER_BOHR;
                Ok(grid
                    .radii()
                    .iter()
                    .map(|&r| {
                        if r < radius {
                            -z / (2.0 * radius) * (3.0 - (r / radius).powi(2))
                        } else {
                            -z / r
                        }
                    })
                    .collect())
            }
            Self::Fermi { c_fm, t_fm } => {
                ensure_positive("c_fm", c_fm)?;
                ensure_positive("t_fm", t_fm)?;
                fermi_potential(grid, z, c_fm / FM_PER_BOHR, t_fm / FM_PER_BOHR)
            }
        }
    }
}

fn ensure_positive(field: &'static str, value: f64) -> Result<(), NucleusError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(NucleusError::InvalidParameter { field, value })
    }
}

// Potential of a spherical density: -Z [Q(r)/r + ∫_r^∞ ρ r' dr'] / Q(∞).
fn fermi_potential(grid: &Grid, z: f64, c: f64, t: f64) -> Result<Vec<f64>, NucleusError> {
    let a = t / (4.0 * 3.0_f64.ln());
    let density: Vec<f64> = grid
        .radii()
        .iter()
        .map(|r| 1.0 / (1.0 + ((r - c) / a).exp()))
        .collect();
    let enclosed_integrand: Vec<f64> = grid
        .radii()
        .iter()
        .zip(&density)
        .map(|(r, rho)| rho * r * r)
        .collect();
    let outer_integrand: Vec<f64> = grid
        .radii()
        .iter()
        .zip(&density)
        .map(|(r, rho)| rho * r)
        .collect();

    let enclosed = cumulative_integral(grid, &enclosed_integrand)
        .map_err(|_| NucleusError::EmptyDistribution(0.0))?;
    let outer = cumulative_integral(grid, &outer_integrand)
        .map_err(|_| NucleusError::EmptyDistribution(0.0))?;

    let last = grid.num_points() - 1;
    let total = enclosed[last];
    if !(total.is_finite() && total > 0.0) {
        return Err(NucleusError::EmptyDistribution(total));
    }
    let outer_total = outer[last];

    Ok((0..grid.num_points())
        .map(|i| -z * (enclosed[i] / grid.r(i) + outer_total - outer[i]) / total)
        .collect())
}
