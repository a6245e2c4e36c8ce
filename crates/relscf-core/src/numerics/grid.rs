use serde::{Deserialize, Serialize};

use crate::domain::{Categorized, ErrorCategory};

/// Smallest grid that still leaves room for a multistep start.
pub const MIN_POINTS: usize = 4;

const NEWTON_MAX_ITERATIONS: usize = 100;
const NEWTON_TOLERANCE: f64 = 1.0e-14;

/// Mapping between the uniform variable `u` and the physical radius `r`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridKind {
    /// `u = ln r`: dense near the nucleus, sparse far out.
    Logarithmic,
    /// `u = r + b ln r`: logarithmic below `b`, close to linear above it.
    LogLinear { b: f64 },
    /// `u = r`.
    Linear,
}

impl Default for GridKind {
    fn default() -> Self {
        Self::LogLinear { b: 4.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParameters {
    pub r0: f64,
    pub rmax: f64,
    pub num_points: usize,
    pub kind: GridKind,
}

impl GridParameters {
    pub fn new(r0: f64, rmax: f64, num_points: usize, kind: GridKind) -> Self {
        Self {
            r0,
            rmax,
            num_points,
            kind,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GridError {
    #[error("grid needs at least {min} points, got {got}")]
    TooFewPoints { min: usize, got: usize },
    #[error("grid parameter '{field}' must be finite and > 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("grid rmax ({rmax}) must exceed r0 ({r0})")]
    EmptyRange { r0: f64, rmax: f64 },
    #[error("grid radius must be strictly increasing, index {index} has {current} after {previous}")]
    NonIncreasing {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("radius inversion did not converge for u={u}")]
    InversionFailed { u: f64 },
}

impl Categorized for GridError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::ConfigurationError
    }
}

/// Immutable radial grid with a uniform step `du` in the computational variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    kind: GridKind,
    du: f64,
    r: Vec<f64>,
    drdu: Vec<f64>,
    drduor: Vec<f64>,
}

impl Grid {
    pub fn new(parameters: &GridParameters) -> Result<Self, GridError> {
        let GridParameters {
            r0,
            rmax,
            num_points,
            kind,
        } = *parameters;

        if num_points < MIN_POINTS {
            return Err(GridError::TooFewPoints {
                min: MIN_POINTS,
                got: num_points,
            });
        }
        ensure_positive("r0", r0)?;
        ensure_positive("rmax", rmax)?;
        if rmax <= r0 {
            return Err(GridError::EmptyRange { r0, rmax });
        }

        let steps = (num_points - 1) as f64;
        let (du, r, drdu) = match kind {
            GridKind::Logarithmic => {
                let du = (rmax / r0).ln() / steps;
                let r: Vec<f64> = (0..num_points)
                    .map(|i| r0 * (i as f64 * du).exp())
                    .collect();
                let drdu = r.clone();
                (du, r, drdu)
            }
            GridKind::Linear => {
                let du = (rmax - r0) / steps;
                let r: Vec<f64> = (0..num_points).map(|i| r0 + i as f64 * du).collect();
                (du, r, vec![1.0; num_points])
            }
            GridKind::LogLinear { b } => {
                ensure_positive("b", b)?;
                let u_of = |radius: f64| radius + b * radius.ln();
                let u0 = u_of(r0);
                let du = (u_of(rmax) - u0) / steps;
                let mut r = Vec::with_capacity(num_points);
                let mut previous = r0;
                for i in 0..num_points {
                    let u = u0 + i as f64 * du;
                    let radius = invert_log_linear(u, b, previous)?;
                    r.push(radius);
                    previous = radius;
                }
                let drdu = r.iter().map(|radius| radius / (radius + b)).collect();
                (du, r, drdu)
            }
        };

        let mut r = r;
        if let Some(last) = r.last_mut() {
            *last = rmax;
        }
        if let Some(first) = r.first_mut() {
            *first = r0;
        }
        validate_monotonic(&r)?;

        let drduor = r
            .iter()
            .zip(&drdu)
            .map(|(radius, derivative)| derivative / radius)
            .collect();

        Ok(Self {
            kind,
            du,
            r,
            drdu,
            drduor,
        })
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn num_points(&self) -> usize {
        self.r.len()
    }

    pub fn du(&self) -> f64 {
        self.du
    }

    pub fn r(&self, index: usize) -> f64 {
        self.r[index]
    }

    pub fn drdu(&self, index: usize) -> f64 {
        self.drdu[index]
    }

    /// `drdu / r`, the factor multiplying `kappa` terms in the Dirac equation.
    pub fn drduor(&self, index: usize) -> f64 {
        self.drduor[index]
    }

    pub fn radii(&self) -> &[f64] {
        &self.r
    }

    pub fn drdu_values(&self) -> &[f64] {
        &self.drdu
    }

    pub fn r0(&self) -> f64 {
        self.r[0]
    }

    pub fn rmax(&self) -> f64 {
        self.r[self.r.len() - 1]
    }

    /// First index whose radius is `>= radius`, clamped to the last point.
    pub fn index_of(&self, radius: f64) -> usize {
        let index = self.r.partition_point(|value| *value < radius);
        index.min(self.r.len() - 1)
    }
}

fn ensure_positive(field: &'static str, value: f64) -> Result<(), GridError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GridError::NonPositive { field, value })
    }
}

fn validate_monotonic(r: &[f64]) -> Result<(), GridError> {
    for index in 1..r.len() {
        let previous = r[index - 1];
        let current = r[index];
        if !current.is_finite() || current <= previous {
            return Err(GridError::NonIncreasing {
                index,
                previous,
                current,
            });
        }
    }
    Ok(())
}

// Newton iteration on the concave map u(r); starting below the root keeps
// every iterate below it and positive.
fn invert_log_linear(u: f64, b: f64, start: f64) -> Result<f64, GridError> {
    let mut radius = start;
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let residual = radius + b * radius.ln() - u;
        let step = residual / (1.0 + b / radius);
        radius -= step;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(GridError::InversionFailed { u });
        }
        if step.abs() <= NEWTON_TOLERANCE * radius {
            return Ok(radius);
        }
    }
    Err(GridError::InversionFailed { u })
}
