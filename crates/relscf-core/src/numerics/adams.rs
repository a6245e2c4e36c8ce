use std::collections::VecDeque;

use crate::domain::{Categorized, ErrorCategory};

pub const MIN_ADAMS_ORDER: usize = 2;
pub const MAX_ADAMS_ORDER: usize = 12;
pub const DEFAULT_ADAMS_ORDER: usize = 8;
pub const DEFAULT_CORRECTOR_ITERATIONS: usize = 3;
pub const MAX_CORRECTOR_ITERATIONS: usize = 10;

/// Right-hand side of a coupled pair `dy1/du = f1`, `dy2/du = f2` sampled on grid indices.
pub trait CoupledOde {
    fn derivative(&self, index: usize, y1: f64, y2: f64) -> (f64, f64);
}

impl<F> CoupledOde for F
where
    F: Fn(usize, f64, f64) -> (f64, f64),
{
    fn derivative(&self, index: usize, y1: f64, y2: f64) -> (f64, f64) {
        self(index, y1, y2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Increasing radius.
    Outward,
    /// Decreasing radius.
    Inward,
}

impl Direction {
    fn step(self, index: usize) -> usize {
        match self {
            Self::Outward => index + 1,
            Self::Inward => index - 1,
        }
    }

    fn back(self, index: usize, count: usize) -> usize {
        match self {
            Self::Outward => index - count,
            Self::Inward => index + count,
        }
    }

    fn sign(self) -> f64 {
        match self {
            Self::Outward => 1.0,
            Self::Inward => -1.0,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum IntegratorError {
    #[error("Adams order must be within {min}..={max}, got {got}")]
    InvalidOrder { min: usize, max: usize, got: usize },
    #[error("corrector iterations must be within 1..={max}, got {got}")]
    InvalidCorrectorIterations { max: usize, got: usize },
    #[error("integration step must be finite and > 0, got {0}")]
    InvalidStep(f64),
    #[error("state length mismatch: y1={y1}, y2={y2}")]
    LengthMismatch { y1: usize, y2: usize },
    #[error("need {need} starting points behind index {start}, grid has {len} points")]
    NotEnoughStartingPoints {
        start: usize,
        need: usize,
        len: usize,
    },
    #[error("{steps} steps from index {start} leave the {len}-point grid")]
    OutOfBounds {
        start: usize,
        steps: usize,
        len: usize,
    },
    #[error("non-finite solution or derivative at grid index {index}")]
    NonFinite { index: usize },
}

impl Categorized for IntegratorError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::NonFinite { .. } => ErrorCategory::NumericalDivergence,
            Self::InvalidOrder { .. }
            | Self::InvalidCorrectorIterations { .. }
            | Self::InvalidStep(_) => ErrorCategory::ConfigurationError,
            Self::LengthMismatch { .. }
            | Self::NotEnoughStartingPoints { .. }
            | Self::OutOfBounds { .. } => ErrorCategory::InternalError,
        }
    }
}

/// Adams-Bashforth predictor and Adams-Moulton corrector weights of equal order.
///
/// `predictor()[j]` multiplies the derivative `j` steps behind the current
/// point; `corrector()[0]` multiplies the derivative at the new point and
/// `corrector()[j]` the one `j - 1` steps behind the current point.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamsCoefficients {
    order: usize,
    predictor: Vec<f64>,
    corrector: Vec<f64>,
}

impl AdamsCoefficients {
    pub fn new(order: usize) -> Result<Self, IntegratorError> {
        if !(MIN_ADAMS_ORDER..=MAX_ADAMS_ORDER).contains(&order) {
            return Err(IntegratorError::InvalidOrder {
                min: MIN_ADAMS_ORDER,
                max: MAX_ADAMS_ORDER,
                got: order,
            });
        }

        let predictor_nodes: Vec<f64> = (0..order).map(|j| -(j as f64)).collect();
        let corrector_nodes: Vec<f64> = (0..order).map(|j| 1.0 - j as f64).collect();

        Ok(Self {
            order,
            predictor: lagrange_weights_on_unit_step(&predictor_nodes),
            corrector: lagrange_weights_on_unit_step(&corrector_nodes),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn predictor(&self) -> &[f64] {
        &self.predictor
    }

    pub fn corrector(&self) -> &[f64] {
        &self.corrector
    }
}

// ∫_0^1 L_j(s) ds for the Lagrange basis through `nodes`.
fn lagrange_weights_on_unit_step(nodes: &[f64]) -> Vec<f64> {
    (0..nodes.len())
        .map(|j| {
            let mut polynomial = vec![1.0_f64];
            let mut denominator = 1.0_f64;
            for (m, node) in nodes.iter().enumerate() {
                if m == j {
                    continue;
                }
                let mut next = vec![0.0_f64; polynomial.len() + 1];
                for (power, coefficient) in polynomial.iter().enumerate() {
                    next[power + 1] += coefficient;
                    next[power] -= coefficient * node;
                }
                polynomial = next;
                denominator *= nodes[j] - node;
            }
            let integral: f64 = polynomial
                .iter()
                .enumerate()
                .map(|(power, coefficient)| coefficient / (power + 1) as f64)
                .sum();
            integral / denominator
        })
        .collect()
}

/// Fixed-step, fixed-order predictor-corrector stepper on a uniform `u` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamsIntegrator {
    coefficients: AdamsCoefficients,
    corrector_iterations: usize,
    du: f64,
}

impl AdamsIntegrator {
    pub fn new(order: usize, corrector_iterations: usize, du: f64) -> Result<Self, IntegratorError> {
        let coefficients = AdamsCoefficients::new(order)?;
        if !(1..=MAX_CORRECTOR_ITERATIONS).contains(&corrector_iterations) {
            return Err(IntegratorError::InvalidCorrectorIterations {
                max: MAX_CORRECTOR_ITERATIONS,
                got: corrector_iterations,
            });
        }
        if !du.is_finite() || du <= 0.0 {
            return Err(IntegratorError::InvalidStep(du));
        }
        Ok(Self {
            coefficients,
            corrector_iterations,
            du,
        })
    }

    pub fn order(&self) -> usize {
        self.coefficients.order()
    }

    pub fn corrector_iterations(&self) -> usize {
        self.corrector_iterations
    }

    pub fn coefficients(&self) -> &AdamsCoefficients {
        &self.coefficients
    }

    /// Advances the solution `num_steps` points from `start` in `direction`.
    ///
    /// The `order` points ending at `start` (behind it in the direction of
    /// travel) must already hold starting values. Visited points are written
    /// into `y1`/`y2`; the index of the last written point is returned.
    pub fn drive<O>(
        &self,
        ode: &O,
        y1: &mut [f64],
        y2: &mut [f64],
        start: usize,
        direction: Direction,
        num_steps: usize,
    ) -> Result<usize, IntegratorError>
    where
        O: CoupledOde + ?Sized,
    {
        let len = y1.len();
        if y2.len() != len {
            return Err(IntegratorError::LengthMismatch {
                y1: len,
                y2: y2.len(),
            });
        }

        let order = self.order();
        let has_history = match direction {
            Direction::Outward => start + 1 >= order && start < len,
            Direction::Inward => start + order <= len,
        };
        if !has_history {
            return Err(IntegratorError::NotEnoughStartingPoints {
                start,
                need: order,
                len,
            });
        }
        let in_bounds = match direction {
            Direction::Outward => start + num_steps < len,
            Direction::Inward => num_steps <= start,
        };
        if !in_bounds {
            return Err(IntegratorError::OutOfBounds {
                start,
                steps: num_steps,
                len,
            });
        }

        let h = self.du * direction.sign();
        let predictor = self.coefficients.predictor();
        let corrector = self.coefficients.corrector();

        let mut history = VecDeque::with_capacity(order);
        for j in 0..order {
            let index = direction.back(start, j);
            let derivative = ode.derivative(index, y1[index], y2[index]);
            if !(derivative.0.is_finite() && derivative.1.is_finite()) {
                return Err(IntegratorError::NonFinite { index });
            }
            history.push_back(derivative);
        }

        let mut current = start;
        for _ in 0..num_steps {
            let next = direction.step(current);

            let mut p1 = y1[current];
            let mut p2 = y2[current];
            for (beta, (d1, d2)) in predictor.iter().zip(history.iter()) {
                p1 += h * beta * d1;
                p2 += h * beta * d2;
            }

            let mut base1 = y1[current];
            let mut base2 = y2[current];
            for (alpha, (d1, d2)) in corrector[1..].iter().zip(history.iter()) {
                base1 += h * alpha * d1;
                base2 += h * alpha * d2;
            }

            let (mut c1, mut c2) = (p1, p2);
            for _ in 0..self.corrector_iterations {
                let (d1, d2) = ode.derivative(next, c1, c2);
                c1 = base1 + h * corrector[0] * d1;
                c2 = base2 + h * corrector[0] * d2;
            }

            let derivative = ode.derivative(next, c1, c2);
            if !(c1.is_finite()
                && c2.is_finite()
                && derivative.0.is_finite()
                && derivative.1.is_finite())
            {
                return Err(IntegratorError::NonFinite { index: next });
            }

            y1[next] = c1;
            y2[next] = c2;
            history.pop_back();
            history.push_front(derivative);
            current = next;
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AdamsCoefficients, AdamsIntegrator, DEFAULT_ADAMS_ORDER, Direction, IntegratorError,
    };

    #[test]
    fn fifth_order_weights_match_classical_tables() {
        let coefficients = AdamsCoefficients::new(5).expect("order 5 is valid");
        let predictor = [1901.0, -2774.0, 2616.0, -1274.0, 251.0];
        let corrector = [251.0, 646.0, -264.0, 106.0, -19.0];
        for (actual, expected) in coefficients.predictor().iter().zip(predictor) {
            assert!((actual - expected / 720.0).abs() <= 1.0e-13);
        }
        for (actual, expected) in coefficients.corrector().iter().zip(corrector) {
            assert!((actual - expected / 720.0).abs() <= 1.0e-13);
        }
    }

    #[test]
    fn weights_sum_to_one_for_every_supported_order() {
        for order in 2..=12 {
            let coefficients = AdamsCoefficients::new(order).expect("supported order");
            let p: f64 = coefficients.predictor().iter().sum();
            let c: f64 = coefficients.corrector().iter().sum();
            assert!((p - 1.0).abs() <= 1.0e-9, "order {order} predictor sum {p}");
            assert!((c - 1.0).abs() <= 1.0e-9, "order {order} corrector sum {c}");
        }
        assert!(AdamsCoefficients::new(1).is_err());
        assert!(AdamsCoefficients::new(13).is_err());
    }

    #[test]
    fn drives_harmonic_oscillator_outward_and_back() {
        let n = 2001;
        let du = 0.01;
        let integrator =
            AdamsIntegrator::new(DEFAULT_ADAMS_ORDER, 3, du).expect("integrator should build");
        let order = integrator.order();
        let oscillator = |_: usize, y1: f64, y2: f64| (y2, -y1);

        let mut y1 = vec![0.0; n];
        let mut y2 = vec![0.0; n];
        for i in 0..order {
            let t = i as f64 * du;
            y1[i] = t.cos();
            y2[i] = -t.sin();
        }
        let last = integrator
            .drive(&oscillator, &mut y1, &mut y2, order - 1, Direction::Outward, n - order)
            .expect("outward drive should succeed");
        assert_eq!(last, n - 1);
        let t_end = (n - 1) as f64 * du;
        assert!((y1[n - 1] - t_end.cos()).abs() <= 1.0e-9);
        assert!((y2[n - 1] + t_end.sin()).abs() <= 1.0e-9);

        let mut back1 = vec![0.0; n];
        let mut back2 = vec![0.0; n];
        for i in n - order..n {
            let t = i as f64 * du;
            back1[i] = t.cos();
            back2[i] = -t.sin();
        }
        let first = integrator
            .drive(&oscillator, &mut back1, &mut back2, n - order, Direction::Inward, n - order)
            .expect("inward drive should succeed");
        assert_eq!(first, 0);
        assert!((back1[0] - 1.0).abs() <= 1.0e-9);
        assert!(back2[0].abs() <= 1.0e-9);
    }

    #[test]
    fn reports_blow_up_at_the_offending_index() {
        let integrator = AdamsIntegrator::new(4, 2, 0.1).expect("integrator should build");
        let exploding = |index: usize, y1: f64, _: f64| {
            if index >= 10 { (f64::NAN, 0.0) } else { (y1, 0.0) }
        };
        let mut y1 = vec![1.0; 20];
        let mut y2 = vec![0.0; 20];
        let error = integrator
            .drive(&exploding, &mut y1, &mut y2, 3, Direction::Outward, 16)
            .expect_err("NaN derivative must stop the drive");
        assert_eq!(error, IntegratorError::NonFinite { index: 10 });
    }

    #[test]
    fn validates_bounds_and_starting_points() {
        let integrator = AdamsIntegrator::new(4, 2, 0.1).expect("integrator should build");
        let flat = |_: usize, _: f64, _: f64| (0.0, 0.0);
        let mut y1 = vec![0.0; 10];
        let mut y2 = vec![0.0; 10];

        let short_history = integrator
            .drive(&flat, &mut y1, &mut y2, 2, Direction::Outward, 1)
            .expect_err("needs four starting points");
        assert!(matches!(short_history, IntegratorError::NotEnoughStartingPoints { .. }));

        let overrun = integrator
            .drive(&flat, &mut y1, &mut y2, 3, Direction::Outward, 7)
            .expect_err("stepping past the last point must fail");
        assert!(matches!(overrun, IntegratorError::OutOfBounds { .. }));

        let underrun = integrator
            .drive(&flat, &mut y1, &mut y2, 6, Direction::Inward, 7)
            .expect_err("stepping before the first point must fail");
        assert!(matches!(underrun, IntegratorError::OutOfBounds { .. }));

        let mut y2_short = vec![0.0; 9];
        let mismatch = integrator
            .drive(&flat, &mut y1, &mut y2_short, 3, Direction::Outward, 1)
            .expect_err("lengths must agree");
        assert!(matches!(mismatch, IntegratorError::LengthMismatch { .. }));

        assert!(AdamsIntegrator::new(4, 0, 0.1).is_err());
        assert!(AdamsIntegrator::new(4, 2, 0.0).is_err());
    }
}
