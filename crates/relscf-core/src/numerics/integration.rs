use super::grid::Grid;

/// End weights of the extended closed rule; interior weights are 1.
const END_WEIGHTS: [f64; 3] = [3.0 / 8.0, 7.0 / 6.0, 23.0 / 24.0];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntegrationError {
    #[error("input length mismatch for {name}: need at least {need}, got {got}")]
    LengthMismatch {
        name: &'static str,
        need: usize,
        got: usize,
    },
}

/// Integrates `integrand(i) * dr/du` over grid indices `0..end` in `u`.
///
/// Uses the fourth-order extended closed rule when at least six points are
/// available and the trapezoidal rule otherwise.
pub fn integrate_on_grid<F>(grid: &Grid, end: usize, integrand: F) -> f64
where
    F: Fn(usize) -> f64,
{
    let end = end.min(grid.num_points());
    let sum: f64 = (0..end)
        .map(|i| quadrature_weight(i, end) * integrand(i) * grid.drdu(i))
        .sum();
    sum * grid.du()
}

/// Integrates sampled values `f(r_i)` over the whole grid.
pub fn integrate_sampled(grid: &Grid, values: &[f64]) -> Result<f64, IntegrationError> {
    ensure_len("values", grid.num_points(), values.len())?;
    Ok(integrate_on_grid(grid, values.len(), |i| values[i]))
}

pub fn quadrature_weight(index: usize, end: usize) -> f64 {
    if end < 2 || index >= end {
        return 0.0;
    }
    if end < 2 * END_WEIGHTS.len() {
        return if index == 0 || index == end - 1 { 0.5 } else { 1.0 };
    }
    let from_end = end - 1 - index;
    let edge = index.min(from_end);
    END_WEIGHTS.get(edge).copied().unwrap_or(1.0)
}

/// Running integral `∫_{r_0}^{r_i} f dr` with the cubic four-point rule per step.
pub fn cumulative_integral(grid: &Grid, values: &[f64]) -> Result<Vec<f64>, IntegrationError> {
    let n = grid.num_points();
    ensure_len("values", n, values.len())?;
    let scaled: Vec<f64> = (0..n).map(|i| values[i] * grid.drdu(i)).collect();
    let h = grid.du();
    let mut running = vec![0.0; n];
    for i in 1..n {
        running[i] = running[i - 1] + step_integral(&scaled, i, h);
    }
    Ok(running)
}

/// `∫_{u_{i-1}}^{u_i} F du` from cubic interpolation through neighbouring
/// points, falling back to one-sided quadratic forms at the ends.
pub(crate) fn step_integral(scaled: &[f64], i: usize, h: f64) -> f64 {
    let n = scaled.len();
    if n < 3 {
        return 0.5 * h * (scaled[i - 1] + scaled[i]);
    }
    if i >= 2 && i + 1 < n {
        h / 24.0 * (-scaled[i - 2] + 13.0 * scaled[i - 1] + 13.0 * scaled[i] - scaled[i + 1])
    } else if i + 1 < n {
        h / 12.0 * (5.0 * scaled[i - 1] + 8.0 * scaled[i] - scaled[i + 1])
    } else {
        h / 12.0 * (-scaled[i - 2] + 8.0 * scaled[i - 1] + 5.0 * scaled[i])
    }
}

fn ensure_len(name: &'static str, need: usize, got: usize) -> Result<(), IntegrationError> {
    if got < need {
        return Err(IntegrationError::LengthMismatch { name, need, got });
    }
    Ok(())
}
