use serde::Deserialize;

use super::trees::sigmoid;

/// Post-hoc probability calibration fitted after the ensemble.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Calibration {
    /// Platt scaling on the raw margin: `1 / (1 + exp(a * margin + b))`.
    Sigmoid { a: f64, b: f64 },
    /// Piecewise-linear map over the uncalibrated probability.
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

impl Calibration {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Calibration::Sigmoid { a, b } => {
                if !a.is_finite() || !b.is_finite() {
                    return Err("sigmoid calibration parameters must be finite".to_string());
                }
            }
            Calibration::Isotonic { x, y } => {
                if x.is_empty() || x.len() != y.len() {
                    return Err("isotonic calibration needs matching, non-empty x and y".to_string());
                }
                if x.iter().any(|v| !v.is_finite()) || x.windows(2).any(|w| w[0] > w[1]) {
                    return Err("isotonic x points must be finite and non-decreasing".to_string());
                }
                if y.iter().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err("isotonic y values must lie in [0, 1]".to_string());
                }
            }
        }
        Ok(())
    }

    pub fn probability(&self, margin: f64) -> f64 {
        match self {
            Calibration::Sigmoid { a, b } => 1.0 / (1.0 + (a * margin + b).exp()),
            Calibration::Isotonic { x, y } => interpolate(x, y, sigmoid(margin)),
        }
    }
}

/// Linear interpolation, clamped to the end values outside `x`.
fn interpolate(x: &[f64], y: &[f64], p: f64) -> f64 {
    let last = x.len() - 1;
    if p <= x[0] {
        return y[0];
    }
    if p >= x[last] {
        return y[last];
    }
    let upper = x.partition_point(|v| *v <= p);
    let (x0, x1, y0, y1) = (x[upper - 1], x[upper], y[upper - 1], y[upper]);
    if x1 == x0 {
        return y1;
    }
    y0 + (p - x0) * (y1 - y0) / (x1 - x0)
}
