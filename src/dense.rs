//! Dense output: per-step quartic interpolation.
//!
//! After an accepted step from (t0, y0) to (t1, y1) the solution can be
//! evaluated anywhere inside the step without extra derivative evaluations.
//! A quartic polynomial in the normalized coordinate x = (t - t0)/(t1 - t0)
//! is fitted in closed form against five pieces of data: the endpoint
//! values, the endpoint derivatives (the first and last cached stages), and
//! a midpoint estimate built from a fixed linear combination of all stage
//! derivatives (the Dormand-Prince MID weights).
//!
//! The fit matches the local error order of the 5(4) pair, so interpolated
//! values are as accurate as the step endpoints themselves.

use ndarray::ArrayD;

use crate::error::{SolveError, SolveResult};
use crate::solver::StepRecord;

/// Quartic interpolant over one completed integration step.
///
/// Coefficients are stored highest power first:
/// `p(x) = c[0] x^4 + c[1] x^3 + c[2] x^2 + c[3] x + c[4]`.
/// Valid only for times inside the step it was fitted on; the sampler
/// overwrites it on the next major step rather than keeping a cache.
#[derive(Debug, Clone)]
pub struct Interpolant {
    t0: f64,
    t1: f64,
    coeffs: [ArrayD<f64>; 5],
}

impl Interpolant {
    /// Fit a quartic over an accepted step.
    ///
    /// `mid_weights` is the tableau-specific midpoint combination, one
    /// weight per cached stage derivative.
    pub fn fit(step: &StepRecord<'_>, mid_weights: &[f64]) -> SolveResult<Self> {
        let k = step.k;
        if mid_weights.len() != k.len() {
            return Err(SolveError::InvalidConfig {
                parameter: "mid_weights".to_string(),
                message: format!("expected {} weights, got {}", k.len(), mid_weights.len()),
            });
        }

        let h = step.t1 - step.t0;
        let y0 = step.y0;
        let y1 = step.y1;
        let f0 = &k[0];
        let f1 = &k[k.len() - 1];

        // y_mid = y0 + h * sum(mid_i * k_i)
        let mut y_mid = y0.clone();
        for (ki, &wi) in k.iter().zip(mid_weights) {
            if wi != 0.0 {
                y_mid.scaled_add(h * wi, ki);
            }
        }

        // Closed-form quartic through (y0, y_mid, y1) with slopes h*f0, h*f1
        // at the endpoints of the normalized interval.
        let mut c4 = y_mid.mapv(|v| 16.0 * v);
        c4.scaled_add(2.0 * h, f1);
        c4.scaled_add(-2.0 * h, f0);
        c4.scaled_add(-8.0, y0);
        c4.scaled_add(-8.0, y1);

        let mut c3 = y_mid.mapv(|v| -32.0 * v);
        c3.scaled_add(5.0 * h, f0);
        c3.scaled_add(-3.0 * h, f1);
        c3.scaled_add(18.0, y0);
        c3.scaled_add(14.0, y1);

        let mut c2 = y_mid.mapv(|v| 16.0 * v);
        c2.scaled_add(h, f1);
        c2.scaled_add(-4.0 * h, f0);
        c2.scaled_add(-11.0, y0);
        c2.scaled_add(-5.0, y1);

        let c1 = f0.mapv(|v| h * v);
        let c0 = y0.clone();

        Ok(Self {
            t0: step.t0,
            t1: step.t1,
            coeffs: [c4, c3, c2, c1, c0],
        })
    }

    /// The step this interpolant covers.
    pub fn span(&self) -> (f64, f64) {
        (self.t0, self.t1)
    }

    /// Whether `t` lies inside the fitted step (either time direction).
    pub fn contains(&self, t: f64) -> bool {
        (t - self.t0) * (t - self.t1) <= 0.0
    }

    /// Evaluate the interpolant at `t`.
    ///
    /// Fails with [`SolveError::OutOfInterval`] outside the fitted step.
    pub fn eval(&self, t: f64) -> SolveResult<ArrayD<f64>> {
        if !self.contains(t) {
            return Err(SolveError::OutOfInterval {
                t,
                t0: self.t0,
                t1: self.t1,
            });
        }

        let x = (t - self.t0) / (self.t1 - self.t0);

        // Horner evaluation over the coefficient tensors.
        let mut out = self.coeffs[0].clone();
        for c in &self.coeffs[1..] {
            out.mapv_inplace(|v| v * x);
            out += c;
        }
        Ok(out)
    }
}
