//! Step size control for adaptive embedded methods.

use ndarray::ArrayD;

use crate::config::SolverConfig;
use crate::error::SolveResult;
use crate::function::OdeFunction;

/// Adaptive step-size controller.
///
/// After each trial step the controller turns the normalized error ratio
/// into the next step size: `factor = safety * err^(-1/order)`, clamped to
/// `[min_factor, max_factor]`. A step is accepted iff the ratio is below 1.
#[derive(Debug, Clone)]
pub struct StepSizeController {
    /// Safety factor (default: 0.9)
    pub safety: f64,
    /// Minimum scale factor (default: 0.2)
    pub min_factor: f64,
    /// Maximum scale factor (default: 10.0)
    pub max_factor: f64,
}

impl Default for StepSizeController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
        }
    }
}

impl StepSizeController {
    /// Compute the next step magnitude from the error estimate.
    ///
    /// # Arguments
    /// * `h` - Current step magnitude (unsigned)
    /// * `err` - Normalized error ratio (accepted when < 1)
    /// * `order` - Order of the method
    pub fn next_step(&self, h: f64, err: f64, order: usize) -> (f64, bool) {
        let accept = err < 1.0;

        let exponent = 1.0 / order as f64;
        let factor = if err == 0.0 {
            self.max_factor
        } else {
            self.safety * (1.0 / err).powf(exponent)
        };
        let factor = factor.clamp(self.min_factor, self.max_factor);

        // Never grow the step after a rejection.
        let factor = if accept { factor } else { factor.min(1.0) };

        (h * factor, accept)
    }

    /// Estimate the initial step, signed with the direction of integration.
    ///
    /// Scaled norms of the state and its derivative seed
    /// `h = sqrt(||y|| / ||y'||)`; a trial Euler step then estimates the
    /// second derivative by finite difference and refines the step so that
    /// `h^order * max(||y'||, ||y''||) ≈ 0.01`. Falls back to a signed 1e-6
    /// when the problem gives no usable scale, and clamps against the
    /// configured bounds and `1e-12 * |t0|` (to stay clear of catastrophic
    /// cancellation when t0 is large).
    #[allow(clippy::too_many_arguments)]
    pub fn initial_step<F>(
        &self,
        f: &mut F,
        t0: f64,
        y0: &ArrayD<f64>,
        f0: &ArrayD<f64>,
        order: usize,
        config: &SolverConfig,
        dir: f64,
    ) -> SolveResult<f64>
    where
        F: OdeFunction,
    {
        let sc: Vec<f64> = y0
            .iter()
            .map(|y| config.abs_tol + config.rel_tol * y.abs())
            .collect();

        let d0 = scaled_rms(y0, &sc);
        let d1 = scaled_rms(f0, &sc);

        let h0 = if d0 < 1e-10 || d1 < 1e-10 {
            1e-6
        } else {
            (d0 / d1).sqrt()
        };

        // Trial Euler step to estimate the second derivative.
        let mut y1 = y0.clone();
        y1.scaled_add(dir * h0, f0);
        let f1 = f.evaluate(&y1, t0 + dir * h0)?;

        let df = &f1 - f0;
        let d2 = scaled_rms(&df, &sc) / h0;

        let h = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / order as f64)
        };

        let h = h
            .clamp(config.min_step, config.max_step)
            .max(1e-12 * t0.abs());
        Ok(dir * h)
    }
}

/// Root-mean-square of `v` scaled elementwise by `sc`.
fn scaled_rms(v: &ArrayD<f64>, sc: &[f64]) -> f64 {
    let n = v.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = v
        .iter()
        .zip(sc)
        .map(|(x, s)| (x / s) * (x / s))
        .sum();
    (sum / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn vector(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    #[test]
    fn test_accepts_small_error_and_grows() {
        let controller = StepSizeController::default();
        let (h_new, accept) = controller.next_step(0.1, 0.1, 5);
        assert!(accept);
        assert!(h_new > 0.1);
    }

    #[test]
    fn test_rejects_large_error_and_shrinks() {
        let controller = StepSizeController::default();
        let (h_new, accept) = controller.next_step(0.1, 10.0, 5);
        assert!(!accept);
        assert!(h_new < 0.1);
    }

    #[test]
    fn test_zero_error_grows_by_max_factor() {
        let controller = StepSizeController::default();
        let (h_new, accept) = controller.next_step(0.1, 0.0, 5);
        assert!(accept);
        assert!((h_new - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_growth_is_clamped() {
        let controller = StepSizeController::default();
        let (h_new, _) = controller.next_step(1.0, 1e-12, 5);
        assert!(h_new <= controller.max_factor);
    }

    #[test]
    fn test_initial_step_sign_follows_direction() {
        let controller = StepSizeController::default();
        let config = SolverConfig::default();
        let y0 = vector(&[1.0]);

        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);
        let f0 = vector(&[-1.0]);

        let h_fwd = controller
            .initial_step(&mut f, 0.0, &y0, &f0, 5, &config, 1.0)
            .unwrap();
        assert!(h_fwd > 0.0);

        let h_bwd = controller
            .initial_step(&mut f, 1.0, &y0, &f0, 5, &config, -1.0)
            .unwrap();
        assert!(h_bwd < 0.0);
    }

    #[test]
    fn test_initial_step_fallback_near_zero_state() {
        let controller = StepSizeController::default();
        let config = SolverConfig::default();

        // State and derivative both vanish: no scale to work with.
        let y0 = vector(&[0.0]);
        let f0 = vector(&[0.0]);
        let mut f = |_y: &ArrayD<f64>, _t: f64| vector(&[0.0]);

        let h = controller
            .initial_step(&mut f, 0.0, &y0, &f0, 5, &config, 1.0)
            .unwrap();
        assert!(h > 0.0);
        assert!(h <= 1e-3);
    }
}
