//! Embedded Runge-Kutta integration core.
//!
//! Drives the stage evaluations, embedded error estimation, and the
//! accept/reject loop for any [`ButcherTableau`]. Time may run in either
//! direction; every step size carries the sign of `t1 - t0`. The adjoint
//! machinery reuses this loop unchanged by substituting the derivative
//! function.

use ndarray::ArrayD;

use crate::config::SolverConfig;
use crate::controller::StepSizeController;
use crate::dopri5;
use crate::error::{SolveError, SolveResult};
use crate::function::OdeFunction;
use crate::tableau::ButcherTableau;

/// Result of one integration call.
#[derive(Debug, Clone)]
pub struct OdeSolution {
    /// Final state y(t1), in the caller's original shape.
    pub y: ArrayD<f64>,

    /// Number of derivative evaluations.
    pub nfev: usize,

    /// Number of accepted steps.
    pub naccept: usize,

    /// Number of rejected steps.
    pub nreject: usize,
}

/// One accepted major step, handed to the observer of
/// [`RungeKuttaSolver::integrate_observed`].
///
/// The stage derivative cache `k` is valid only for the duration of the
/// callback; it is overwritten by the next step.
#[derive(Debug)]
pub struct StepRecord<'a> {
    /// Step start time.
    pub t0: f64,
    /// Step end time.
    pub t1: f64,
    /// State at step start.
    pub y0: &'a ArrayD<f64>,
    /// State at step end.
    pub y1: &'a ArrayD<f64>,
    /// Stage derivatives, one per tableau stage.
    pub k: &'a [ArrayD<f64>],
}

/// Adaptive embedded Runge-Kutta integrator.
#[derive(Debug, Clone)]
pub struct RungeKuttaSolver {
    tableau: ButcherTableau,
    config: SolverConfig,
    controller: StepSizeController,
    error_weights: Vec<f64>,
    fsal: bool,
}

impl RungeKuttaSolver {
    /// Build a solver from a tableau and configuration.
    ///
    /// Both are validated here; a malformed tableau or inverted step bounds
    /// fail construction rather than integration.
    pub fn new(tableau: ButcherTableau, config: SolverConfig) -> SolveResult<Self> {
        tableau.validate()?;
        config.validate()?;
        let error_weights = tableau.error_weights();
        let fsal = tableau.is_fsal();
        Ok(Self {
            tableau,
            config,
            controller: StepSizeController::default(),
            error_weights,
            fsal,
        })
    }

    /// Build the default Dormand-Prince 5(4) solver.
    pub fn dopri5(config: SolverConfig) -> SolveResult<Self> {
        Self::new(dopri5::tableau(), config)
    }

    /// The solver's tableau.
    pub fn tableau(&self) -> &ButcherTableau {
        &self.tableau
    }

    /// The solver's configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Integrate dy/dt = f(y, t) from `t0` to `t1`.
    ///
    /// `t1 < t0` integrates backward. `t0 == t1` returns `y0` unchanged
    /// without invoking `f`.
    ///
    /// # Example
    ///
    /// ```
    /// use adjode::{RungeKuttaSolver, SolverConfig};
    /// use ndarray::{ArrayD, IxDyn};
    ///
    /// // dy/dt = -y, y(0) = 1; exact solution exp(-t).
    /// let solver = RungeKuttaSolver::dopri5(
    ///     SolverConfig::with_tolerances(1e-6, 1e-6),
    /// ).unwrap();
    /// let y0 = ArrayD::from_shape_vec(IxDyn(&[1]), vec![1.0]).unwrap();
    /// let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);
    ///
    /// let solution = solver.integrate(&mut f, [0.0, 1.0], &y0).unwrap();
    /// assert!((solution.y[[0]] - (-1.0f64).exp()).abs() < 1e-4);
    /// ```
    pub fn integrate<F>(
        &self,
        f: &mut F,
        t_span: [f64; 2],
        y0: &ArrayD<f64>,
    ) -> SolveResult<OdeSolution>
    where
        F: OdeFunction,
    {
        self.integrate_observed(f, t_span, y0, |_: &StepRecord<'_>| Ok(()))
    }

    /// Integrate, invoking `observer` after every accepted major step.
    ///
    /// The observer receives the step endpoints and the full stage
    /// derivative cache, which is what dense-output fitting needs. An error
    /// returned by the observer aborts the integration.
    pub fn integrate_observed<F, O>(
        &self,
        f: &mut F,
        t_span: [f64; 2],
        y0: &ArrayD<f64>,
        mut observer: O,
    ) -> SolveResult<OdeSolution>
    where
        F: OdeFunction,
        O: FnMut(&StepRecord<'_>) -> SolveResult<()>,
    {
        let [t_start, t_end] = t_span;

        if t_start == t_end {
            return Ok(OdeSolution {
                y: y0.clone(),
                nfev: 0,
                naccept: 0,
                nreject: 0,
            });
        }

        let dir = (t_end - t_start).signum();
        let stages = self.tableau.stages();
        let order = self.tableau.order;

        let mut t = t_start;
        let mut y = y0.clone();

        let mut k1 = f.evaluate(&y, t)?;
        let mut nfev = 1;
        if k1.shape() != y0.shape() {
            return Err(SolveError::ShapeMismatch {
                expected: y0.shape().to_vec(),
                actual: k1.shape().to_vec(),
                context: "integrate: derivative function is not shape-preserving".to_string(),
            });
        }

        let mut h = self
            .controller
            .initial_step(f, t, &y, &k1, order, &self.config, dir)?;
        nfev += 1;

        let mut k: Vec<ArrayD<f64>> = Vec::with_capacity(stages);
        let mut naccept = 0;
        let mut nreject = 0;

        while (t_end - t) * dir > 0.0 {
            if naccept + nreject >= self.config.max_steps {
                return Err(SolveError::MaxStepsExceeded {
                    steps: self.config.max_steps,
                    t,
                });
            }

            // Clip the final step to land on the boundary exactly.
            let clipped = (t + h - t_end) * dir >= 0.0;
            if clipped {
                h = t_end - t;
            }

            // Stage evaluations per the tableau.
            k.clear();
            k.push(k1.clone());
            for (row, ci) in self.tableau.a.iter().zip(&self.tableau.c) {
                let y_stage = weighted_sum(&y, &k, row, h);
                k.push(f.evaluate(&y_stage, t + ci * h)?);
            }
            nfev += stages - 1;

            let y1 = weighted_sum(&y, &k, &self.tableau.b, h);

            let y_err = {
                let zero = ArrayD::zeros(y.raw_dim());
                weighted_sum(&zero, &k, &self.error_weights, h)
            };
            let err = error_ratio(
                &y_err,
                &y,
                &y1,
                self.config.rel_tol,
                self.config.abs_tol,
            );

            let (h_next, accept) = self.controller.next_step(h.abs(), err, order);

            if accept {
                let t_new = if clipped { t_end } else { t + h };
                observer(&StepRecord {
                    t0: t,
                    t1: t_new,
                    y0: &y,
                    y1: &y1,
                    k: &k,
                })?;

                t = t_new;
                y = y1;
                naccept += 1;

                if (t_end - t) * dir > 0.0 {
                    if self.fsal {
                        k1 = k[stages - 1].clone();
                    } else {
                        k1 = f.evaluate(&y, t)?;
                        nfev += 1;
                    }
                }
            } else {
                if h.abs() <= self.config.min_step {
                    return Err(SolveError::StepSizeUnderflow { step: h.abs(), t });
                }
                nreject += 1;
            }

            h = dir * h_next.clamp(self.config.min_step, self.config.max_step);
        }

        Ok(OdeSolution {
            y,
            nfev,
            naccept,
            nreject,
        })
    }

    /// Take one full tableau step from `t0` to `t1` with no error control.
    ///
    /// The step size is exactly `t1 - t0`; the embedded estimate is not
    /// consulted. This is the primitive behind the input-driven sampling
    /// strategy, where the requested output times are the step grid.
    pub fn single_step<F>(
        &self,
        f: &mut F,
        t0: f64,
        t1: f64,
        y0: &ArrayD<f64>,
    ) -> SolveResult<ArrayD<f64>>
    where
        F: OdeFunction,
    {
        if t0 == t1 {
            return Ok(y0.clone());
        }
        let h = t1 - t0;

        let mut k: Vec<ArrayD<f64>> = Vec::with_capacity(self.tableau.stages());
        k.push(f.evaluate(y0, t0)?);
        for (row, ci) in self.tableau.a.iter().zip(&self.tableau.c) {
            let y_stage = weighted_sum(y0, &k, row, h);
            k.push(f.evaluate(&y_stage, t0 + ci * h)?);
        }

        Ok(weighted_sum(y0, &k, &self.tableau.b, h))
    }
}

/// `base + h * sum(coeffs[j] * stages[j])`, skipping zero coefficients.
fn weighted_sum(
    base: &ArrayD<f64>,
    stages: &[ArrayD<f64>],
    coeffs: &[f64],
    h: f64,
) -> ArrayD<f64> {
    let mut out = base.clone();
    for (kj, &cj) in stages.iter().zip(coeffs) {
        if cj != 0.0 {
            out.scaled_add(h * cj, kj);
        }
    }
    out
}

/// Normalized error ratio: rms of the embedded estimate against
/// `abs_tol + rel_tol * max(|y0|, |y1|)`. A ratio below 1 means the step
/// meets tolerance.
pub(crate) fn error_ratio(
    y_err: &ArrayD<f64>,
    y0: &ArrayD<f64>,
    y1: &ArrayD<f64>,
    rel_tol: f64,
    abs_tol: f64,
) -> f64 {
    let n = y_err.len();
    let mut sum = 0.0;
    for ((e, a), b) in y_err.iter().zip(y0.iter()).zip(y1.iter()) {
        let sc = abs_tol + rel_tol * a.abs().max(b.abs());
        sum += (e / sc) * (e / sc);
    }
    (sum / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn vector(values: &[f64]) -> ArrayD<f64> {
        ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()
    }

    fn solver(abs_tol: f64, rel_tol: f64) -> RungeKuttaSolver {
        RungeKuttaSolver::dopri5(SolverConfig::with_tolerances(abs_tol, rel_tol)).unwrap()
    }

    #[test]
    fn test_exponential_decay() {
        // dy/dt = -y over [0, 1] at tol 1e-6: y(1) = e^-1.
        let solver = solver(1e-6, 1e-6);
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let solution = solver.integrate(&mut f, [0.0, 1.0], &vector(&[1.0])).unwrap();
        let exact = (-1.0f64).exp();
        assert!(
            (solution.y[[0]] - exact).abs() < 1e-4,
            "y = {}, exact = {}",
            solution.y[[0]],
            exact
        );
        assert!(solution.naccept > 0);
        assert!(solution.nfev > solution.naccept);
    }

    #[test]
    fn test_harmonic_oscillator() {
        // y1' = y2, y2' = -y1; after one period the state returns.
        let solver = solver(1e-8, 1e-6);
        let mut f = |y: &ArrayD<f64>, _t: f64| vector(&[y[[1]], -y[[0]]]);

        let solution = solver
            .integrate(&mut f, [0.0, 2.0 * std::f64::consts::PI], &vector(&[1.0, 0.0]))
            .unwrap();
        assert!((solution.y[[0]] - 1.0).abs() < 1e-4);
        assert!(solution.y[[1]].abs() < 1e-4);
    }

    #[test]
    fn test_time_dependent_rhs() {
        // dy/dt = 3t^2, y(0) = 0: y(2) = 8.
        let solver = solver(1e-9, 1e-9);
        let mut f = |y: &ArrayD<f64>, t: f64| {
            let mut dy = y.clone();
            dy.fill(3.0 * t * t);
            dy
        };

        let solution = solver.integrate(&mut f, [0.0, 2.0], &vector(&[0.0])).unwrap();
        assert!((solution.y[[0]] - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_backward_integration() {
        // Integrate dy/dt = -y from t=1 back to t=0 starting at e^-1.
        let solver = solver(1e-8, 1e-8);
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let y1 = vector(&[(-1.0f64).exp()]);
        let solution = solver.integrate(&mut f, [1.0, 0.0], &y1).unwrap();
        assert!(
            (solution.y[[0]] - 1.0).abs() < 1e-5,
            "y = {}",
            solution.y[[0]]
        );
    }

    #[test]
    fn test_degenerate_span_skips_function() {
        let solver = solver(1e-6, 1e-6);
        let mut calls = 0usize;
        let mut f = |y: &ArrayD<f64>, _t: f64| {
            calls += 1;
            y.clone()
        };

        let y0 = vector(&[1.0, 2.0]);
        let solution = solver.integrate(&mut f, [0.5, 0.5], &y0).unwrap();
        assert_eq!(solution.y, y0);
        assert_eq!(solution.nfev, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_state_shape_round_trips() {
        // A 2x2 matrix state decays elementwise.
        let y0 = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let solver = solver(1e-8, 1e-8);
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let solution = solver.integrate(&mut f, [0.0, 1.0], &y0).unwrap();
        assert_eq!(solution.y.shape(), &[2, 2]);
        let decay = (-1.0f64).exp();
        for (out, init) in solution.y.iter().zip(y0.iter()) {
            assert!((out - init * decay).abs() < 1e-5);
        }
    }

    #[test]
    fn test_shape_mismatch_detected_eagerly() {
        let solver = solver(1e-6, 1e-6);
        let mut f = |_y: &ArrayD<f64>, _t: f64| vector(&[0.0, 0.0]);

        let err = solver
            .integrate(&mut f, [0.0, 1.0], &vector(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, SolveError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_max_steps_exceeded() {
        let config = SolverConfig::with_tolerances(1e-10, 1e-10).max_steps(3);
        let solver = RungeKuttaSolver::dopri5(config).unwrap();
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let err = solver
            .integrate(&mut f, [0.0, 100.0], &vector(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, SolveError::MaxStepsExceeded { steps: 3, .. }));
    }

    #[test]
    fn test_step_size_underflow() {
        // min_step so coarse that the required accuracy is unreachable: the
        // first rejection happens with no room to shrink.
        let config = SolverConfig::with_tolerances(1e-14, 1e-14).step_bounds(0.5, 1.0);
        let solver = RungeKuttaSolver::dopri5(config).unwrap();
        let mut f = |y: &ArrayD<f64>, t: f64| {
            let mut dy = y.clone();
            dy.fill(10.0 * (10.0 * t).cos());
            dy
        };

        let err = solver
            .integrate(&mut f, [0.0, 1.0], &vector(&[0.0]))
            .unwrap_err();
        assert!(matches!(err, SolveError::StepSizeUnderflow { .. }));
    }

    #[test]
    fn test_accepted_steps_all_meet_tolerance() {
        // Replay every accepted step's embedded estimate: all ratios < 1.
        let config = SolverConfig::with_tolerances(1e-7, 1e-7);
        let solver = RungeKuttaSolver::dopri5(config.clone()).unwrap();
        let weights = solver.tableau().error_weights();

        let mut f = |y: &ArrayD<f64>, _t: f64| vector(&[y[[1]], -y[[0]]]);
        let mut ratios = Vec::new();

        solver
            .integrate_observed(&mut f, [0.0, 5.0], &vector(&[1.0, 0.0]), |step| {
                let h = step.t1 - step.t0;
                let zero = ArrayD::zeros(step.y0.raw_dim());
                let y_err = weighted_sum(&zero, step.k, &weights, h);
                ratios.push(error_ratio(
                    &y_err,
                    step.y0,
                    step.y1,
                    config.rel_tol,
                    config.abs_tol,
                ));
                Ok(())
            })
            .unwrap();

        assert!(!ratios.is_empty());
        assert!(ratios.iter().all(|r| *r < 1.0), "ratios = {:?}", ratios);
    }

    #[test]
    fn test_observer_error_aborts() {
        let solver = solver(1e-6, 1e-6);
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let err = solver
            .integrate_observed(&mut f, [0.0, 1.0], &vector(&[1.0]), |step| {
                Err(SolveError::Diverged {
                    t: step.t0,
                    context: "observer".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SolveError::Diverged { .. }));
    }

    #[test]
    fn test_single_step_matches_taylor_expansion() {
        // One Dormand-Prince step on dy/dt = -y over h = 0.1 is accurate to
        // O(h^6) against the exact exponential.
        let solver = solver(1e-6, 1e-6);
        let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);

        let y1 = solver.single_step(&mut f, 0.0, 0.1, &vector(&[1.0])).unwrap();
        let exact = (-0.1f64).exp();
        assert!((y1[[0]] - exact).abs() < 1e-8);
    }
}
