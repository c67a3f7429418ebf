//! Derivative function contracts.
//!
//! The solver core's only external boundary. An [`OdeFunction`] supplies the
//! right-hand side dy/dt = f(y, t); an [`AdjointFunction`] additionally
//! exposes the reverse-mode operation needed for adjoint sensitivity.
//!
//! Both traits take `&mut self` because the intended implementors are
//! stateful black boxes (e.g. a neural-network layer stack) whose `backward`
//! is only valid immediately after the matching `evaluate`. The exclusive
//! borrow makes it impossible to interleave stages of unrelated
//! integrations through the same function instance.

use ndarray::{Array1, ArrayD};

use crate::error::{SolveError, SolveResult};

/// Right-hand side of an ODE: `evaluate(y, t) -> dy/dt`.
///
/// Must be shape-preserving in `y`.
pub trait OdeFunction {
    fn evaluate(&mut self, y: &ArrayD<f64>, t: f64) -> SolveResult<ArrayD<f64>>;
}

/// Plain closures are accepted as derivative functions.
impl<F> OdeFunction for F
where
    F: FnMut(&ArrayD<f64>, f64) -> ArrayD<f64>,
{
    fn evaluate(&mut self, y: &ArrayD<f64>, t: f64) -> SolveResult<ArrayD<f64>> {
        Ok(self(y, t))
    }
}

/// A parameterized derivative function supporting reverse-mode gradients.
///
/// `backward` consumes the upstream gradient with respect to the output of
/// the most recent `evaluate` call and returns the gradient with respect to
/// that call's input together with the gradient with respect to the
/// function's internal parameters (a flat vector of length
/// [`parameter_count`](AdjointFunction::parameter_count)). It is valid only
/// immediately after the matching `evaluate`; the solver's adjoint equation
/// always issues the two calls back to back.
pub trait AdjointFunction: OdeFunction {
    fn backward(&mut self, upstream: &ArrayD<f64>) -> SolveResult<(ArrayD<f64>, Array1<f64>)>;

    /// Number of internal parameters, used to size the parameter-adjoint view.
    fn parameter_count(&self) -> usize;
}

/// Opt-in divergence guard.
///
/// Wraps a derivative function and fails with [`SolveError::Diverged`] as
/// soon as the time, state, or derivative contains a non-finite value. The
/// bare solver is permissive and lets non-finite values propagate.
///
/// # Example
///
/// ```
/// use adjode::{NanGuard, RungeKuttaSolver, SolverConfig};
/// use ndarray::ArrayD;
///
/// let solver = RungeKuttaSolver::dopri5(SolverConfig::default()).unwrap();
/// let mut f = NanGuard::new(|y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v));
/// let y0 = ArrayD::from_shape_vec(ndarray::IxDyn(&[1]), vec![1.0]).unwrap();
/// let solution = solver.integrate(&mut f, [0.0, 1.0], &y0).unwrap();
/// ```
#[derive(Debug)]
pub struct NanGuard<F> {
    inner: F,
}

impl<F> NanGuard<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    /// Unwrap the guarded function.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

fn all_finite(values: &ArrayD<f64>) -> bool {
    values.iter().all(|v| v.is_finite())
}

impl<F: OdeFunction> OdeFunction for NanGuard<F> {
    fn evaluate(&mut self, y: &ArrayD<f64>, t: f64) -> SolveResult<ArrayD<f64>> {
        if !t.is_finite() {
            return Err(SolveError::Diverged {
                t,
                context: "NanGuard: time".to_string(),
            });
        }
        if !all_finite(y) {
            return Err(SolveError::Diverged {
                t,
                context: "NanGuard: state".to_string(),
            });
        }
        let dy = self.inner.evaluate(y, t)?;
        if !all_finite(&dy) {
            return Err(SolveError::Diverged {
                t,
                context: "NanGuard: derivative".to_string(),
            });
        }
        Ok(dy)
    }
}

impl<F: AdjointFunction> AdjointFunction for NanGuard<F> {
    fn backward(&mut self, upstream: &ArrayD<f64>) -> SolveResult<(ArrayD<f64>, Array1<f64>)> {
        self.inner.backward(upstream)
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }
}
