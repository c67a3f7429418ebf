//! Reverse-mode sensitivity via backward integration of an augmented ODE.
//!
//! For dz/dt = f(z, t) with a downstream scalar loss L known at the forward
//! output z(t1), the adjoint method recovers dL/dz(t0), dL/dθ, and the
//! gradients with respect to the integration bounds with a single backward
//! integration. The augmented state packs four views into one flat buffer,
//!
//! ```text
//! [ z | a_z | a_θ | a_t ]
//! ```
//!
//! and its derivative is supplied by [`AdjointEquation`]: re-evaluate the
//! forward function at the current (z, t) to recover the trajectory, then
//! ask the black box for its reverse-mode gradient at upstream `-a_z`. The
//! forward integrator core is reused unchanged; it never inspects what the
//! four partitions mean.
//!
//! The function's `backward` must see the gradient of the very `z` it last
//! evaluated. [`AdjointEquation`] issues the two calls back to back through
//! one `&mut` borrow, so stages of unrelated integrations cannot
//! interleave.

use ndarray::{Array1, ArrayD, Dimension, IxDyn};

use crate::error::{SolveError, SolveResult};
use crate::function::{AdjointFunction, OdeFunction};
use crate::solver::RungeKuttaSolver;

/// Layout of the flat augmented buffer `[z | a_z | a_θ | a_t]`.
///
/// The four views are disjoint ranges of one buffer of length
/// `2 * len(z) + parameter_count + 1`; packing and unpacking round-trip the
/// original state shape.
#[derive(Debug, Clone)]
pub struct AugmentedState {
    shape: IxDyn,
    state_len: usize,
    param_len: usize,
}

impl AugmentedState {
    /// Layout for a state of the given shape and a parameter vector of the
    /// given length.
    pub fn new(shape: IxDyn, param_len: usize) -> Self {
        let state_len = shape.slice().iter().product();
        Self {
            shape,
            state_len,
            param_len,
        }
    }

    /// Length of the flat buffer.
    pub fn flat_len(&self) -> usize {
        2 * self.state_len + self.param_len + 1
    }

    /// Number of parameters in the `a_θ` view.
    pub fn param_len(&self) -> usize {
        self.param_len
    }

    /// Pack the four views into a fresh flat buffer.
    pub fn pack(
        &self,
        z: &ArrayD<f64>,
        a_z: &ArrayD<f64>,
        a_theta: &Array1<f64>,
        a_t: f64,
    ) -> SolveResult<ArrayD<f64>> {
        self.check_state_shape(z, "AugmentedState::pack: z")?;
        self.check_state_shape(a_z, "AugmentedState::pack: a_z")?;
        if a_theta.len() != self.param_len {
            return Err(SolveError::ShapeMismatch {
                expected: vec![self.param_len],
                actual: vec![a_theta.len()],
                context: "AugmentedState::pack: a_theta".to_string(),
            });
        }

        let mut buf = Vec::with_capacity(self.flat_len());
        buf.extend(z.iter());
        buf.extend(a_z.iter());
        buf.extend(a_theta.iter());
        buf.push(a_t);

        flat_array(buf)
    }

    /// The `z` view, restored to the original state shape.
    pub fn state(&self, buf: &ArrayD<f64>) -> SolveResult<ArrayD<f64>> {
        self.check_buffer(buf)?;
        self.view_as_state(buf, 0)
    }

    /// The state-adjoint view `a_z`, restored to the original state shape.
    pub fn state_adjoint(&self, buf: &ArrayD<f64>) -> SolveResult<ArrayD<f64>> {
        self.check_buffer(buf)?;
        self.view_as_state(buf, self.state_len)
    }

    /// The parameter-adjoint view `a_θ`.
    pub fn param_adjoint(&self, buf: &ArrayD<f64>) -> SolveResult<Array1<f64>> {
        self.check_buffer(buf)?;
        let values: Vec<f64> = buf
            .iter()
            .skip(2 * self.state_len)
            .take(self.param_len)
            .cloned()
            .collect();
        Ok(Array1::from_vec(values))
    }

    /// The time-adjoint view `a_t`.
    pub fn time_adjoint(&self, buf: &ArrayD<f64>) -> SolveResult<f64> {
        self.check_buffer(buf)?;
        Ok(buf[[self.flat_len() - 1]])
    }

    fn view_as_state(&self, buf: &ArrayD<f64>, offset: usize) -> SolveResult<ArrayD<f64>> {
        let values: Vec<f64> = buf.iter().skip(offset).take(self.state_len).cloned().collect();
        ArrayD::from_shape_vec(self.shape.clone(), values).map_err(|_| SolveError::ShapeMismatch {
            expected: self.shape.slice().to_vec(),
            actual: vec![self.state_len],
            context: "AugmentedState: view reshape".to_string(),
        })
    }

    fn check_state_shape(&self, value: &ArrayD<f64>, context: &str) -> SolveResult<()> {
        if value.raw_dim() != self.shape {
            return Err(SolveError::ShapeMismatch {
                expected: self.shape.slice().to_vec(),
                actual: value.shape().to_vec(),
                context: context.to_string(),
            });
        }
        Ok(())
    }

    fn check_buffer(&self, buf: &ArrayD<f64>) -> SolveResult<()> {
        if buf.ndim() != 1 || buf.len() != self.flat_len() {
            return Err(SolveError::ShapeMismatch {
                expected: vec![self.flat_len()],
                actual: buf.shape().to_vec(),
                context: "AugmentedState: flat buffer".to_string(),
            });
        }
        Ok(())
    }
}

fn flat_array(values: Vec<f64>) -> SolveResult<ArrayD<f64>> {
    let len = values.len();
    ArrayD::from_shape_vec(IxDyn(&[len]), values).map_err(|_| SolveError::ShapeMismatch {
        expected: vec![len],
        actual: vec![],
        context: "AugmentedState: flat buffer".to_string(),
    })
}

/// The derivative of the augmented ODE.
///
/// At each integrator stage: refresh `z` through the forward function (the
/// integrator is recovering the forward trajectory while running backward),
/// obtain the reverse-mode gradients at upstream `-a_z`, and pack the
/// derivative `(dz/dt, dL/dz_prev, dL/dθ, 0)`. The time-adjoint carries no
/// dynamics beyond its boundary terms.
#[derive(Debug)]
pub struct AdjointEquation<'f, F> {
    func: &'f mut F,
    layout: AugmentedState,
}

impl<'f, F: AdjointFunction> AdjointEquation<'f, F> {
    pub fn new(func: &'f mut F, layout: AugmentedState) -> Self {
        Self { func, layout }
    }
}

impl<F: AdjointFunction> OdeFunction for AdjointEquation<'_, F> {
    fn evaluate(&mut self, y: &ArrayD<f64>, t: f64) -> SolveResult<ArrayD<f64>> {
        let z = self.layout.state(y)?;
        let a_z = self.layout.state_adjoint(y)?;

        let dz = self.func.evaluate(&z, t)?;
        if dz.shape() != z.shape() {
            return Err(SolveError::ShapeMismatch {
                expected: z.shape().to_vec(),
                actual: dz.shape().to_vec(),
                context: "AdjointEquation: forward derivative".to_string(),
            });
        }

        let upstream = a_z.mapv(|v| -v);
        let (dl_dz, dl_dtheta) = self.func.backward(&upstream)?;
        if dl_dz.shape() != z.shape() {
            return Err(SolveError::ShapeMismatch {
                expected: z.shape().to_vec(),
                actual: dl_dz.shape().to_vec(),
                context: "AdjointEquation: input gradient".to_string(),
            });
        }
        if dl_dtheta.len() != self.layout.param_len() {
            return Err(SolveError::ShapeMismatch {
                expected: vec![self.layout.param_len()],
                actual: vec![dl_dtheta.len()],
                context: "AdjointEquation: parameter gradient".to_string(),
            });
        }

        self.layout.pack(&dz, &dl_dz, &dl_dtheta, 0.0)
    }
}

/// Gradients produced by one adjoint integration.
#[derive(Debug, Clone)]
pub struct AdjointGradients {
    /// Gradient of the loss with respect to the forward input z(t0).
    pub dl_dz0: ArrayD<f64>,

    /// Accumulated gradient with respect to the function's parameters.
    pub dl_dtheta: Array1<f64>,

    /// Gradient with respect to the lower integration bound.
    pub dl_dt0: f64,

    /// Gradient with respect to the upper integration bound.
    pub dl_dt1: f64,
}

impl RungeKuttaSolver {
    /// Propagate a loss gradient backward through a forward integration.
    ///
    /// `t_span = [t0, t1]` is the span of the *forward* pass, `z1` its
    /// output, and `grad_z1` the upstream gradient dL/dz(t1). The augmented
    /// ODE is integrated from `t1` back to `t0` with the unchanged forward
    /// machinery.
    pub fn integrate_adjoint<F>(
        &self,
        f: &mut F,
        t_span: [f64; 2],
        z1: &ArrayD<f64>,
        grad_z1: &ArrayD<f64>,
    ) -> SolveResult<AdjointGradients>
    where
        F: AdjointFunction,
    {
        if grad_z1.shape() != z1.shape() {
            return Err(SolveError::ShapeMismatch {
                expected: z1.shape().to_vec(),
                actual: grad_z1.shape().to_vec(),
                context: "integrate_adjoint: upstream gradient".to_string(),
            });
        }

        let [t0, t1] = t_span;
        let layout = AugmentedState::new(z1.raw_dim(), f.parameter_count());

        // Boundary term: dL/dt1 = dL/dz1 · dz/dt(t1).
        let dz1 = f.evaluate(z1, t1)?;
        if dz1.shape() != z1.shape() {
            return Err(SolveError::ShapeMismatch {
                expected: z1.shape().to_vec(),
                actual: dz1.shape().to_vec(),
                context: "integrate_adjoint: forward derivative".to_string(),
            });
        }
        let dl_dt1: f64 = grad_z1.iter().zip(dz1.iter()).map(|(g, d)| g * d).sum();

        let aug1 = layout.pack(
            z1,
            grad_z1,
            &Array1::zeros(layout.param_len()),
            -dl_dt1,
        )?;

        let mut equation = AdjointEquation::new(f, layout.clone());
        let solution = self.integrate(&mut equation, [t1, t0], &aug1)?;

        Ok(AdjointGradients {
            dl_dz0: layout.state_adjoint(&solution.y)?,
            dl_dtheta: layout.param_adjoint(&solution.y)?,
            dl_dt0: layout.time_adjoint(&solution.y)?,
            dl_dt1,
        })
    }
}
