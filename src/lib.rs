//! Adaptive ODE integration with dense output and adjoint sensitivity.
//!
//! adjode solves initial value problems dy/dt = f(y, t) with embedded
//! Runge-Kutta methods and propagates loss gradients backward through the
//! solution, which is what continuous-time ("neural ODE") models need for
//! training.
//!
//! # Architecture
//!
//! - [`RungeKuttaSolver`] drives stage evaluations, embedded error
//!   estimation, and the accept/reject loop for any [`ButcherTableau`];
//!   [`dopri5`] provides the default Dormand-Prince 5(4) pair.
//! - [`StepSizeController`] turns error ratios into step sizes and
//!   estimates the initial step.
//! - [`Interpolant`] gives dense output: a quartic fitted per accepted step
//!   from cached stage derivatives, evaluated at arbitrary interior times
//!   without extra derivative evaluations.
//! - [`MultiPointSampler`] answers a list of requested output times with a
//!   [`SamplingStrategy`] chosen at construction.
//! - [`AugmentedState`] and [`AdjointEquation`] implement the adjoint
//!   method: the same solver core integrates an augmented ODE backward,
//!   yielding gradients with respect to the initial state, the function's
//!   parameters, and the integration bounds.
//!
//! The derivative function is an opaque black box behind [`OdeFunction`]
//! (and [`AdjointFunction`] for training); state tensors are `ndarray`
//! arrays of any shape.
//!
//! # Example
//!
//! ```
//! use adjode::{RungeKuttaSolver, SolverConfig};
//! use ndarray::{ArrayD, IxDyn};
//!
//! // dy/dt = -y, y(0) = 1; exact solution exp(-t).
//! let solver = RungeKuttaSolver::dopri5(
//!     SolverConfig::with_tolerances(1e-6, 1e-6),
//! )?;
//! let y0 = ArrayD::from_shape_vec(IxDyn(&[1]), vec![1.0]).unwrap();
//! let mut f = |y: &ArrayD<f64>, _t: f64| y.mapv(|v| -v);
//!
//! let solution = solver.integrate(&mut f, [0.0, 1.0], &y0)?;
//! assert!((solution.y[[0]] - (-1.0f64).exp()).abs() < 1e-4);
//! # Ok::<(), adjode::SolveError>(())
//! ```

pub mod adjoint;
pub mod config;
pub mod controller;
pub mod dense;
pub mod dopri5;
pub mod error;
pub mod function;
pub mod sampler;
pub mod solver;
pub mod tableau;

pub use adjoint::{AdjointEquation, AdjointGradients, AugmentedState};
pub use config::SolverConfig;
pub use controller::StepSizeController;
pub use dense::Interpolant;
pub use error::{SolveError, SolveResult};
pub use function::{AdjointFunction, NanGuard, OdeFunction};
pub use sampler::{MultiPointSampler, SamplingStrategy};
pub use solver::{OdeSolution, RungeKuttaSolver, StepRecord};
pub use tableau::ButcherTableau;
