//! Error types for ODE integration.

use std::fmt;

/// Result type for solver operations.
pub type SolveResult<T> = Result<T, SolveError>;

/// Errors that can occur during ODE integration.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveError {
    /// Invalid solver configuration or tableau, detected at construction.
    InvalidConfig { parameter: String, message: String },

    /// A non-finite value was encountered in state, time, or derivative.
    ///
    /// Only raised by the opt-in [`NanGuard`](crate::function::NanGuard);
    /// the bare solver lets non-finite values propagate.
    Diverged { t: f64, context: String },

    /// A step was rejected while the step size was already at `min_step`.
    StepSizeUnderflow { step: f64, t: f64 },

    /// The accept/reject loop hit the configured step bound.
    MaxStepsExceeded { steps: usize, t: f64 },

    /// Caller-provided shapes disagree with what the function expects.
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        context: String,
    },

    /// A dense-output query fell outside the step it was fitted on.
    OutOfInterval { t: f64, t0: f64, t1: f64 },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { parameter, message } => {
                write!(f, "Invalid configuration '{}': {}", parameter, message)
            }
            Self::Diverged { t, context } => {
                write!(f, "{}: non-finite value at t = {:.6}", context, t)
            }
            Self::StepSizeUnderflow { step, t } => {
                write!(
                    f,
                    "step size {:.2e} underflowed min_step at t = {:.6}",
                    step, t
                )
            }
            Self::MaxStepsExceeded { steps, t } => {
                write!(f, "exceeded maximum {} steps at t = {:.6}", steps, t)
            }
            Self::ShapeMismatch {
                expected,
                actual,
                context,
            } => {
                write!(
                    f,
                    "{}: expected shape {:?}, got {:?}",
                    context, expected, actual
                )
            }
            Self::OutOfInterval { t, t0, t1 } => {
                write!(
                    f,
                    "interpolation time {:.6} outside step [{:.6}, {:.6}]",
                    t, t0, t1
                )
            }
        }
    }
}

impl std::error::Error for SolveError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolveError::InvalidConfig {
            parameter: "abs_tol".to_string(),
            message: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("abs_tol"));

        let err = SolveError::StepSizeUnderflow {
            step: 1e-15,
            t: 0.5,
        };
        assert!(err.to_string().contains("underflowed"));

        let err = SolveError::ShapeMismatch {
            expected: vec![2, 3],
            actual: vec![6],
            context: "integrate_adjoint".to_string(),
        };
        assert!(err.to_string().contains("[2, 3]"));

        let err = SolveError::OutOfInterval {
            t: 2.0,
            t0: 0.0,
            t1: 1.0,
        };
        assert!(err.to_string().contains("outside step"));
    }
}
