//! Solver tolerances and step bounds.

use crate::error::{SolveError, SolveResult};

/// Configuration for adaptive integration.
///
/// The four tolerance/step fields are the only externally configured values
/// of the solver core. `max_steps` bounds the accept/reject loop so that
/// runaway step-size shrinking surfaces as an error instead of spinning.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Absolute tolerance (default: 1e-6)
    pub abs_tol: f64,

    /// Relative tolerance (default: 1e-3)
    pub rel_tol: f64,

    /// Minimum step magnitude (default: 1e-14)
    pub min_step: f64,

    /// Maximum step magnitude (default: f64::INFINITY)
    pub max_step: f64,

    /// Maximum number of accepted + rejected steps (default: 10000)
    pub max_steps: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-6,
            rel_tol: 1e-3,
            min_step: 1e-14,
            max_step: f64::INFINITY,
            max_steps: 10000,
        }
    }
}

impl SolverConfig {
    /// Create a configuration with specified tolerances.
    pub fn with_tolerances(abs_tol: f64, rel_tol: f64) -> Self {
        Self {
            abs_tol,
            rel_tol,
            ..Default::default()
        }
    }

    /// Set the tolerances.
    pub fn tolerances(mut self, abs_tol: f64, rel_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self.rel_tol = rel_tol;
        self
    }

    /// Set step magnitude bounds.
    pub fn step_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_step = min;
        self.max_step = max;
        self
    }

    /// Set the maximum number of steps.
    pub fn max_steps(mut self, n: usize) -> Self {
        self.max_steps = n;
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> SolveResult<()> {
        if !(self.abs_tol > 0.0) {
            return Err(SolveError::InvalidConfig {
                parameter: "abs_tol".to_string(),
                message: format!("must be positive, got {}", self.abs_tol),
            });
        }
        if !(self.rel_tol > 0.0) {
            return Err(SolveError::InvalidConfig {
                parameter: "rel_tol".to_string(),
                message: format!("must be positive, got {}", self.rel_tol),
            });
        }
        if !(self.min_step > 0.0) {
            return Err(SolveError::InvalidConfig {
                parameter: "min_step".to_string(),
                message: format!("must be positive, got {}", self.min_step),
            });
        }
        if !(self.min_step < self.max_step) {
            return Err(SolveError::InvalidConfig {
                parameter: "min_step".to_string(),
                message: format!(
                    "min_step ({}) must be below max_step ({})",
                    self.min_step, self.max_step
                ),
            });
        }
        if self.max_steps == 0 {
            return Err(SolveError::InvalidConfig {
                parameter: "max_steps".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SolverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = SolverConfig::with_tolerances(1e-9, 1e-7)
            .step_bounds(1e-12, 0.5)
            .max_steps(500);
        assert_eq!(config.abs_tol, 1e-9);
        assert_eq!(config.rel_tol, 1e-7);
        assert_eq!(config.min_step, 1e-12);
        assert_eq!(config.max_step, 0.5);
        assert_eq!(config.max_steps, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_tolerances() {
        assert!(SolverConfig::with_tolerances(0.0, 1e-3).validate().is_err());
        assert!(SolverConfig::with_tolerances(1e-6, -1.0)
            .validate()
            .is_err());
        assert!(SolverConfig::with_tolerances(f64::NAN, 1e-3)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_inverted_step_bounds() {
        let config = SolverConfig::default().step_bounds(1.0, 0.1);
        assert!(config.validate().is_err());

        let config = SolverConfig::default().step_bounds(0.0, 1.0);
        assert!(config.validate().is_err());
    }
}
