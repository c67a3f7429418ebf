//! Butcher tableaus for embedded Runge-Kutta methods.

use crate::error::{SolveError, SolveResult};

/// Coefficient table describing one embedded Runge-Kutta pair.
///
/// The stage matrix `a` is strictly lower triangular: stage `k` depends only
/// on stages `0..k`, so row `k` (for the second stage onward) holds exactly
/// `k + 1` coefficients. `b` and `b_star` are the weight vectors of the two
/// embedded orders; their difference gives the error weights. `c` holds the
/// stage times of every stage after the first.
///
/// Invariant: `a.len() == c.len() == b.len() - 1` and
/// `b.len() == b_star.len()`.
#[derive(Debug, Clone)]
pub struct ButcherTableau {
    /// Stage coefficient rows, one per stage after the first.
    pub a: Vec<Vec<f64>>,

    /// Higher-order solution weights, one per stage.
    pub b: Vec<f64>,

    /// Embedded lower-order weights, one per stage.
    pub b_star: Vec<f64>,

    /// Stage times, one per stage after the first.
    pub c: Vec<f64>,

    /// Order used for step-size scaling (the higher of the pair).
    pub order: usize,
}

impl ButcherTableau {
    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.b.len()
    }

    /// Error weights `e_i = b_i - b*_i`.
    pub fn error_weights(&self) -> Vec<f64> {
        self.b
            .iter()
            .zip(&self.b_star)
            .map(|(b, bs)| b - bs)
            .collect()
    }

    /// Whether the last stage reuses the step result (First Same As Last):
    /// the final row of `a` equals the solution weights for all prior stages.
    pub fn is_fsal(&self) -> bool {
        match self.a.last() {
            Some(row) => row
                .iter()
                .zip(&self.b)
                .all(|(aij, bj)| (aij - bj).abs() < 1e-14),
            None => false,
        }
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> SolveResult<()> {
        let s = self.stages();
        if s < 2 {
            return Err(SolveError::InvalidConfig {
                parameter: "tableau.b".to_string(),
                message: format!("embedded pair needs at least 2 stages, got {}", s),
            });
        }
        if self.b_star.len() != s {
            return Err(SolveError::InvalidConfig {
                parameter: "tableau.b_star".to_string(),
                message: format!("expected {} weights, got {}", s, self.b_star.len()),
            });
        }
        if self.a.len() != s - 1 || self.c.len() != s - 1 {
            return Err(SolveError::InvalidConfig {
                parameter: "tableau.a".to_string(),
                message: format!(
                    "expected {} coefficient rows and stage times, got {} and {}",
                    s - 1,
                    self.a.len(),
                    self.c.len()
                ),
            });
        }
        for (k, row) in self.a.iter().enumerate() {
            if row.len() != k + 1 {
                return Err(SolveError::InvalidConfig {
                    parameter: "tableau.a".to_string(),
                    message: format!(
                        "row {} must have {} entries (strictly lower triangular), got {}",
                        k,
                        k + 1,
                        row.len()
                    ),
                });
            }
        }
        if self.order == 0 {
            return Err(SolveError::InvalidConfig {
                parameter: "tableau.order".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let all = self
            .a
            .iter()
            .flatten()
            .chain(&self.b)
            .chain(&self.b_star)
            .chain(&self.c);
        for v in all {
            if !v.is_finite() {
                return Err(SolveError::InvalidConfig {
                    parameter: "tableau".to_string(),
                    message: format!("non-finite coefficient {}", v),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heun_euler() -> ButcherTableau {
        // Heun-Euler 2(1): the smallest embedded pair.
        ButcherTableau {
            a: vec![vec![1.0]],
            b: vec![0.5, 0.5],
            b_star: vec![1.0, 0.0],
            c: vec![1.0],
            order: 2,
        }
    }

    #[test]
    fn test_valid_tableau() {
        let tab = heun_euler();
        assert!(tab.validate().is_ok());
        assert_eq!(tab.stages(), 2);
        assert_eq!(tab.error_weights(), vec![-0.5, 0.5]);
        assert!(!tab.is_fsal());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let mut tab = heun_euler();
        tab.a = vec![vec![1.0, 0.0]];
        assert!(tab.validate().is_err());
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let mut tab = heun_euler();
        tab.c = vec![];
        assert!(tab.validate().is_err());

        let mut tab = heun_euler();
        tab.b_star = vec![1.0];
        assert!(tab.validate().is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let mut tab = heun_euler();
        tab.b[0] = f64::NAN;
        assert!(tab.validate().is_err());
    }
}
