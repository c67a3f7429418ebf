//! Multi-point solving strategies over a list of requested output times.

use ndarray::ArrayD;

use crate::config::SolverConfig;
use crate::dense::Interpolant;
use crate::dopri5;
use crate::error::{SolveError, SolveResult};
use crate::function::OdeFunction;
use crate::solver::RungeKuttaSolver;

/// How to produce states at more than two requested times.
///
/// Chosen once at construction and dispatched with a plain match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingStrategy {
    /// Integrate once over the whole span and interpolate interior times
    /// from the dense output of each accepted step. Cheapest in derivative
    /// evaluations; adds interpolation error on the order of the step error.
    #[default]
    Interpolated,

    /// Integrate adaptively between each consecutive pair of requested
    /// times. Costs more evaluations but involves no interpolation.
    Pairwise,

    /// Take exactly one fixed tableau step per consecutive pair: the
    /// requested times are the step grid, with no error control. Accuracy
    /// is entirely in the caller's choice of grid.
    InputDriven,
}

/// Samples an ODE solution at an ordered list of requested times.
#[derive(Debug, Clone)]
pub struct MultiPointSampler {
    solver: RungeKuttaSolver,
    mid_weights: Vec<f64>,
    strategy: SamplingStrategy,
}

impl MultiPointSampler {
    /// Build a sampler around an existing solver.
    ///
    /// `mid_weights` is the tableau's dense-output midpoint combination;
    /// it must have one weight per stage.
    pub fn new(
        solver: RungeKuttaSolver,
        mid_weights: Vec<f64>,
        strategy: SamplingStrategy,
    ) -> SolveResult<Self> {
        let stages = solver.tableau().stages();
        if mid_weights.len() != stages {
            return Err(SolveError::InvalidConfig {
                parameter: "mid_weights".to_string(),
                message: format!("expected {} weights, got {}", stages, mid_weights.len()),
            });
        }
        Ok(Self {
            solver,
            mid_weights,
            strategy,
        })
    }

    /// Build a Dormand-Prince 5(4) sampler.
    pub fn dopri5(config: SolverConfig, strategy: SamplingStrategy) -> SolveResult<Self> {
        Self::new(
            RungeKuttaSolver::dopri5(config)?,
            dopri5::MID.to_vec(),
            strategy,
        )
    }

    /// The underlying solver.
    pub fn solver(&self) -> &RungeKuttaSolver {
        &self.solver
    }

    /// Solve for y at every requested time.
    ///
    /// `times` must hold at least two entries and be strictly monotonic
    /// (either direction); `times[0]` is the initial time of `y0`. The
    /// returned vector has one state per requested time, the first being a
    /// copy of `y0`.
    pub fn sample<F>(
        &self,
        f: &mut F,
        times: &[f64],
        y0: &ArrayD<f64>,
    ) -> SolveResult<Vec<ArrayD<f64>>>
    where
        F: OdeFunction,
    {
        let n = times.len();
        if n < 2 {
            return Err(SolveError::InvalidConfig {
                parameter: "times".to_string(),
                message: format!("need at least 2 requested times, got {}", n),
            });
        }

        // A two-point request is a single integration for every strategy.
        if n == 2 {
            let solution = self.solver.integrate(f, [times[0], times[1]], y0)?;
            return Ok(vec![y0.clone(), solution.y]);
        }

        let dir = (times[n - 1] - times[0]).signum();
        let monotonic =
            dir != 0.0 && times.windows(2).all(|w| (w[1] - w[0]) * dir > 0.0);
        if !monotonic {
            return Err(SolveError::InvalidConfig {
                parameter: "times".to_string(),
                message: "requested times must be strictly monotonic".to_string(),
            });
        }

        match self.strategy {
            SamplingStrategy::Interpolated => self.sample_interpolated(f, times, y0, dir),
            SamplingStrategy::Pairwise => {
                let mut out = Vec::with_capacity(n);
                out.push(y0.clone());
                for w in times.windows(2) {
                    let prev = &out[out.len() - 1];
                    let solution = self.solver.integrate(f, [w[0], w[1]], prev)?;
                    out.push(solution.y);
                }
                Ok(out)
            }
            SamplingStrategy::InputDriven => {
                let mut out = Vec::with_capacity(n);
                out.push(y0.clone());
                for w in times.windows(2) {
                    let prev = &out[out.len() - 1];
                    out.push(self.solver.single_step(f, w[0], w[1], prev)?);
                }
                Ok(out)
            }
        }
    }

    /// One integration over the whole span; interior times are filled from
    /// the dense output of whichever accepted step contains them. The span
    /// endpoints are copied directly, never interpolated.
    fn sample_interpolated<F>(
        &self,
        f: &mut F,
        times: &[f64],
        y0: &ArrayD<f64>,
        dir: f64,
    ) -> SolveResult<Vec<ArrayD<f64>>>
    where
        F: OdeFunction,
    {
        let n = times.len();
        let mut out: Vec<Option<ArrayD<f64>>> = vec![None; n];
        out[0] = Some(y0.clone());

        let mut next = 1usize;
        let solution = self.solver.integrate_observed(
            f,
            [times[0], times[n - 1]],
            y0,
            |step| {
                // Requested times inside (step start, step end]; a time on
                // the step end evaluates to y1 exactly.
                let first = next;
                while next < n - 1
                    && (times[next] - step.t0) * dir > 0.0
                    && (times[next] - step.t1) * dir <= 0.0
                {
                    next += 1;
                }
                if next > first {
                    let fit = Interpolant::fit(step, &self.mid_weights)?;
                    for (i, slot) in out[first..next].iter_mut().enumerate() {
                        *slot = Some(fit.eval(times[first + i])?);
                    }
                }
                Ok(())
            },
        )?;
        out[n - 1] = Some(solution.y);

        out.into_iter()
            .map(|slot| {
                slot.ok_or_else(|| SolveError::InvalidConfig {
                    parameter: "times".to_string(),
                    message: "requested time not covered by any accepted step".to_string(),
                })
            })
            .collect()
    }
}
