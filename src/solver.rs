use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};
use tracing::{info_span, Level};

use crate::backward::backward_pass;
use crate::config::DdpConfig;
use crate::derivatives::DerivativesCache;
use crate::error::{DdpError, DdpResult};
use crate::forward::forward_pass;
use crate::problem::Problem;
use crate::regularization::Regularization;
use crate::trace::{IterationRecord, Trace};
use crate::trajectory::{PolicyCorrection, StageCosts, Trajectory};

/// Which convergence test fired on a successful solve (spec §7:
/// "Successful termination causes are logged").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessReason {
    /// `k_rel_norm < k_rel_norm_thre` and `λ < lambda_thre`.
    KRelNorm,
    /// `|ΔJ_act| < cost_update_thre`.
    CostUpdateThreshold,
    /// The outer iteration budget was exhausted; the best trajectory found
    /// is returned.
    MaxIterReached,
}

/// Terminal outcome of a solve.
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Success(SuccessReason),
    Failure(DdpError),
}

impl SolveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveOutcome::Success(_))
    }
}

/// Full solver output (spec §6.3): final trajectory, feedback policy,
/// per-stage cost, and the complete trace log.
pub struct SolveReport {
    pub outcome: SolveOutcome,
    pub trajectory: Trajectory,
    pub policy: PolicyCorrection,
    pub stage_costs: StageCosts,
    pub trace: Trace,
}

impl SolveReport {
    /// The boolean success flag spec §6.3 asks for, derived from `outcome`.
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Ratio `ρ` used by the Armijo-style acceptance test (spec §4.5 step 3),
/// and whether this `α` is accepted.
///
/// When `ΔJ_exp ≤ 0` the model offers no denominator to divide by; `ρ` is
/// recorded as `sign(ΔJ_act)` and the step accepted whenever it is not a
/// net regression (`ΔJ_act ≥ 0`), so an already-optimal trajectory
/// (`ΔJ_act == 0`, `ΔJ_exp == 0`) still accepts and reaches the
/// `cost_update_thre` convergence test on the first iteration.
fn acceptance_ratio(actual: f64, expected: f64, ratio_thre: f64) -> (f64, bool) {
    if expected > 0.0 {
        let ratio = actual / expected;
        (ratio, ratio > ratio_thre)
    } else {
        let ratio = if actual > 0.0 {
            1.0
        } else if actual < 0.0 {
            -1.0
        } else {
            0.0
        };
        (ratio, ratio >= ratio_thre)
    }
}

/// The DDP iteration driver (spec §4.5): orchestrates derivatives →
/// backward pass → line search over `α` → accept/reject → regularize →
/// terminate.
///
/// Buffers are sized once per `solve` call by the horizon and problem
/// dimensions (spec §3 "Lifecycles", §5 "Shared resources"); the solver
/// instance itself holds only configuration and may be reused across
/// independent solves.
pub struct DdpSolver {
    cfg: DdpConfig,
}

impl DdpSolver {
    pub fn new(cfg: DdpConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DdpConfig {
        &self.cfg
    }

    /// Solve the finite-horizon problem from `current_x`, seeded with
    /// `initial_u`.
    pub fn solve<P: Problem>(
        &mut self,
        problem: &P,
        current_x: &DVector<f64>,
        initial_u: &[DVector<f64>],
    ) -> DdpResult<SolveReport> {
        let n = problem.state_dim();
        let m = problem.input_dim();
        let n_steps = self.cfg.horizon_steps;

        if n == 0 || m == 0 || n_steps == 0 {
            return Err(DdpError::DegenerateProblem {
                reason: format!(
                    "state_dim={n}, input_dim={m}, horizon_steps={n_steps} must all be nonzero"
                ),
            });
        }
        if initial_u.len() != n_steps {
            return Err(DdpError::DegenerateProblem {
                reason: format!(
                    "initial_u has length {} but horizon_steps is {n_steps}",
                    initial_u.len()
                ),
            });
        }
        if current_x.len() != n {
            return Err(DdpError::DegenerateProblem {
                reason: format!("current_x has length {} but state_dim is {n}", current_x.len()),
            });
        }

        let span = info_span!("ddp_solve", horizon = n_steps, state_dim = n, input_dim = m);
        let _enter = span.enter();

        // Initial rollout at the seed inputs establishes x[·] and J (spec
        // §4.5 "Initialization").
        let mut trajectory = Trajectory::zeros(n_steps, n, m);
        trajectory.u = initial_u.to_vec();
        trajectory.x[0] = current_x.clone();
        for t in 0..n_steps {
            trajectory.x[t + 1] = problem.state_eq(&trajectory.x[t], &trajectory.u[t]);
        }
        let mut stage_costs = StageCosts::zeros(n_steps);
        for t in 0..n_steps {
            stage_costs.0[t] = problem.running_cost(&trajectory.x[t], &trajectory.u[t]);
        }
        stage_costs.0[n_steps] = problem.terminal_cost(&trajectory.x[n_steps]);
        let mut cost = stage_costs.total();

        let mut derivatives =
            DerivativesCache::new(n_steps, n, m, self.cfg.use_state_eq_second_derivative);
        let mut reg = Regularization::new(&self.cfg);
        let mut trace = Trace::default();
        let mut policy = PolicyCorrection::zeros(n_steps, n, m);

        let outcome = loop {
            if trace.len() >= self.cfg.max_iter {
                break SolveOutcome::Success(SuccessReason::MaxIterReached);
            }
            let iter = trace.len();
            let cost_before_iter = cost;

            let t_deriv = Instant::now();
            derivatives.refresh(
                problem,
                &trajectory.x,
                &trajectory.u,
                self.cfg.use_state_eq_second_derivative,
            );
            let derivatives_time = t_deriv.elapsed();

            let mut terminal_vx = DVector::zeros(n);
            let mut terminal_vxx = DMatrix::zeros(n, n);
            problem.terminal_cost_derivative(&trajectory.x[n_steps], &mut terminal_vx, &mut terminal_vxx);

            let t_back = Instant::now();
            let backward_result =
                backward_pass(&derivatives, &terminal_vx, &terminal_vxx, reg.lambda, &self.cfg);
            let backward_time = t_back.elapsed();

            let (candidate_policy, descent) = match backward_result {
                Ok(result) => result,
                Err(stage) => {
                    tracing::warn!(iter, stage, "backward pass factorization failed, raising lambda");
                    let new_lambda = reg.increase(&self.cfg);
                    trace.push(rejected_record(
                        iter,
                        cost_before_iter,
                        reg.lambda,
                        reg.dlambda,
                        derivatives_time,
                        backward_time,
                    ));
                    if new_lambda > self.cfg.lambda_max {
                        break SolveOutcome::Failure(DdpError::RegularizationOverflow {
                            lambda: new_lambda,
                            lambda_max: self.cfg.lambda_max,
                        });
                    }
                    continue;
                }
            };

            let t_fwd = Instant::now();
            let mut accepted = None;
            for &alpha in &self.cfg.alpha_list {
                let candidate = forward_pass(problem, current_x, &trajectory, &candidate_policy, alpha);
                let candidate_cost = candidate.total_cost();
                let expected = descent.predicted_decrease(alpha);
                let actual = cost - candidate_cost;
                let (ratio, accept) = acceptance_ratio(actual, expected, self.cfg.cost_update_ratio_thre);
                if accept {
                    accepted = Some((alpha, ratio, actual, candidate));
                    break;
                }
            }
            let forward_time = t_fwd.elapsed();

            match accepted {
                Some((alpha, ratio, actual, candidate)) => {
                    cost = candidate.total_cost();
                    trajectory = candidate.trajectory;
                    stage_costs = candidate.stage_costs;
                    policy = candidate_policy;
                    reg.decrease(&self.cfg);

                    let k_rel_norm = policy.relative_norm(&trajectory.u);
                    let level = if self.cfg.verbose_print { Level::INFO } else { Level::DEBUG };
                    log_iteration(level, iter, cost_before_iter, cost, reg.lambda, alpha, k_rel_norm);

                    trace.push(IterationRecord {
                        iter,
                        cost_before: cost_before_iter,
                        cost_after: cost,
                        lambda: reg.lambda,
                        dlambda: reg.dlambda,
                        alpha,
                        accepted: true,
                        k_rel_norm,
                        cost_update_ratio: ratio,
                        derivatives_time,
                        backward_time,
                        forward_time,
                    });

                    if k_rel_norm < self.cfg.k_rel_norm_thre && reg.lambda < self.cfg.lambda_thre {
                        break SolveOutcome::Success(SuccessReason::KRelNorm);
                    }
                    if actual.abs() < self.cfg.cost_update_thre {
                        break SolveOutcome::Success(SuccessReason::CostUpdateThreshold);
                    }
                }
                None => {
                    tracing::warn!(iter, "no alpha in the line search accepted, raising lambda");
                    let new_lambda = reg.increase(&self.cfg);
                    trace.push(rejected_record(
                        iter,
                        cost_before_iter,
                        reg.lambda,
                        reg.dlambda,
                        derivatives_time,
                        backward_time + forward_time,
                    ));
                    if new_lambda > self.cfg.lambda_max {
                        break SolveOutcome::Failure(DdpError::RegularizationOverflow {
                            lambda: new_lambda,
                            lambda_max: self.cfg.lambda_max,
                        });
                    }
                }
            }
        };

        Ok(SolveReport {
            outcome,
            trajectory,
            policy,
            stage_costs,
            trace,
        })
    }
}

fn rejected_record(
    iter: usize,
    cost: f64,
    lambda: f64,
    dlambda: f64,
    derivatives_time: Duration,
    backward_time: Duration,
) -> IterationRecord {
    IterationRecord {
        iter,
        cost_before: cost,
        cost_after: cost,
        lambda,
        dlambda,
        alpha: 0.0,
        accepted: false,
        k_rel_norm: f64::NAN,
        cost_update_ratio: f64::NAN,
        derivatives_time,
        backward_time,
        forward_time: Duration::ZERO,
    }
}

fn log_iteration(level: Level, iter: usize, cost_before: f64, cost_after: f64, lambda: f64, alpha: f64, k_rel_norm: f64) {
    match level {
        Level::INFO => tracing::info!(
            iter, cost_before, cost_after, lambda, alpha, k_rel_norm, "ddp iteration"
        ),
        _ => tracing::debug!(
            iter, cost_before, cost_after, lambda, alpha, k_rel_norm, "ddp iteration"
        ),
    }
}
