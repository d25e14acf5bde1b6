use serde::{Deserialize, Serialize};

/// Which Hessian-like matrix receives the regularization shift during the
/// backward pass (spec §4.3 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegularizationType {
    /// Shift `Quu` directly: `Q̃uu = Quu + λ·I`.
    Quu = 1,
    /// Shift `Vxx` before forming `Quu`/`Qxu`: `Ṽxx = Vxx + λ·I`.
    Vxx = 2,
}

impl Default for RegularizationType {
    fn default() -> Self {
        RegularizationType::Quu
    }
}

/// Solver configuration, consumed at construction and immutable across a
/// solve (spec §6.1). Field names and defaults match the specification
/// table exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdpConfig {
    /// Emit human-readable per-iteration diagnostics at `INFO` level
    /// instead of `DEBUG` (see `solver` module for the `tracing`
    /// instrumentation this gates).
    pub verbose_print: bool,
    /// Include the `Fxx`, `Fuu`, `Fxu` contractions in the `Q`-terms.
    pub use_state_eq_second_derivative: bool,
    /// Upper bound on outer iterations.
    pub max_iter: usize,
    /// Horizon length `N`.
    pub horizon_steps: usize,
    /// Which matrix the regularization shift is applied to.
    pub reg_type: RegularizationType,
    /// Starting `λ`.
    pub initial_lambda: f64,
    /// Starting `δλ`.
    pub initial_dlambda: f64,
    /// Multiplicative step applied to `δλ` on each regularization change.
    pub lambda_factor: f64,
    /// Below this, `λ` is clamped to zero on decrease.
    pub lambda_min: f64,
    /// Above this, the solver fails with `RegularizationOverflow`.
    pub lambda_max: f64,
    /// Convergence threshold on the relative feedforward norm.
    pub k_rel_norm_thre: f64,
    /// `λ` must drop below this for convergence-by-`k`-norm to fire.
    pub lambda_thre: f64,
    /// Line-search schedule, searched in the given order.
    pub alpha_list: Vec<f64>,
    /// Minimum acceptance ratio `ρ` for a line-search step.
    pub cost_update_ratio_thre: f64,
    /// Convergence threshold on `|ΔJ_act|`.
    pub cost_update_thre: f64,
}

/// Eleven values geometric in `[1, 1e-3]`, matching spec §6.1's default
/// line-search schedule.
fn default_alpha_list() -> Vec<f64> {
    let n = 11usize;
    let log_hi = 0.0_f64; // log10(1.0)
    let log_lo = -3.0_f64; // log10(1e-3)
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            10f64.powf(log_hi + t * (log_lo - log_hi))
        })
        .collect()
}

impl Default for DdpConfig {
    fn default() -> Self {
        Self {
            verbose_print: true,
            use_state_eq_second_derivative: false,
            max_iter: 500,
            horizon_steps: 100,
            reg_type: RegularizationType::Quu,
            initial_lambda: 1e-6,
            initial_dlambda: 1.0,
            lambda_factor: 1.6,
            lambda_min: 1e-6,
            lambda_max: 1e10,
            k_rel_norm_thre: 1e-4,
            lambda_thre: 1e-5,
            alpha_list: default_alpha_list(),
            cost_update_ratio_thre: 0.0,
            cost_update_thre: 1e-7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alpha_list_is_geometric_and_bounded() {
        let cfg = DdpConfig::default();
        assert_eq!(cfg.alpha_list.len(), 11);
        assert!((cfg.alpha_list[0] - 1.0).abs() < 1e-12);
        assert!((cfg.alpha_list[10] - 1e-3).abs() < 1e-12);
        for w in cfg.alpha_list.windows(2) {
            assert!(w[0] > w[1], "alpha_list must be strictly decreasing");
        }
    }

    #[test]
    fn default_matches_spec_table() {
        let cfg = DdpConfig::default();
        assert!(cfg.verbose_print);
        assert!(!cfg.use_state_eq_second_derivative);
        assert_eq!(cfg.max_iter, 500);
        assert_eq!(cfg.horizon_steps, 100);
        assert_eq!(cfg.reg_type, RegularizationType::Quu);
        assert_eq!(cfg.initial_lambda, 1e-6);
        assert_eq!(cfg.initial_dlambda, 1.0);
        assert_eq!(cfg.lambda_factor, 1.6);
        assert_eq!(cfg.lambda_min, 1e-6);
        assert_eq!(cfg.lambda_max, 1e10);
        assert_eq!(cfg.k_rel_norm_thre, 1e-4);
        assert_eq!(cfg.lambda_thre, 1e-5);
        assert_eq!(cfg.cost_update_ratio_thre, 0.0);
        assert_eq!(cfg.cost_update_thre, 1e-7);
    }
}
