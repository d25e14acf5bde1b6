use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

use crate::config::{DdpConfig, RegularizationType};
use crate::derivatives::{contract_vec_tensor, DerivativesCache};
use crate::trajectory::PolicyCorrection;

/// Expected descent accumulated by the backward pass: first- and
/// second-order components of the predicted cost decrease (spec §3
/// "Expected descent vector dV").
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedDescent {
    pub first_order: f64,
    pub second_order: f64,
}

impl ExpectedDescent {
    /// Predicted cost decrease at step size `α`: `-(α·dV[0] + α²·dV[1])`.
    pub fn predicted_decrease(&self, alpha: f64) -> f64 {
        -(alpha * self.first_order + alpha * alpha * self.second_order)
    }
}

/// Roll the value-function quadratic model back through the horizon,
/// producing feedforward/feedback corrections and the expected descent
/// (spec §4.3).
///
/// `terminal_vx`/`terminal_vxx` are the terminal cost derivatives at
/// `x[N]`. On success returns the policy correction and `dV`. On failure
/// returns the stage index at which `Q̃uu` was not positive definite, so
/// the driver can raise `λ` and retry the whole pass without running a
/// forward pass (spec §4.5 step 2).
pub fn backward_pass(
    derivatives: &DerivativesCache,
    terminal_vx: &DVector<f64>,
    terminal_vxx: &DMatrix<f64>,
    lambda: f64,
    cfg: &DdpConfig,
) -> Result<(PolicyCorrection, ExpectedDescent), usize> {
    let n_steps = derivatives.len();
    let state_dim = terminal_vx.len();
    let input_dim = if n_steps > 0 { derivatives.stage(0).fu.ncols() } else { 0 };

    let mut policy = PolicyCorrection::zeros(n_steps, state_dim, input_dim);
    let mut descent = ExpectedDescent::default();

    let mut vx = terminal_vx.clone();
    let mut vxx = terminal_vxx.clone();

    for t in (0..n_steps).rev() {
        let d = derivatives.stage(t);

        let qx = &d.lx + d.fx.transpose() * &vx;
        let qu = &d.lu + d.fu.transpose() * &vx;
        let mut qxx = &d.lxx + d.fx.transpose() * &vxx * &d.fx;
        let mut quu = &d.luu + d.fu.transpose() * &vxx * &d.fu;
        let mut qxu = &d.lxu + d.fx.transpose() * &vxx * &d.fu;

        if cfg.use_state_eq_second_derivative {
            if let (Some(fxx), Some(fuu), Some(fxu)) = (&d.fxx, &d.fuu, &d.fxu) {
                qxx += contract_vec_tensor(&vx, fxx);
                quu += contract_vec_tensor(&vx, fuu);
                qxu += contract_vec_tensor(&vx, fxu);
            }
        }

        // reg_type Vxx recomputes Q̃uu/Q̃xu from a shifted Vxx instead of
        // shifting Quu directly; Qx/Qxx are unaffected either way since
        // they depend on the unshifted Vx/Vxx.
        let (q_tilde_uu, q_tilde_xu) = match cfg.reg_type {
            RegularizationType::Quu => {
                let shifted = &quu + DMatrix::identity(input_dim, input_dim) * lambda;
                (shifted, qxu.clone())
            }
            RegularizationType::Vxx => {
                let vxx_tilde = &vxx + DMatrix::identity(state_dim, state_dim) * lambda;
                let mut shifted_quu = &d.luu + d.fu.transpose() * &vxx_tilde * &d.fu;
                let mut shifted_qxu = &d.lxu + d.fx.transpose() * &vxx_tilde * &d.fu;
                if cfg.use_state_eq_second_derivative {
                    if let (Some(fuu), Some(fxu)) = (&d.fuu, &d.fxu) {
                        shifted_quu += contract_vec_tensor(&vx, fuu);
                        shifted_qxu += contract_vec_tensor(&vx, fxu);
                    }
                }
                (shifted_quu, shifted_qxu)
            }
        };

        let cholesky = match Cholesky::new(q_tilde_uu) {
            Some(c) => c,
            None => return Err(t),
        };

        // Solve Q̃uu · [k | K] = -[Qu | Q̃xuᵀ] in one factorization (spec
        // §5: one Cholesky per stage).
        let mut rhs = DMatrix::<f64>::zeros(input_dim, 1 + state_dim);
        rhs.column_mut(0).copy_from(&(-qu.clone()));
        rhs.columns_mut(1, state_dim).copy_from(&(-q_tilde_xu.clone().transpose()));
        let solved = cholesky.solve(&rhs);

        let k = solved.column(0).into_owned();
        let big_k = solved.columns(1, state_dim).into_owned();

        // Most-grouped form per the spec's open-question resolution, to
        // limit round-off relative to the algebraically equivalent
        // expansions of the same update.
        let vx_next = &qx + big_k.transpose() * &qu + &qxu * &k + big_k.transpose() * &quu * &k;
        let vxx_raw =
            &qxx + big_k.transpose() * &quu * &big_k + big_k.transpose() * qxu.transpose() + &qxu * &big_k;
        let vxx_next = 0.5 * (&vxx_raw + vxx_raw.transpose());

        descent.first_order += k.dot(&qu);
        descent.second_order += 0.5 * k.dot(&(&quu * &k));

        policy.k[t] = k;
        policy.big_k[t] = big_k;

        vx = vx_next;
        vxx = vxx_next;
    }

    Ok((policy, descent))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scalar LQR stage: f(x,u) = a*x + b*u, ℓ = q*x^2 + r*u^2. One stage,
    /// terminal value model from a quadratic terminal cost. The backward
    /// pass should reproduce the scalar discrete-time Riccati gain.
    #[test]
    fn scalar_stage_matches_hand_derivation() {
        let (a, b, q, r) = (0.9, 1.0, 1.0, 1.0);
        let mut cache = DerivativesCache::new(1, 1, 1, false);
        {
            let stage = cache.stage_mut(0);
            stage.fx = DMatrix::from_element(1, 1, a);
            stage.fu = DMatrix::from_element(1, 1, b);
            stage.lx = DVector::from_element(1, 0.0);
            stage.lu = DVector::from_element(1, 0.0);
            stage.lxx = DMatrix::from_element(1, 1, q);
            stage.luu = DMatrix::from_element(1, 1, r);
            stage.lxu = DMatrix::from_element(1, 1, 0.0);
        }

        let vx_term = DVector::from_element(1, 0.0);
        let vxx_term = DMatrix::from_element(1, 1, 10.0);
        let cfg = DdpConfig::default();

        let (policy, descent) = backward_pass(&cache, &vx_term, &vxx_term, 0.0, &cfg).unwrap();

        // Quu = r + b^2 * Vxx = 1 + 1*10 = 11; Qxu = b*Vxx*a = 1*10*0.9 = 9
        // K = -Qxu/Quu = -9/11
        let expected_k_gain = -(b * vxx_term[(0, 0)] * a) / (r + b * b * vxx_term[(0, 0)]);
        assert!((policy.big_k[0][(0, 0)] - expected_k_gain).abs() < 1e-9);
        assert!((policy.k[0][0]).abs() < 1e-12, "zero running cost gradient => zero feedforward");
        assert!(descent.first_order.abs() < 1e-12);
        assert!(descent.second_order >= 0.0);
    }

    /// With second-order dynamics enabled and a nonzero `Vx`, the tensor
    /// contraction terms added to `Quu`/`Qxu` must not depend on which
    /// matrix the regularization shifts (spec §4.6: "the two
    /// regularization types only alter the matrix that is shifted; the
    /// controller is identical"). At `λ = 0` the shift is a no-op in both
    /// branches, so `reg_type = Quu` and `reg_type = Vxx` must produce the
    /// same gains.
    #[test]
    fn second_order_contraction_matches_across_reg_types() {
        let (a, b, q, r) = (0.9, 1.0, 1.0, 1.0);
        let mut cache = DerivativesCache::new(1, 1, 1, true);
        {
            let stage = cache.stage_mut(0);
            stage.fx = DMatrix::from_element(1, 1, a);
            stage.fu = DMatrix::from_element(1, 1, b);
            stage.lx = DVector::from_element(1, 0.0);
            stage.lu = DVector::from_element(1, 0.0);
            stage.lxx = DMatrix::from_element(1, 1, q);
            stage.luu = DMatrix::from_element(1, 1, r);
            stage.lxu = DMatrix::from_element(1, 1, 0.0);
            stage.fxx = Some(vec![DMatrix::from_element(1, 1, 0.2)]);
            stage.fuu = Some(vec![DMatrix::from_element(1, 1, 0.3)]);
            stage.fxu = Some(vec![DMatrix::from_element(1, 1, 0.1)]);
        }

        let vx_term = DVector::from_element(1, 2.0);
        let vxx_term = DMatrix::from_element(1, 1, 10.0);

        let mut cfg_quu = DdpConfig::default();
        cfg_quu.use_state_eq_second_derivative = true;
        cfg_quu.reg_type = RegularizationType::Quu;
        let (policy_quu, _) = backward_pass(&cache, &vx_term, &vxx_term, 0.0, &cfg_quu).unwrap();

        let mut cfg_vxx = cfg_quu.clone();
        cfg_vxx.reg_type = RegularizationType::Vxx;
        let (policy_vxx, _) = backward_pass(&cache, &vx_term, &vxx_term, 0.0, &cfg_vxx).unwrap();

        assert!(
            (policy_quu.big_k[0][(0, 0)] - policy_vxx.big_k[0][(0, 0)]).abs() < 1e-12,
            "K should match between reg types at lambda=0 once both include the tensor contraction"
        );
        assert!((policy_quu.k[0][0] - policy_vxx.k[0][0]).abs() < 1e-12);

        // Sanity: the contraction must actually change Quu relative to the
        // first-order-only value, otherwise this test would pass vacuously.
        let quu_without_contraction = r + b * b * vxx_term[(0, 0)];
        let quu_with_contraction = quu_without_contraction + vx_term[0] * 0.3;
        let expected_k_gain = -(b * vxx_term[(0, 0)] * a + vx_term[0] * 0.1) / quu_with_contraction;
        assert!((policy_quu.big_k[0][(0, 0)] - expected_k_gain).abs() < 1e-9);
    }
}
