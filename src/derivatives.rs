use nalgebra::DVector;
use nalgebra::DMatrix;

use crate::problem::{Problem, StageDerivatives};

/// Per-stage storage of evaluated first/second order derivatives,
/// refreshed in full before each backward pass (spec §4.2).
///
/// Values computed during the previous accepted iteration are never
/// reused: `(x[t], u[t])` have changed by the time the next backward pass
/// runs.
pub struct DerivativesCache {
    stages: Vec<StageDerivatives>,
}

impl DerivativesCache {
    /// Allocate cache storage for a horizon of `n_stages` transitions.
    pub fn new(n_stages: usize, state_dim: usize, input_dim: usize, with_second_order: bool) -> Self {
        Self {
            stages: (0..n_stages)
                .map(|_| StageDerivatives::zeros(state_dim, input_dim, with_second_order))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, t: usize) -> &StageDerivatives {
        &self.stages[t]
    }

    /// Mutable access to one stage's derivative storage, e.g. for tests
    /// that pre-populate the cache without a `Problem` implementation.
    pub fn stage_mut(&mut self, t: usize) -> &mut StageDerivatives {
        &mut self.stages[t]
    }

    /// Re-evaluate every stage's derivatives against the current trajectory
    /// `(x, u)`. `with_second_order` controls whether the dynamics Hessian
    /// tensors are also refreshed.
    pub fn refresh<P: Problem>(
        &mut self,
        problem: &P,
        x: &[DVector<f64>],
        u: &[DVector<f64>],
        with_second_order: bool,
    ) {
        for t in 0..self.stages.len() {
            let stage = &mut self.stages[t];
            problem.state_eq_derivative(&x[t], &u[t], stage);
            if with_second_order {
                problem.state_eq_second_derivative(&x[t], &u[t], stage);
            }
            problem.running_cost_derivative(&x[t], &u[t], stage);
        }
    }
}

/// Contract a rank-3 tensor represented as `n` slices against a vector:
/// `Σᵢ v[i] · slices[i]`.
///
/// Used for the second-order dynamics terms `Vx · Fxx`, `Vx · Fuu`,
/// `Vx · Fxu` in the backward pass Q-term augmentation (spec §4.3 step 1,
/// §9 "Tensor contractions").
pub fn contract_vec_tensor(v: &DVector<f64>, slices: &[DMatrix<f64>]) -> DMatrix<f64> {
    debug_assert_eq!(v.len(), slices.len());
    let mut acc = slices[0].clone() * v[0];
    for i in 1..slices.len() {
        acc += &slices[i] * v[i];
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contraction_is_weighted_sum() {
        let slices = vec![
            DMatrix::<f64>::identity(2, 2),
            DMatrix::<f64>::from_element(2, 2, 2.0),
        ];
        let v = DVector::from_vec(vec![3.0, 0.5]);
        let result = contract_vec_tensor(&v, &slices);
        let expected = DMatrix::<f64>::identity(2, 2) * 3.0 + DMatrix::from_element(2, 2, 2.0) * 0.5;
        assert_eq!(result, expected);
    }
}
