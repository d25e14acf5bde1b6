use nalgebra::DVector;

use crate::problem::Problem;
use crate::trajectory::{PolicyCorrection, StageCosts, Trajectory};

/// Candidate rollout produced by a forward pass: tentative states/inputs,
/// their per-stage cost, and the total cost (spec §4.4).
pub struct ForwardResult {
    pub trajectory: Trajectory,
    pub stage_costs: StageCosts,
}

impl ForwardResult {
    pub fn total_cost(&self) -> f64 {
        self.stage_costs.total()
    }
}

/// Roll the closed-loop policy `u[t] + α·k[t] + K[t]·(x̃[t] − x̄[t])`
/// forward from `current_x`, evaluating cost as each stage is computed
/// (spec §4.4).
///
/// `reference` is the trajectory the policy correction was linearized
/// around (`x̄`, `ū`); `current_x` seeds `x̃[0]`.
pub fn forward_pass<P: Problem>(
    problem: &P,
    current_x: &DVector<f64>,
    reference: &Trajectory,
    policy: &PolicyCorrection,
    alpha: f64,
) -> ForwardResult {
    let n_steps = reference.horizon();
    let mut trajectory = Trajectory::zeros(n_steps, problem.state_dim(), problem.input_dim());
    let mut stage_costs = StageCosts::zeros(n_steps);

    trajectory.x[0] = current_x.clone();

    for t in 0..n_steps {
        let dx = &trajectory.x[t] - &reference.x[t];
        let u = &reference.u[t] + alpha * &policy.k[t] + &policy.big_k[t] * dx;
        stage_costs.0[t] = problem.running_cost(&trajectory.x[t], &u);
        trajectory.x[t + 1] = problem.state_eq(&trajectory.x[t], &u);
        trajectory.u[t] = u;
    }
    stage_costs.0[n_steps] = problem.terminal_cost(&trajectory.x[n_steps]);

    ForwardResult {
        trajectory,
        stage_costs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    struct Identity1D;
    impl Problem for Identity1D {
        fn state_dim(&self) -> usize {
            1
        }
        fn input_dim(&self) -> usize {
            1
        }
        fn state_eq(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
            x + u
        }
        fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
            x[0] * x[0] + u[0] * u[0]
        }
        fn terminal_cost(&self, x: &DVector<f64>) -> f64 {
            x[0] * x[0]
        }
        fn state_eq_derivative(
            &self,
            _x: &DVector<f64>,
            _u: &DVector<f64>,
            out: &mut crate::problem::StageDerivatives,
        ) {
            out.fx = DMatrix::identity(1, 1);
            out.fu = DMatrix::identity(1, 1);
        }
        fn running_cost_derivative(
            &self,
            x: &DVector<f64>,
            u: &DVector<f64>,
            out: &mut crate::problem::StageDerivatives,
        ) {
            out.lx = 2.0 * x;
            out.lu = 2.0 * u;
            out.lxx = DMatrix::from_element(1, 1, 2.0);
            out.luu = DMatrix::from_element(1, 1, 2.0);
            out.lxu = DMatrix::zeros(1, 1);
        }
        fn terminal_cost_derivative(&self, x: &DVector<f64>, vx: &mut DVector<f64>, vxx: &mut DMatrix<f64>) {
            *vx = 2.0 * x;
            *vxx = DMatrix::from_element(1, 1, 2.0);
        }
    }

    #[test]
    fn zero_policy_reproduces_reference_trajectory() {
        let problem = Identity1D;
        let n_steps = 3;
        let mut reference = Trajectory::zeros(n_steps, 1, 1);
        reference.x[0] = DVector::from_element(1, 1.0);
        for t in 0..n_steps {
            reference.u[t] = DVector::from_element(1, 0.5);
            reference.x[t + 1] = problem.state_eq(&reference.x[t], &reference.u[t]);
        }
        let policy = PolicyCorrection::zeros(n_steps, 1, 1);

        let result = forward_pass(&problem, &reference.x[0].clone(), &reference, &policy, 1.0);

        for t in 0..=n_steps {
            assert!((result.trajectory.x[t][0] - reference.x[t][0]).abs() < 1e-12);
        }
    }
}
