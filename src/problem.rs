use nalgebra::{DMatrix, DVector};

/// Per-stage first/second order derivatives, owned by the caller's
/// `DerivativesCache` and filled in place by `Problem` methods so that
/// derivative evaluation allocates nothing beyond the one-time cache setup
/// (spec §4.2, §6.4).
#[derive(Debug, Clone)]
pub struct StageDerivatives {
    /// `∂f/∂x`, shape `n × n`.
    pub fx: DMatrix<f64>,
    /// `∂f/∂u`, shape `n × m`.
    pub fu: DMatrix<f64>,
    /// `n` slices of shape `n × n`, present only when second-order dynamics
    /// are enabled.
    pub fxx: Option<Vec<DMatrix<f64>>>,
    /// `n` slices of shape `m × m`, present only when second-order dynamics
    /// are enabled.
    pub fuu: Option<Vec<DMatrix<f64>>>,
    /// `n` slices of shape `n × m`, present only when second-order dynamics
    /// are enabled.
    pub fxu: Option<Vec<DMatrix<f64>>>,
    /// `∂ℓ/∂x`, length `n`.
    pub lx: DVector<f64>,
    /// `∂ℓ/∂u`, length `m`.
    pub lu: DVector<f64>,
    /// `∂²ℓ/∂x²`, shape `n × n`.
    pub lxx: DMatrix<f64>,
    /// `∂²ℓ/∂u²`, shape `m × m`.
    pub luu: DMatrix<f64>,
    /// `∂²ℓ/∂x∂u`, shape `n × m`.
    pub lxu: DMatrix<f64>,
}

impl StageDerivatives {
    /// Allocate zeroed storage for one stage, including the rank-3 tensors
    /// when `with_second_order` is set.
    pub fn zeros(n: usize, m: usize, with_second_order: bool) -> Self {
        Self {
            fx: DMatrix::zeros(n, n),
            fu: DMatrix::zeros(n, m),
            fxx: with_second_order.then(|| vec![DMatrix::zeros(n, n); n]),
            fuu: with_second_order.then(|| vec![DMatrix::zeros(m, m); n]),
            fxu: with_second_order.then(|| vec![DMatrix::zeros(n, m); n]),
            lx: DVector::zeros(n),
            lu: DVector::zeros(m),
            lxx: DMatrix::zeros(n, n),
            luu: DMatrix::zeros(m, m),
            lxu: DMatrix::zeros(n, m),
        }
    }
}

/// The sole boundary the solver uses to query the environment: discrete
/// dynamics, running/terminal cost, and their derivatives (spec §4.1).
///
/// Any integrator, rigid-body model, or learned dynamics sits behind this
/// trait. Implementations must be deterministic and total over the domain
/// the caller supplies; the solver does not verify that derivative methods
/// match the finite-difference limit of `state_eq`/`running_cost`/
/// `terminal_cost`, but convergence depends on it.
pub trait Problem {
    /// State dimension `n`. Constant through a solve.
    fn state_dim(&self) -> usize;
    /// Input dimension `m`. Constant through a solve.
    fn input_dim(&self) -> usize;

    /// `f(x, u) -> x'`.
    fn state_eq(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64>;

    /// `ℓ(x, u)`.
    fn running_cost(&self, x: &DVector<f64>, u: &DVector<f64>) -> f64;

    /// `φ(x)`.
    fn terminal_cost(&self, x: &DVector<f64>) -> f64;

    /// First-order dynamics derivatives: fill `out.fx`, `out.fu`.
    fn state_eq_derivative(&self, x: &DVector<f64>, u: &DVector<f64>, out: &mut StageDerivatives);

    /// Second-order dynamics derivatives: fill `out.fxx`, `out.fuu`,
    /// `out.fxu`. Only called when
    /// `DdpConfig::use_state_eq_second_derivative` is set; implementors
    /// that enable the flag must override this.
    fn state_eq_second_derivative(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        out: &mut StageDerivatives,
    ) {
        let _ = (x, u, out);
        unimplemented!(
            "Problem::state_eq_second_derivative must be implemented when \
             use_state_eq_second_derivative is enabled"
        )
    }

    /// First/second-order running cost derivatives: fill `out.lx`,
    /// `out.lu`, `out.lxx`, `out.luu`, `out.lxu`.
    fn running_cost_derivative(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        out: &mut StageDerivatives,
    );

    /// First/second-order terminal cost derivatives at `x[N]`.
    fn terminal_cost_derivative(&self, x: &DVector<f64>, vx: &mut DVector<f64>, vxx: &mut DMatrix<f64>);
}
