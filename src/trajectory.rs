use nalgebra::{DMatrix, DVector};

/// An ordered state/input sequence: `x[0..N]` (length `N+1`) and
/// `u[0..N-1]` (length `N`) (spec §3 "Trajectory").
///
/// `x[0]` is always the caller-supplied current state; for `t < N`,
/// `x[t+1] = f(x[t], u[t])` holds after a successful forward pass.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub x: Vec<DVector<f64>>,
    pub u: Vec<DVector<f64>>,
}

impl Trajectory {
    pub fn horizon(&self) -> usize {
        self.u.len()
    }

    /// Allocate a trajectory of the given shape, states and inputs zeroed.
    pub fn zeros(n_steps: usize, state_dim: usize, input_dim: usize) -> Self {
        Self {
            x: vec![DVector::zeros(state_dim); n_steps + 1],
            u: vec![DVector::zeros(input_dim); n_steps],
        }
    }
}

/// Per-stage policy correction produced by the backward pass (spec §3
/// "Policy correction"): feedforward `k[t] ∈ ℝ^m` and feedback gain
/// `K[t] ∈ ℝ^{m×n}`, applied as `Δu[t] = α·k[t] + K[t]·(x[t] − x̄[t])`.
#[derive(Debug, Clone)]
pub struct PolicyCorrection {
    pub k: Vec<DVector<f64>>,
    pub big_k: Vec<DMatrix<f64>>,
}

impl PolicyCorrection {
    pub fn zeros(n_steps: usize, state_dim: usize, input_dim: usize) -> Self {
        Self {
            k: vec![DVector::zeros(input_dim); n_steps],
            big_k: vec![DMatrix::zeros(input_dim, state_dim); n_steps],
        }
    }

    /// `max_t ‖k[t]‖ / (‖u[t]‖ + 1)`, the relative feedforward norm used by
    /// the convergence test in spec §4.5 step 6.
    pub fn relative_norm(&self, u: &[DVector<f64>]) -> f64 {
        self.k
            .iter()
            .zip(u)
            .map(|(k, u)| k.norm() / (u.norm() + 1.0))
            .fold(0.0, f64::max)
    }
}

/// Per-stage running/terminal cost, `L[0..N]` (spec §3 "Stage cost
/// vector"). `L[t] = ℓ(x[t], u[t])` for `t < N`, `L[N] = φ(x[N])`.
#[derive(Debug, Clone)]
pub struct StageCosts(pub Vec<f64>);

impl StageCosts {
    pub fn zeros(n_steps: usize) -> Self {
        Self(vec![0.0; n_steps + 1])
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }
}
