use thiserror::Error;

/// Failure modes the solver can report, per the error-handling design in
/// the crate's specification (§7).
///
/// `BackwardFactorizationFailure` and `NoAcceptableStep` are handled
/// internally by the regularization controller and only escalate to the
/// caller if they exhaust the `λ` ceiling, at which point they surface as
/// `RegularizationOverflow`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DdpError {
    /// `λ` exceeded `lambda_max` after a regularization increase.
    #[error("regularization overflow: lambda {lambda:e} exceeded lambda_max {lambda_max:e}")]
    RegularizationOverflow { lambda: f64, lambda_max: f64 },

    /// `Q̃uu` was not positive definite at the given stage and the
    /// regularization ceiling was reached while retrying.
    #[error("backward pass factorization failed at stage {stage}")]
    BackwardFactorizationFailure { stage: usize },

    /// No `α` in the line-search schedule produced an acceptable step and
    /// the regularization ceiling was reached while retrying.
    #[error("no acceptable step found in line search at iteration {iteration}")]
    NoAcceptableStep { iteration: usize },

    /// Dimensions are inconsistent at `solve` entry: zero state/input
    /// dimension, zero horizon, or a seed input sequence of the wrong
    /// length.
    #[error("degenerate problem: {reason}")]
    DegenerateProblem { reason: String },
}

pub type DdpResult<T> = Result<T, DdpError>;
