//! Error types for Bayesian neural network training and prediction.

use thiserror::Error;

/// Errors raised while configuring, training or querying a Bayesian neural network.
#[derive(Error, Debug)]
pub enum BnnError {
    /// Minibatches must contain at least one example.
    #[error("invalid batch size {0}: batches must contain at least a single sample")]
    InvalidBatchSize(usize),

    /// Learning rates must be non-negative.
    #[error("invalid learning rate: {0}")]
    InvalidLearningRate(f64),

    /// Any other hyperparameter outside its admissible range.
    #[error("invalid value {value} for hyperparameter `{name}`")]
    InvalidHyperparameter {
        /// Name of the offending hyperparameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The sampling method identifier is not one of the known samplers.
    #[error("unknown sampling method `{0}`; expected one of sghmc, adaptive_sghmc, sgld, preconditioned_sgld, constant_sgd, sghmchd")]
    UnknownSamplingMethod(String),

    /// Array or tensor shapes do not line up.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// The input dimensionality differs from the one the network was built for.
    #[error("input dimensionality mismatch: network expects {expected} features, got {got}")]
    DimensionMismatch {
        /// Dimensionality seen during training.
        expected: usize,
        /// Dimensionality of the offending input.
        got: usize,
    },

    /// The network has not been built yet.
    #[error("the network has not been initialized; call train() or initialize_network() first")]
    NotTrained,

    /// Prediction requires at least one sampled network.
    #[error("no sampled networks available; train with more steps after burn-in than keep_every")]
    EmptyEnsemble,

    /// Conversion between tensor data and plain arrays failed.
    #[error("tensor data error: {0}")]
    Data(String),

    /// Progress bar template error.
    #[error("progress bar template error: {0}")]
    Progress(#[from] indicatif::style::TemplateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error.
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for Bayesian neural network operations.
///
/// The error parameter defaults to [`BnnError`] so that code naming `Result<T, E>` in modules
/// importing this alias (such as burn's `Config` derive) still resolves.
pub type Result<T, E = BnnError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_count(s: &str) -> Result<usize, std::num::ParseIntError> {
        s.parse()
    }

    #[test]
    fn test_result_alias_accepts_explicit_error_type() {
        assert_eq!(parse_count("3").unwrap(), 3);
        assert!(parse_count("x").is_err());
        let err: Result<()> = Err(BnnError::NotTrained);
        assert!(err.unwrap_err().to_string().contains("not been initialized"));
    }
}
