use crate::utils::batch::BatchKey;
use thiserror::Error;

/// Domain errors. Operations return `anyhow::Result`, these can be recovered with
/// `downcast_ref::<PgError>()`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PgError {
    #[error("the env must be defined in the config or passed as an argument")]
    MissingEnv,
    #[error("batch is missing the `{0}` field")]
    MissingField(BatchKey),
    #[error("field `{key}` has {got} entries but the batch has {expected} steps")]
    LengthMismatch {
        key: BatchKey,
        expected: usize,
        got: usize,
    },
    #[error("cannot build a batch without any steps")]
    EmptyBatch,
    #[error("no object registered under `{0}`")]
    UnknownObject(String),
    #[error("kl divergence between {0} and {1} distributions is not defined")]
    DistributionMismatch(&'static str, &'static str),
    #[error("invalid model state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
