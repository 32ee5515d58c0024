use thiserror::Error;

/// Errors surfaced by the submission core. Per-target store failures are
/// absorbed by the fan-out and never appear here; `Terminal` is raised only
/// when every storage target rejected a submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid access key: {0}")]
    KeyInvalid(String),

    #[error("unable to save submission: {0}")]
    Terminal(String),
}
