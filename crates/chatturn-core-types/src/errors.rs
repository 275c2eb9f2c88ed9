use thiserror::Error;

/// Failure of a single page probe call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The underlying DevTools call exceeded its deadline.
    #[error("probe call timed out: {0}")]
    Timeout(String),
    /// The page script threw or the remote side rejected the evaluation.
    #[error("page script failed: {0}")]
    Script(String),
    /// The script ran but returned a payload of the wrong shape.
    #[error("unexpected probe payload: {0}")]
    Contract(String),
    #[error("devtools transport failure: {0}")]
    Transport(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout(_))
    }
}
