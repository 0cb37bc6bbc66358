use thiserror::Error;

/// Why a save or load did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network failure or an HTTP error without a readable reply
    #[error("transport failure: {0}")]
    Transport(String),
    /// The store answered `ok: false`
    #[error("store rejected the request: {reason}")]
    Rejected { reason: String },
    /// The store answered with something we cannot interpret
    #[error("unexpected store response: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn rejected(reason: Option<&str>) -> Self {
        StoreError::Rejected {
            reason: reason.unwrap_or("rejected").to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Malformed(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}
