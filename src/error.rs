use thiserror::Error;

/// Main error type for the agent fleet
#[derive(Error, Debug)]
pub enum DuckError {
    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Price feed unavailable: {0}")]
    PriceFeed(String),

    // Chain errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction error: {0}")]
    Tx(String),

    #[error("Transaction timeout: {0}")]
    TxTimeout(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DuckError
pub type Result<T> = std::result::Result<T, DuckError>;

impl DuckError {
    /// Transient errors are safe to ignore for one tick; the loop retries
    /// naturally on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DuckError::Http(_)
                | DuckError::PriceFeed(_)
                | DuckError::Rpc(_)
                | DuckError::TxTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DuckError::Rpc("connection refused".into()).is_transient());
        assert!(DuckError::PriceFeed("no pairs".into()).is_transient());
        assert!(!DuckError::InvalidInput("confidence 101".into()).is_transient());
        assert!(!DuckError::Wallet("bad key".into()).is_transient());
    }
}
