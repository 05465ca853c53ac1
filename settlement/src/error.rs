//! Error types for the settlement engine

use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Split input cannot produce shares that sum to the total
    #[error("Invalid split: {reason}")]
    InvalidSplit {
        /// What was wrong with the input
        reason: String,
    },

    /// Ledger or balance set violates money conservation
    #[error("Unbalanced ledger: {reason}")]
    UnbalancedLedger {
        /// Offending record ids and amounts
        reason: String,
    },

    /// Checked arithmetic overflowed
    #[error("Amount overflow while {0}")]
    AmountOverflow(String),

    /// Decimal amount could not be converted to minor units
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::InvalidSplit`]
    pub fn invalid_split(reason: impl Into<String>) -> Self {
        Error::InvalidSplit {
            reason: reason.into(),
        }
    }

    /// Build an [`Error::UnbalancedLedger`]
    pub fn unbalanced(reason: impl Into<String>) -> Self {
        Error::UnbalancedLedger {
            reason: reason.into(),
        }
    }

    /// Build an [`Error::AmountOverflow`]
    pub fn overflow(context: impl Into<String>) -> Self {
        Error::AmountOverflow(context.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::invalid_split("exact shares sum to 90, expected 100");
        assert_eq!(
            err.to_string(),
            "Invalid split: exact shares sum to 90, expected 100"
        );

        let err = Error::unbalanced("net positions sum to 5");
        assert_eq!(err.to_string(), "Unbalanced ledger: net positions sum to 5");
    }
}
