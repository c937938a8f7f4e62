//! Error taxonomy for the sponsored swap engine
//!
//! Every user-visible failure carries a stable machine-readable code and a
//! human-readable message that never leaks internal detail across the trust
//! boundary. Retryability is classified here so the resilience layer can
//! decide without string-matching at call sites.

use thiserror::Error;

/// Comprehensive error type for all swap engine operations
#[derive(Error, Debug)]
pub enum SwapError {
    /// Bad input shape (malformed address, amount, base64 payload, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown swap id, provider name, or pending entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Quote passed its validity window
    #[error("Quote {quote_id} from {provider} expired")]
    QuoteExpired { provider: String, quote_id: String },

    /// Re-quoted destination amount drifted beyond the accepted threshold
    #[error("Quote drift {drift_percent:.2}% exceeds maximum {max_percent:.2}%")]
    QuoteDrift {
        expected: String,
        actual: String,
        drift_percent: f64,
        max_percent: f64,
    },

    /// User balance cannot cover swap amount + fee
    #[error("Insufficient balance: required {required}, available {available} (deficit {deficit})")]
    InsufficientBalance {
        required: u64,
        available: u64,
        deficit: u64,
    },

    /// One or more economic guarantees failed; all violations are listed
    #[error("Fee validation failed: {}", violations.join("; "))]
    FeeViolation { violations: Vec<String> },

    /// No usable reference price (no cache and the feed fetch failed)
    #[error("Price oracle unavailable: {0}")]
    PriceOracleUnavailable(String),

    /// A bridge provider call failed; tagged with the provider name
    #[error("Provider {provider} error: {message}")]
    Provider { provider: String, message: String },

    /// A transaction safety invariant was violated
    #[error("Transaction validation failed ({invariant}): {message}")]
    TransactionValidation {
        invariant: &'static str,
        message: String,
    },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Chain RPC communication failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Circuit breaker short-circuited the call
    #[error("Circuit open for {key}")]
    CircuitOpen { key: String },

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Check if retrying the operation might succeed.
    ///
    /// Safety-critical failures (fund leak, drift, expiry, economics) are
    /// never retryable: retrying could repeat an unsafe transaction shape.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(msg) => {
                // Insufficient funds surfaces through simulation as an RPC
                // error but retrying cannot fix it
                !msg.contains("insufficient")
            }
            Self::Provider { message, .. } => {
                let lower = message.to_lowercase();
                [
                    "timeout",
                    "connection",
                    "network",
                    "temporarily unavailable",
                    "too many requests",
                    "rate limit",
                    "503",
                    "502",
                    "504",
                    "429",
                ]
                .iter()
                .any(|p| lower.contains(p))
            }
            Self::PriceOracleUnavailable(_) => true,

            Self::Validation(_)
            | Self::NotFound(_)
            | Self::QuoteExpired { .. }
            | Self::QuoteDrift { .. }
            | Self::InsufficientBalance { .. }
            | Self::FeeViolation { .. }
            | Self::TransactionValidation { .. }
            | Self::Configuration(_)
            | Self::CircuitOpen { .. }
            | Self::Internal(_) => false,
        }
    }

    /// Stable machine-readable code for API consumers and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::QuoteExpired { .. } => "quote_expired",
            Self::QuoteDrift { .. } => "quote_drift",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::FeeViolation { .. } => "fee_violation",
            Self::PriceOracleUnavailable(_) => "price_oracle_unavailable",
            Self::Provider { .. } => "provider_error",
            Self::TransactionValidation { .. } => "transaction_validation",
            Self::Configuration(_) => "configuration_error",
            Self::Rpc(_) => "rpc_error",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Human-readable message safe to show outside the trust boundary.
    ///
    /// Internal errors and RPC transport detail are collapsed to a generic
    /// message; everything else is already user-facing.
    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Rpc(_) | Self::CircuitOpen { .. } => {
                "An internal error occurred, please retry later".to_string()
            }
            Self::Provider { provider, .. } => {
                format!("Bridge provider {} is currently unavailable", provider)
            }
            other => other.to_string(),
        }
    }
}

/// Convenience constructors for common scenarios
impl SwapError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tx_invariant(invariant: &'static str, message: impl Into<String>) -> Self {
        Self::TransactionValidation {
            invariant,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability_classification() {
        assert!(SwapError::Rpc("connection reset".to_string()).is_retryable());
        assert!(SwapError::provider("wormstream", "503 service unavailable").is_retryable());
        assert!(!SwapError::provider("wormstream", "route not supported").is_retryable());

        assert!(!SwapError::tx_invariant("fund-leak", "sponsor not payer").is_retryable());
        assert!(!SwapError::QuoteDrift {
            expected: "1000".to_string(),
            actual: "970".to_string(),
            drift_percent: 3.0,
            max_percent: 2.0,
        }
        .is_retryable());
        assert!(!SwapError::FeeViolation {
            violations: vec!["fee below minimum".to_string()],
        }
        .is_retryable());
    }

    #[test]
    fn test_insufficient_rpc_not_retryable() {
        assert!(!SwapError::Rpc("insufficient lamports for fee".to_string()).is_retryable());
    }

    #[test]
    fn test_user_message_never_leaks_internals() {
        let err = SwapError::Internal("dashmap poisoned at orchestrator.rs:42".to_string());
        assert!(!err.user_message().contains("orchestrator.rs"));

        let err = SwapError::Rpc("https://secret-rpc.example.com refused".to_string());
        assert!(!err.user_message().contains("secret-rpc"));
    }

    #[test]
    fn test_fee_violation_lists_all() {
        let err = SwapError::FeeViolation {
            violations: vec!["fee below minimum".to_string(), "quote expired".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("fee below minimum"));
        assert!(msg.contains("quote expired"));
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(SwapError::NotFound("x".to_string()).code(), "not_found");
        assert_eq!(
            SwapError::provider("relaybridge", "boom").code(),
            "provider_error"
        );
    }
}
