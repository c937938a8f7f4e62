//! Size and simulation checks
//!
//! Enforces the fixed maximum serialized size and dry-runs the transaction
//! against the chain, surfacing actionable failures (insufficient balance)
//! distinctly from opaque simulation errors.

use crate::error::SwapError;
use crate::rpc::ChainRpc;
use crate::txbuild::builder::TransactionBuilder;
use solana_sdk::transaction::TransactionError;
use tracing::debug;

/// Maximum serialized transaction size accepted by the network
pub const MAX_TRANSACTION_SIZE: usize = solana_sdk::packet::PACKET_DATA_SIZE;

/// Reject transactions over the wire-size limit
pub fn validate_size(tx_bytes: &[u8]) -> Result<(), SwapError> {
    if tx_bytes.len() > MAX_TRANSACTION_SIZE {
        return Err(SwapError::tx_invariant(
            "size",
            format!(
                "serialized transaction is {} bytes, limit {}",
                tx_bytes.len(),
                MAX_TRANSACTION_SIZE
            ),
        ));
    }
    Ok(())
}

/// Dry-run the transaction. Balance problems come back as a distinct,
/// actionable validation error; anything else is surfaced as an opaque
/// simulation failure with its log tail attached.
pub async fn simulate_transaction(rpc: &dyn ChainRpc, tx_bytes: &[u8]) -> Result<(), SwapError> {
    let tx = TransactionBuilder::deserialize(tx_bytes)?;
    let result = rpc.simulate_transaction(&tx).await?;

    let Some(err) = result.err else {
        debug!(
            units = ?result.units_consumed,
            "Simulation succeeded"
        );
        return Ok(());
    };

    let logs = result.logs;
    match err {
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. } => Err(SwapError::Validation(
            "insufficient balance to execute this swap".to_string(),
        )),
        other => {
            // SPL token error 1 is InsufficientFunds; the log line is the
            // only reliable signal once instructions are opaque
            if logs.iter().any(|l| l.to_lowercase().contains("insufficient")) {
                return Err(SwapError::Validation(
                    "insufficient token balance to execute this swap".to_string(),
                ));
            }
            let tail = logs
                .iter()
                .rev()
                .take(3)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ");
            Err(SwapError::Rpc(format!(
                "simulation failed: {:?} ({})",
                other, tail
            )))
        }
    }
}
