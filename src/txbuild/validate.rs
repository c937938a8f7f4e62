//! No-fund-leak transaction validation
//!
//! The last line of defense before a transaction is shown to the user for
//! signature, and again before submission. Decodes the final message and
//! asserts the safety invariants directly on the bytes that will be sent.

use crate::compat;
use crate::error::SwapError;
use crate::fees::validator::is_fee_transfer_program;
use crate::txbuild::builder::TransactionBuilder;
use solana_sdk::pubkey::Pubkey;

/// Assert the sponsored-transaction safety invariants:
/// - the sponsor is the fee payer (account index 0) when supplied,
/// - at least two instructions exist,
/// - the first instruction targets a fee-transfer-capable program.
pub fn validate_no_fund_leak(
    tx_bytes: &[u8],
    sponsor: Option<&Pubkey>,
) -> Result<(), SwapError> {
    let tx = TransactionBuilder::deserialize(tx_bytes)?;
    let keys = compat::static_account_keys(&tx.message);

    if let Some(sponsor) = sponsor {
        match keys.first() {
            Some(payer) if payer == sponsor => {}
            Some(payer) => {
                return Err(SwapError::tx_invariant(
                    "fund-leak",
                    format!(
                        "FUND LEAK BLOCKED: fee payer {} is not the sponsor {}",
                        payer, sponsor
                    ),
                ));
            }
            None => {
                return Err(SwapError::tx_invariant(
                    "fund-leak",
                    "transaction has no accounts",
                ));
            }
        }
    }

    let instructions = compat::compiled_instructions(&tx.message);
    if instructions.len() < 2 {
        return Err(SwapError::tx_invariant(
            "fund-leak",
            format!(
                "expected at least 2 instructions, got {}",
                instructions.len()
            ),
        ));
    }

    // Program ids always live in the static key section, so no lookup-table
    // resolution is needed here
    let first_program = keys
        .get(instructions[0].program_id_index as usize)
        .ok_or_else(|| {
            SwapError::tx_invariant("fund-leak", "first instruction program id out of range")
        })?;
    if !is_fee_transfer_program(first_program) {
        return Err(SwapError::tx_invariant(
            "fund-leak",
            format!(
                "first instruction targets {} which cannot collect the fee",
                first_program
            ),
        ));
    }

    Ok(())
}
