//! Compatibility layer for Solana SDK message types
//!
//! Solana has two message formats (legacy and V0 with address lookup
//! tables) with different APIs for the same information. This module gives
//! the validators and the builder one consistent accessor set for both, so
//! version handling lives in exactly one place.

use solana_sdk::{
    hash::Hash,
    instruction::CompiledInstruction,
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

/// Message header, uniform across Legacy and V0
#[inline]
#[must_use]
pub fn message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(msg) => &msg.header,
        VersionedMessage::V0(msg) => &msg.header,
    }
}

/// Static account keys (for V0, excludes lookup-table loaded addresses)
#[inline]
#[must_use]
pub fn static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(msg) => &msg.account_keys,
        VersionedMessage::V0(msg) => &msg.account_keys,
    }
}

/// Required signers: always the first N static accounts, where N is
/// `header.num_required_signatures`
#[inline]
#[must_use]
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let n = message_header(message).num_required_signatures as usize;
    let keys = static_account_keys(message);
    &keys[..n.min(keys.len())]
}

/// Compiled instruction list, uniform across both formats
#[inline]
#[must_use]
pub fn compiled_instructions(message: &VersionedMessage) -> &[CompiledInstruction] {
    match message {
        VersionedMessage::Legacy(msg) => &msg.instructions,
        VersionedMessage::V0(msg) => &msg.instructions,
    }
}

/// Recency token anchoring the transaction's validity window
#[inline]
#[must_use]
pub fn recent_blockhash(message: &VersionedMessage) -> &Hash {
    match message {
        VersionedMessage::Legacy(msg) => &msg.recent_blockhash,
        VersionedMessage::V0(msg) => &msg.recent_blockhash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        message::{v0::Message as MessageV0, Message},
        signature::{Keypair, Signer},
        system_instruction,
    };

    fn transfer_ix(payer: &Keypair) -> solana_sdk::instruction::Instruction {
        system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1_000)
    }

    #[test]
    fn test_legacy_accessors() {
        let payer = Keypair::new();
        let hash = Hash::new_unique();
        let message = Message::new_with_blockhash(&[transfer_ix(&payer)], Some(&payer.pubkey()), &hash);
        let versioned = VersionedMessage::Legacy(message);

        assert_eq!(message_header(&versioned).num_required_signatures, 1);
        assert_eq!(static_account_keys(&versioned)[0], payer.pubkey());
        assert_eq!(required_signers(&versioned), &[payer.pubkey()]);
        assert_eq!(compiled_instructions(&versioned).len(), 1);
        assert_eq!(*recent_blockhash(&versioned), hash);
    }

    #[test]
    fn test_v0_accessors() {
        let payer = Keypair::new();
        let hash = Hash::new_unique();
        let message = MessageV0::try_compile(&payer.pubkey(), &[transfer_ix(&payer)], &[], hash)
            .expect("compile");
        let versioned = VersionedMessage::V0(message);

        assert_eq!(message_header(&versioned).num_required_signatures, 1);
        assert_eq!(static_account_keys(&versioned)[0], payer.pubkey());
        assert_eq!(required_signers(&versioned), &[payer.pubkey()]);
        assert_eq!(*recent_blockhash(&versioned), hash);
    }
}
