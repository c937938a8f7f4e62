//! Wire-format codec for serialized transactions
//!
//! A serialized transaction is `[compact-u16 signature count][signatures]
//! [message]`, with legacy and versioned message layouts distinguished by
//! the high bit of the first message byte. The blockhash offset is computed
//! from the signature count and static account count; nothing else in the
//! message is interpreted. All offset arithmetic lives here; never inline
//! it into business logic.

use crate::error::SwapError;
use solana_sdk::hash::Hash;

/// Size of one ed25519 signature on the wire
const SIGNATURE_BYTES: usize = 64;
/// Size of one account key on the wire
const PUBKEY_BYTES: usize = 32;
/// Size of the message header (3 u8 counts)
const HEADER_BYTES: usize = 3;
/// Size of the recency token
const BLOCKHASH_BYTES: usize = 32;

fn truncated(what: &str) -> SwapError {
    SwapError::tx_invariant("wire-format", format!("transaction truncated at {}", what))
}

/// Decode a compact-u16 (shortvec length prefix) at `pos`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_compact_u16(bytes: &[u8], pos: usize) -> Result<(u16, usize), SwapError> {
    let mut value: u32 = 0;
    let mut size = 0usize;
    loop {
        let byte = *bytes
            .get(pos + size)
            .ok_or_else(|| truncated("compact-u16"))?;
        value |= ((byte & 0x7f) as u32) << (size * 7);
        size += 1;
        if byte & 0x80 == 0 {
            break;
        }
        if size == 3 {
            return Err(SwapError::tx_invariant(
                "wire-format",
                "compact-u16 longer than 3 bytes",
            ));
        }
    }
    if value > u16::MAX as u32 {
        return Err(SwapError::tx_invariant(
            "wire-format",
            format!("compact-u16 value {} overflows", value),
        ));
    }
    Ok((value as u16, size))
}

/// Decoded positional layout of a serialized transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLayout {
    pub num_signatures: u16,
    /// Offset of the first message byte
    pub message_start: usize,
    /// True for version-prefixed (V0) messages
    pub is_versioned: bool,
    pub num_static_accounts: u16,
    /// Offset of the 32-byte recency token
    pub blockhash_offset: usize,
}

/// Compute the exact byte offsets of a serialized transaction's message
/// structure, handling both legacy and versioned layouts
pub fn parse_layout(bytes: &[u8]) -> Result<TxLayout, SwapError> {
    let (num_signatures, sig_prefix) = decode_compact_u16(bytes, 0)?;
    let message_start = sig_prefix + num_signatures as usize * SIGNATURE_BYTES;

    let first = *bytes.get(message_start).ok_or_else(|| truncated("message"))?;
    let is_versioned = first & 0x80 != 0;
    if is_versioned && first & 0x7f != 0 {
        return Err(SwapError::tx_invariant(
            "wire-format",
            format!("unsupported message version {}", first & 0x7f),
        ));
    }

    let header_start = if is_versioned {
        message_start + 1
    } else {
        message_start
    };
    let accounts_prefix_pos = header_start + HEADER_BYTES;
    let (num_static_accounts, accounts_prefix) = decode_compact_u16(bytes, accounts_prefix_pos)?;

    let blockhash_offset =
        accounts_prefix_pos + accounts_prefix + num_static_accounts as usize * PUBKEY_BYTES;
    if bytes.len() < blockhash_offset + BLOCKHASH_BYTES {
        return Err(truncated("recency token"));
    }

    Ok(TxLayout {
        num_signatures,
        message_start,
        is_versioned,
        num_static_accounts,
        blockhash_offset,
    })
}

/// Overwrite the recency token in place.
///
/// The bytes at the computed offset must equal `old`; a mismatch aborts with
/// an error rather than corrupting an unrelated byte range. When `new`
/// equals `old` the output is byte-identical.
pub fn replace_blockhash(bytes: &mut [u8], old: &Hash, new: &Hash) -> Result<(), SwapError> {
    let layout = parse_layout(bytes)?;
    let off = layout.blockhash_offset;

    let existing = &bytes[off..off + BLOCKHASH_BYTES];
    if existing != &old.to_bytes()[..] {
        return Err(SwapError::tx_invariant(
            "blockhash-offset",
            format!(
                "bytes at offset {} do not match the expected recency token {}",
                off, old
            ),
        ));
    }

    bytes[off..off + BLOCKHASH_BYTES].copy_from_slice(&new.to_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        address_lookup_table::AddressLookupTableAccount,
        message::{v0::Message as MessageV0, Message, VersionedMessage},
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
        system_instruction,
        transaction::VersionedTransaction,
    };

    fn unsigned_tx(message: VersionedMessage) -> Vec<u8> {
        let n = crate::compat::message_header(&message).num_required_signatures as usize;
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); n],
            message,
        };
        bincode::serialize(&tx).expect("serialize")
    }

    fn legacy_tx(blockhash: Hash) -> Vec<u8> {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1_000);
        let message = Message::new_with_blockhash(&[ix], Some(&payer.pubkey()), &blockhash);
        unsigned_tx(VersionedMessage::Legacy(message))
    }

    fn v0_tx(blockhash: Hash, with_lookup: bool) -> Vec<u8> {
        let payer = Keypair::new();
        let dest = Pubkey::new_unique();
        let ix = system_instruction::transfer(&payer.pubkey(), &dest, 1_000);
        let tables = if with_lookup {
            vec![AddressLookupTableAccount {
                key: Pubkey::new_unique(),
                addresses: vec![dest, Pubkey::new_unique()],
            }]
        } else {
            Vec::new()
        };
        let message =
            MessageV0::try_compile(&payer.pubkey(), &[ix], &tables, blockhash).expect("compile");
        unsigned_tx(VersionedMessage::V0(message))
    }

    #[test]
    fn test_layout_legacy_against_real_bytes() {
        let hash = Hash::new_unique();
        let bytes = legacy_tx(hash);
        let layout = parse_layout(&bytes).unwrap();

        assert_eq!(layout.num_signatures, 1);
        assert!(!layout.is_versioned);
        // The 32 bytes at the computed offset are exactly the blockhash
        let off = layout.blockhash_offset;
        assert_eq!(&bytes[off..off + 32], &hash.to_bytes()[..]);
    }

    #[test]
    fn test_layout_versioned_against_real_bytes() {
        let hash = Hash::new_unique();
        for with_lookup in [false, true] {
            let bytes = v0_tx(hash, with_lookup);
            let layout = parse_layout(&bytes).unwrap();

            assert!(layout.is_versioned);
            let off = layout.blockhash_offset;
            assert_eq!(
                &bytes[off..off + 32],
                &hash.to_bytes()[..],
                "with_lookup={}",
                with_lookup
            );
        }
    }

    #[test]
    fn test_replace_blockhash_round_trips() {
        let old = Hash::new_unique();
        let new = Hash::new_unique();

        for mut bytes in [legacy_tx(old), v0_tx(old, true)] {
            replace_blockhash(&mut bytes, &old, &new).unwrap();
            let tx: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
            assert_eq!(*crate::compat::recent_blockhash(&tx.message), new);
        }
    }

    #[test]
    fn test_replace_with_same_hash_is_byte_identical() {
        let old = Hash::new_unique();
        let bytes = legacy_tx(old);
        let mut patched = bytes.clone();
        replace_blockhash(&mut patched, &old, &old).unwrap();
        assert_eq!(bytes, patched);
    }

    #[test]
    fn test_mismatched_old_hash_fails_loudly() {
        let actual = Hash::new_unique();
        let wrong = Hash::new_unique();
        let new = Hash::new_unique();

        let mut bytes = v0_tx(actual, false);
        let original = bytes.clone();
        let err = replace_blockhash(&mut bytes, &wrong, &new).unwrap_err();
        assert_eq!(err.code(), "transaction_validation");
        // Never silently corrupts bytes
        assert_eq!(bytes, original);
    }

    #[test]
    fn test_compact_u16_decoding() {
        assert_eq!(decode_compact_u16(&[0x00], 0).unwrap(), (0, 1));
        assert_eq!(decode_compact_u16(&[0x05], 0).unwrap(), (5, 1));
        assert_eq!(decode_compact_u16(&[0x7f], 0).unwrap(), (127, 1));
        assert_eq!(decode_compact_u16(&[0x80, 0x01], 0).unwrap(), (128, 2));
        assert_eq!(decode_compact_u16(&[0xff, 0x01], 0).unwrap(), (255, 2));
        assert_eq!(decode_compact_u16(&[0x80, 0x80, 0x01], 0).unwrap(), (16_384, 3));

        assert!(decode_compact_u16(&[], 0).is_err());
        assert!(decode_compact_u16(&[0x80], 0).is_err());
        assert!(decode_compact_u16(&[0x80, 0x80, 0x80, 0x01], 0).is_err());
    }

    #[test]
    fn test_truncated_transaction_rejected() {
        let bytes = legacy_tx(Hash::new_unique());
        // Chop off the tail including part of the blockhash
        let layout = parse_layout(&bytes).unwrap();
        let cut = &bytes[..layout.blockhash_offset + 10];
        assert!(parse_layout(cut).is_err());
    }

    #[test]
    fn test_unknown_message_version_rejected() {
        let mut bytes = v0_tx(Hash::new_unique(), false);
        let layout = parse_layout(&bytes).unwrap();
        // Corrupt the version prefix to an unsupported version
        bytes[layout.message_start] = 0x85;
        assert!(parse_layout(&bytes).is_err());
    }
}
