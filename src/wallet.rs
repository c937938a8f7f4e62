//! Sponsor wallet management

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::Arc;

/// Holds the sponsor keypair that fronts source-chain costs and partially
/// signs sponsored transactions
pub struct SponsorWallet {
    keypair: Arc<Keypair>,
}

impl SponsorWallet {
    /// Load from a keypair file (raw 64-byte or JSON array format)
    pub fn from_file(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read sponsor keypair file: {}", path))?;

        let keypair = if bytes.len() == 64 {
            if bytes.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid sponsor keypair: all-zero key rejected");
            }
            Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")?
        } else {
            let json: Vec<u8> =
                serde_json::from_slice(&bytes).context("Failed to parse keypair JSON")?;
            if json.len() != 64 {
                anyhow::bail!(
                    "Invalid keypair length: expected 64 bytes, got {}",
                    json.len()
                );
            }
            if json.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid sponsor keypair: all-zero key rejected");
            }
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        };

        Ok(Self {
            keypair: Arc::new(keypair),
        })
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

impl Clone for SponsorWallet {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}
