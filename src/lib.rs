//! Sponsored cross-chain swap engine
//!
//! Lets a user swap a Solana token for a token on another chain through
//! third-party bridge services while a sponsor account fronts all
//! source-chain costs and recoups them via a fee collected from the user in
//! the same transaction. The crate covers multi-provider quote aggregation
//! and ranking, fee/economic-guarantee enforcement, byte-level transaction
//! assembly with safety validation, and the swap lifecycle state machine
//! with asynchronous status monitoring.

pub mod compat;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod fees;
pub mod metrics;
pub mod oracle;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod rpc;
pub mod storage;
pub mod txbuild;
pub mod types;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::SwapError;
pub use orchestrator::{PrepareResponse, SwapOrchestrator};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
