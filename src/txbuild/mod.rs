//! Transaction builder supercomponent
//!
//! Operates on serialized transaction bytes directly, because opaque
//! bridge-provided transactions must pass through with their lookup-table
//! references, account ordering, and signer roles intact.
//!
//! Modules:
//! - **codec**: wire-format offset arithmetic and blockhash patching
//! - **builder**: fee injection, lookup-table resolution, partial signing
//! - **validate**: no-fund-leak final defense
//! - **simulate**: size cap and dry-run checks

pub mod builder;
pub mod codec;
pub mod simulate;
pub mod validate;

pub use builder::TransactionBuilder;
pub use codec::{parse_layout, replace_blockhash, TxLayout};
pub use simulate::{simulate_transaction, validate_size, MAX_TRANSACTION_SIZE};
pub use validate::validate_no_fund_leak;
