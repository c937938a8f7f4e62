//! Fee computation and economic-guarantee enforcement
//!
//! The calculator derives the minimum user fee that keeps the sponsor whole;
//! the validator enforces that guarantee (plus balance, expiry, and
//! transaction-shape checks) before any funds move.

pub mod calculator;
pub mod validator;

pub use calculator::{FeeCalculator, MinimumFee};
pub use validator::{FeeValidator, ShapeReport};
