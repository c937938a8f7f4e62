//! Fee validator
//!
//! Pure validation logic enforcing the economic guarantees before any funds
//! move. Violations are collected, not short-circuited, so a caller can
//! report every problem at once.

use crate::config::FeeConfig;
use crate::error::SwapError;
use crate::fees::calculator::{lamports_to_usd, MinimumFee};
use crate::types::{BridgeQuote, CostBreakdown, UserFee};
use chrono::{DateTime, Utc};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, system_program};
use tracing::warn;

/// Result of transaction shape validation
#[derive(Debug, Default)]
pub struct ShapeReport {
    /// Hard failures: the transaction must not proceed
    pub violations: Vec<String>,
    /// Heuristic findings worth logging but not fatal
    pub warnings: Vec<String>,
}

impl ShapeReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct FeeValidator {
    cfg: FeeConfig,
}

impl FeeValidator {
    pub fn new(cfg: FeeConfig) -> Self {
        Self { cfg }
    }

    /// Check every economic guarantee, returning the full violation list
    pub fn validate_economics(
        &self,
        fee: &UserFee,
        costs: &CostBreakdown,
        quote: &BridgeQuote,
        minimum: &MinimumFee,
        sol_usd: f64,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut violations = Vec::new();

        let cost_usd = lamports_to_usd(costs.total_sponsor_cost, sol_usd);
        let covered = cost_usd * (1.0 + self.cfg.volatility_buffer);
        if fee.value_usd + 1e-9 < covered {
            violations.push(format!(
                "fee value ${:.6} does not cover sponsor cost ${:.6} with {:.0}% buffer",
                fee.value_usd,
                cost_usd,
                self.cfg.volatility_buffer * 100.0
            ));
        }

        if quote.is_expired(now) {
            violations.push(format!(
                "quote {} expired at {}",
                quote.quote_id, quote.valid_until
            ));
        }

        let min_amount = minimum.in_token(fee.token).amount;
        if fee.amount < min_amount {
            violations.push(format!(
                "fee amount {} below calculator minimum {}",
                fee.amount, min_amount
            ));
        }

        if costs.total_sponsor_cost > self.cfg.max_sponsor_cost_lamports {
            violations.push(format!(
                "sponsor cost {} lamports exceeds ceiling {}",
                costs.total_sponsor_cost, self.cfg.max_sponsor_cost_lamports
            ));
        }

        violations
    }

    /// `validate_economics` surfaced as an error carrying all violations
    pub fn ensure_economics(
        &self,
        fee: &UserFee,
        costs: &CostBreakdown,
        quote: &BridgeQuote,
        minimum: &MinimumFee,
        sol_usd: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SwapError> {
        let violations = self.validate_economics(fee, costs, quote, minimum, sol_usd, now);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SwapError::FeeViolation { violations })
        }
    }

    /// Balance sufficiency, reporting the exact deficit
    pub fn check_balance(&self, required: u64, available: u64) -> Result<(), SwapError> {
        if available >= required {
            Ok(())
        } else {
            Err(SwapError::InsufficientBalance {
                required,
                available,
                deficit: required - available,
            })
        }
    }

    /// The coverage check surfaced as a dedicated guard used right before a
    /// transaction leaves the service boundary. THE SPONSOR MUST NEVER PAY
    /// COSTS WITHOUT A COVERING FEE.
    pub fn assert_no_fund_leak(
        &self,
        fee_value_usd: f64,
        sponsor_cost_usd: f64,
    ) -> Result<(), SwapError> {
        if fee_value_usd + 1e-9 < sponsor_cost_usd {
            return Err(SwapError::tx_invariant(
                "fund-leak",
                format!(
                    "FUND LEAK BLOCKED: fee ${:.6} below sponsor cost ${:.6}",
                    fee_value_usd, sponsor_cost_usd
                ),
            ));
        }
        Ok(())
    }

    /// Validate the shape of a decoded instruction list: at least two
    /// instructions, and a fee-transfer-capable first program. Duplicate
    /// instructions are a heuristic warning, not a hard failure.
    pub fn validate_shape(&self, instructions: &[Instruction]) -> ShapeReport {
        let mut report = ShapeReport::default();

        if instructions.len() < 2 {
            report.violations.push(format!(
                "expected at least 2 instructions, got {}",
                instructions.len()
            ));
            return report;
        }

        let first = &instructions[0];
        if !is_fee_transfer_program(&first.program_id) {
            report.violations.push(format!(
                "first instruction targets {} which cannot carry a fee transfer",
                first.program_id
            ));
        }

        for i in 0..instructions.len() {
            for j in (i + 1)..instructions.len() {
                if instructions_identical(&instructions[i], &instructions[j]) {
                    let msg = format!("instructions {} and {} are identical", i, j);
                    warn!("{}", msg);
                    report.warnings.push(msg);
                }
            }
        }

        report
    }
}

/// Programs recognized as able to carry the fee-collection step: native
/// transfer, SPL token transfer, or idempotent associated-account creation
pub fn is_fee_transfer_program(program_id: &Pubkey) -> bool {
    *program_id == system_program::id()
        || *program_id == spl_token::id()
        || *program_id == spl_associated_token_account::id()
}

fn instructions_identical(a: &Instruction, b: &Instruction) -> bool {
    a.program_id == b.program_id
        && a.data == b.data
        && a.accounts.len() == b.accounts.len()
        && a.accounts
            .iter()
            .zip(b.accounts.iter())
            .all(|(x, y)| x.pubkey == y.pubkey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Duration;
    use solana_sdk::instruction::AccountMeta;

    fn validator() -> FeeValidator {
        FeeValidator::new(Config::default().fees)
    }

    fn quote(valid_until: DateTime<Utc>) -> BridgeQuote {
        BridgeQuote {
            provider: "relaybridge".to_string(),
            quote_id: "q1".to_string(),
            source_amount: "1000000".to_string(),
            destination_amount: "995000".to_string(),
            estimated_seconds: 60,
            valid_until,
            route: "sol->eth".to_string(),
            costs: CostBreakdown::new(5_000, 10_000, 0, None, None),
            provider_data: serde_json::Value::Null,
        }
    }

    fn minimum(price: f64, costs: &CostBreakdown, buffer: f64) -> MinimumFee {
        use crate::fees::calculator::FeeCalculator;
        let calc = FeeCalculator::new(
            crate::test_utils::oracle_with_price(price),
            Config::default().fees,
        );
        calc.minimum_fee_at_price(costs, buffer, price)
    }

    #[test]
    fn test_all_violations_collected() {
        let v = validator();
        let now = Utc::now();
        let costs = CostBreakdown::new(5_000, 10_000, 0, None, None);
        let min = minimum(150.0, &costs, 0.15);

        // Expired quote AND an undersized fee: both must be reported
        let fee = UserFee {
            token: crate::types::FeeToken::Usdc,
            amount: 0,
            value_usd: 0.0,
        };
        let violations = v.validate_economics(
            &fee,
            &costs,
            &quote(now - Duration::seconds(10)),
            &min,
            150.0,
            now,
        );
        assert!(violations.len() >= 3, "got: {:?}", violations);
    }

    #[test]
    fn test_valid_fee_passes() {
        let v = validator();
        let now = Utc::now();
        let costs = CostBreakdown::new(5_000, 10_000, 0, None, None);
        let min = minimum(150.0, &costs, 0.15);

        let fee = min.in_token(crate::types::FeeToken::Usdc);
        let violations = v.validate_economics(
            &fee,
            &costs,
            &quote(now + Duration::seconds(60)),
            &min,
            150.0,
            now,
        );
        assert!(violations.is_empty(), "unexpected: {:?}", violations);
    }

    #[test]
    fn test_sponsor_cost_ceiling() {
        let v = validator();
        let now = Utc::now();
        let costs = CostBreakdown::new(200_000_000, 0, 0, None, None);
        let min = minimum(150.0, &costs, 0.15);
        let fee = min.in_token(crate::types::FeeToken::Usdc);

        let violations = v.validate_economics(
            &fee,
            &costs,
            &quote(now + Duration::seconds(60)),
            &min,
            150.0,
            now,
        );
        assert!(violations.iter().any(|m| m.contains("ceiling")));
    }

    #[test]
    fn test_balance_deficit_is_exact() {
        let v = validator();
        let err = v.check_balance(1_000_000, 750_000).unwrap_err();
        match err {
            SwapError::InsufficientBalance { deficit, .. } => assert_eq!(deficit, 250_000),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(v.check_balance(1_000, 1_000).is_ok());
    }

    #[test]
    fn test_fund_leak_guard() {
        let v = validator();
        assert!(v.assert_no_fund_leak(1.0, 0.5).is_ok());
        assert!(v.assert_no_fund_leak(1.0, 1.0).is_ok());
        let err = v.assert_no_fund_leak(0.4, 0.5).unwrap_err();
        assert_eq!(err.code(), "transaction_validation");
    }

    #[test]
    fn test_single_instruction_always_fails_shape() {
        let v = validator();
        // Regardless of program id, one instruction is never a valid shape
        let ix = solana_sdk::system_instruction::transfer(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            1,
        );
        let report = v.validate_shape(&[ix]);
        assert!(!report.is_valid());

        let report = v.validate_shape(&[]);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_non_fee_first_instruction_rejected() {
        let v = validator();
        let opaque = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[9, 9, 9],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        );
        let fee_ix = solana_sdk::system_instruction::transfer(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            1,
        );
        let report = v.validate_shape(&[opaque.clone(), fee_ix.clone()]);
        assert!(!report.is_valid());

        let report = v.validate_shape(&[fee_ix, opaque]);
        assert!(report.is_valid());
    }

    #[test]
    fn test_duplicate_instructions_warn_only() {
        let v = validator();
        let user = Pubkey::new_unique();
        let sponsor = Pubkey::new_unique();
        let fee_ix = solana_sdk::system_instruction::transfer(&user, &sponsor, 100);
        let report = v.validate_shape(&[fee_ix.clone(), fee_ix]);
        assert!(report.is_valid());
        assert!(!report.warnings.is_empty());
    }
}
