//! Accountant — end-of-run P&L summary.
//!
//! Builds the daily report from a fresh balance: total valuation, summed
//! per-holding P&L, and P&L as a share of valuation.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::info;

use crate::types::{Balance, Mode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingLine {
    pub code: String,
    pub name: String,
    pub quantity: u64,
    /// Percent.
    pub pnl_rate: Decimal,
    pub pnl_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub mode: Mode,
    pub generated_at: NaiveDateTime,
    pub total_valuation: Decimal,
    pub cash_available: Decimal,
    pub pnl: Decimal,
    /// Percent of total valuation, two decimals.
    pub pnl_rate: Decimal,
    pub holdings: Vec<HoldingLine>,
}

impl DailyReport {
    pub fn render(&self) -> String {
        let emoji = if self.pnl >= Decimal::ZERO { "📈" } else { "📉" };
        let mut out = format!(
            "{emoji} **Daily report** ({}, {})\nValuation: {}\nCash: {}\nP&L: {:+} ({:+}%)",
            self.generated_at.format("%Y-%m-%d"),
            self.mode,
            self.total_valuation,
            self.cash_available,
            self.pnl,
            self.pnl_rate,
        );
        if self.holdings.is_empty() {
            out.push_str("\nNo holdings.");
        }
        for h in &self.holdings {
            let _ = write!(out, "\n- {} ({}) x{}: {:+}%", h.name, h.code, h.quantity, h.pnl_rate);
        }
        out
    }
}

pub struct Accountant;

impl Accountant {
    pub fn daily_report(balance: &Balance, mode: Mode, at: NaiveDateTime) -> DailyReport {
        let pnl: Decimal = balance.holdings.iter().map(|h| h.pnl_amount).sum();
        let pnl_rate = if balance.total_valuation > Decimal::ZERO {
            (pnl / balance.total_valuation * dec!(100)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        let report = DailyReport {
            mode,
            generated_at: at,
            total_valuation: balance.total_valuation,
            cash_available: balance.cash_available,
            pnl,
            pnl_rate,
            holdings: balance
                .holdings
                .iter()
                .map(|h| HoldingLine {
                    code: h.code.clone(),
                    name: h.name.clone(),
                    quantity: h.quantity,
                    pnl_rate: h.pnl_rate,
                    pnl_amount: h.pnl_amount,
                })
                .collect(),
        };

        info!(
            valuation = %report.total_valuation,
            pnl = %report.pnl,
            pnl_rate = %report.pnl_rate,
            holdings = report.holdings.len(),
            "Daily report built"
        );
        report
    }
}
