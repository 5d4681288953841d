//! Shared types for the auto-trader.
//!
//! These types form the data model used across all modules. Broker,
//! strategy and engine modules depend on them without depending on
//! each other.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Trading context: live capital or the brokerage's simulated venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Real,
    Paper,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Real => "real",
            Mode::Paper => "paper",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "real" | "live" => Ok(Mode::Real),
            "paper" | "fake" | "sim" => Ok(Mode::Paper),
            _ => Err(anyhow::anyhow!("Unknown trading mode: {s}")),
        }
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade decisions
// ---------------------------------------------------------------------------

/// A buy/sell recommendation produced by the analysis collaborator.
/// Consumed exactly once by execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub action: OrderSide,
    pub instrument_code: String,
    pub display_name: String,
    pub quantity: u64,
    /// Zero means a market order.
    pub limit_price: Decimal,
    /// Human-readable justification, carried through to notifications.
    pub rationale: String,
    /// Recommendation strength, 1..=10.
    pub confidence: u8,
}

impl fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let price = if self.is_market_order() {
            "market".to_string()
        } else {
            format!("{}", self.limit_price)
        };
        write!(
            f,
            "{} {} ({}) x{} @ {} | conf={}/10",
            self.action,
            self.display_name,
            self.instrument_code,
            self.quantity,
            price,
            self.confidence,
        )
    }
}

impl TradeDecision {
    pub fn is_market_order(&self) -> bool {
        self.limit_price.is_zero()
    }

    /// Confidence clamped to the valid 1..=10 band.
    pub fn clamped_confidence(&self) -> u8 {
        self.confidence.clamp(1, 10)
    }
}

// ---------------------------------------------------------------------------
// Brokerage views
// ---------------------------------------------------------------------------

/// Domestic quote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub change_amount: Decimal,
    /// Percent change versus previous close.
    pub change_rate: Decimal,
}

/// Foreign (overseas exchange) quote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignQuote {
    pub price: Decimal,
}

/// One holding in the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: String,
    pub name: String,
    pub quantity: u64,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    /// Percent.
    pub pnl_rate: Decimal,
    pub pnl_amount: Decimal,
}

impl fmt::Display for Holding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) x{} avg={} now={} pnl={:+}%",
            self.name, self.code, self.quantity, self.average_cost, self.current_price, self.pnl_rate,
        )
    }
}

/// Account balance: cash, valuation and holdings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub cash_available: Decimal,
    pub total_valuation: Decimal,
    pub holdings: Vec<Holding>,
}

impl Balance {
    pub fn holding(&self, code: &str) -> Option<&Holding> {
        self.holdings.iter().find(|h| h.code == code)
    }
}

/// Receipt for an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
}

/// One row of the "ranked by percentage gain" snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedInstrument {
    pub code: String,
    pub name: String,
    /// Percent.
    pub change_rate: Decimal,
    pub volume: u64,
    pub price: Decimal,
}

// ---------------------------------------------------------------------------
// Scalp positions
// ---------------------------------------------------------------------------

/// A same-day momentum lot opened by an approved scalp buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalpPosition {
    pub instrument_code: String,
    pub display_name: String,
    pub quantity: u64,
    pub entry_price: Decimal,
    pub entry_time: NaiveDateTime,
}

impl fmt::Display for ScalpPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) x{} @ {} [{}]",
            self.display_name,
            self.instrument_code,
            self.quantity,
            self.entry_price,
            self.entry_time.format("%H:%M:%S"),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure taxonomy for brokerage-facing operations.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    /// Transport failure or non-2xx response.
    #[error("Upstream error ({endpoint}): {message}")]
    Upstream { endpoint: String, message: String },

    /// 2xx response whose payload reports a business-level failure.
    #[error("Brokerage error [{code}]: {message}")]
    Brokerage { code: String, message: String },

    /// The brokerage refused an order. Terminal for that attempt.
    #[error("Order rejected ({instrument}): {message}")]
    OrderRejected { instrument: String, message: String },

    /// Detected locally before calling the brokerage.
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TraderError {
    pub fn upstream(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        TraderError::Upstream {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
