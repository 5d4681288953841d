//! Brokerage integration.
//!
//! Defines the `Brokerage` trait consumed by the engine, plus:
//! - `kis` — the authenticated session client (token lifecycle, signed calls)
//! - `transport` — the HTTP port the client sends through
//! - `registry` — at most one live client per (mode, account)

pub mod kis;
pub mod registry;
pub mod transport;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{
    Balance, ForeignQuote, Mode, OrderReceipt, OrderSide, Quote, RankedInstrument, TraderError,
};

pub type BrokerResult<T> = std::result::Result<T, TraderError>;

/// Abstraction over a brokerage account session.
///
/// Failures surface unmodified: transport and non-2xx problems as
/// `TraderError::Upstream`, business-level refusals as
/// `TraderError::Brokerage` (queries) or `TraderError::OrderRejected`
/// (orders). Implementations never retry.
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Domestic quote.
    async fn get_quote(&self, instrument_code: &str) -> BrokerResult<Quote>;

    /// Overseas quote, e.g. exchange "NAS", symbol "AAPL".
    async fn get_foreign_quote(&self, exchange_code: &str, symbol: &str) -> BrokerResult<ForeignQuote>;

    /// Cash, valuation and holdings.
    async fn get_balance(&self) -> BrokerResult<Balance>;

    /// Domestic order. `limit_price == 0` is a market order.
    async fn place_order(
        &self,
        side: OrderSide,
        instrument_code: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt>;

    /// Overseas order. `limit_price == 0` is a market order.
    async fn place_foreign_order(
        &self,
        side: OrderSide,
        exchange_code: &str,
        symbol: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt>;

    /// Instruments ranked by percentage gain, best first.
    async fn get_rising_ranked(&self) -> BrokerResult<Vec<RankedInstrument>>;

    fn mode(&self) -> Mode;

    /// Profile id for logging ("paper", "real01", ...).
    fn name(&self) -> &str;
}
