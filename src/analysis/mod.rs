//! Analysis collaborator ports.
//!
//! Trade recommendations and the market/news context they are built from
//! come from outside the core. The daily job only sees these traits and
//! treats the returned decision lists as opaque.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Balance, RankedInstrument, TradeDecision};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// One index or watchlist level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLevel {
    pub name: String,
    pub value: Decimal,
    /// Percent.
    pub change_rate: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub indices: Vec<IndexLevel>,
    #[serde(default)]
    pub top_gainers: Vec<RankedInstrument>,
    #[serde(default)]
    pub top_losers: Vec<RankedInstrument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Everything the analyst sees in one daily run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub portfolio: Balance,
    pub market: MarketSnapshot,
    pub news: Vec<NewsItem>,
    pub cash_available: Decimal,
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Supplies market and news context. Failures are tolerated by callers.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn market_snapshot(&self) -> Result<MarketSnapshot>;

    async fn news(&self, max_items: usize) -> Result<Vec<NewsItem>>;
}

/// Produces buy and sell recommendations.
#[async_trait]
pub trait TradeAnalyst: Send + Sync {
    /// Sell recommendations for current holdings.
    async fn sell_decisions(&self, ctx: &AnalysisContext) -> Result<Vec<TradeDecision>>;

    /// Buy recommendations given market context and available cash.
    async fn buy_decisions(&self, ctx: &AnalysisContext) -> Result<Vec<TradeDecision>>;

    fn name(&self) -> &str;
}

/// Empty context; used when no feed is wired in.
pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn market_snapshot(&self) -> Result<MarketSnapshot> {
        Ok(MarketSnapshot::default())
    }

    async fn news(&self, _max_items: usize) -> Result<Vec<NewsItem>> {
        Ok(Vec::new())
    }
}

/// Recommends nothing. The daily job still runs its reporting phase.
pub struct HoldAnalyst;

#[async_trait]
impl TradeAnalyst for HoldAnalyst {
    async fn sell_decisions(&self, _ctx: &AnalysisContext) -> Result<Vec<TradeDecision>> {
        Ok(Vec::new())
    }

    async fn buy_decisions(&self, _ctx: &AnalysisContext) -> Result<Vec<TradeDecision>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "hold"
    }
}
