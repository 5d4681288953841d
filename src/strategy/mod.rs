//! Strategy — turns analysis decisions into sized, executable orders.

pub mod sizing;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::broker::Brokerage;
use crate::config::RiskConfig;
use crate::types::{Balance, OrderSide, TradeDecision};
pub use sizing::{shares_for, size_order};

// ---------------------------------------------------------------------------
// Plan log
// ---------------------------------------------------------------------------

/// Why a decision did not make it into the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Beyond the per-day buy limit.
    DailyLimit,
    /// The sized amount does not cover one share.
    AmountTooSmall { amount: Decimal, price: Decimal },
    /// A market buy with no usable reference price.
    NoReferencePrice(String),
    /// Sell for an instrument the account doesn't hold.
    NotHeld,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DailyLimit => write!(f, "daily position limit reached"),
            SkipReason::AmountTooSmall { amount, price } => {
                write!(f, "amount {amount} does not cover one share at {price}")
            }
            SkipReason::NoReferencePrice(e) => write!(f, "no reference price: {e}"),
            SkipReason::NotHeld => write!(f, "not held"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Skipped {
    pub decision: TradeDecision,
    pub reason: SkipReason,
}

/// Orders ready for the executor plus everything that was passed on.
#[derive(Debug, Clone, Default)]
pub struct OrderPlan {
    pub orders: Vec<TradeDecision>,
    pub skipped: Vec<Skipped>,
}

impl OrderPlan {
    fn skip(&mut self, decision: TradeDecision, reason: SkipReason) {
        info!(code = %decision.instrument_code, reason = %reason, "Decision skipped");
        self.skipped.push(Skipped { decision, reason });
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Applies the static risk bounds to raw decisions.
pub struct OrderPlanner {
    risk: RiskConfig,
}

impl OrderPlanner {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    /// Cash amount for a decision, confidence clamped to 1..=10.
    pub fn amount_for(&self, decision: &TradeDecision) -> Decimal {
        size_order(
            decision.clamped_confidence(),
            self.risk.min_order_amount,
            self.risk.max_order_amount,
            self.risk.default_order_amount,
        )
    }

    /// Size buy decisions.
    ///
    /// Keeps the first `max_positions_per_day` decisions. Limit orders are
    /// sized against their limit price; market orders against a fresh quote.
    pub async fn plan_buys(
        &self,
        broker: &dyn Brokerage,
        decisions: Vec<TradeDecision>,
    ) -> OrderPlan {
        let mut plan = OrderPlan::default();
        let limit = self.risk.max_positions_per_day;

        let mut seen = 0;

        for mut decision in decisions {
            if decision.action != OrderSide::Buy {
                warn!(code = %decision.instrument_code, "Non-buy decision in buy batch ignored");
                continue;
            }
            seen += 1;
            if seen > limit {
                plan.skip(decision, SkipReason::DailyLimit);
                continue;
            }

            let price = if decision.is_market_order() {
                match broker.get_quote(&decision.instrument_code).await {
                    Ok(q) if q.price > Decimal::ZERO => q.price,
                    Ok(_) => {
                        plan.skip(decision, SkipReason::NoReferencePrice("zero quote".into()));
                        continue;
                    }
                    Err(e) => {
                        plan.skip(decision, SkipReason::NoReferencePrice(e.to_string()));
                        continue;
                    }
                }
            } else {
                decision.limit_price
            };

            let amount = self.amount_for(&decision);
            let quantity = shares_for(amount, price);
            if quantity == 0 {
                plan.skip(decision, SkipReason::AmountTooSmall { amount, price });
                continue;
            }

            debug!(
                code = %decision.instrument_code,
                confidence = decision.confidence,
                amount = %amount,
                price = %price,
                quantity,
                "Buy sized"
            );
            decision.quantity = quantity;
            plan.orders.push(decision);
        }

        plan
    }

    /// Cap sell quantities at what the account holds. A zero quantity
    /// means the whole holding.
    pub fn plan_sells(&self, balance: &Balance, decisions: Vec<TradeDecision>) -> OrderPlan {
        let mut plan = OrderPlan::default();

        for mut decision in decisions {
            if decision.action != OrderSide::Sell {
                warn!(code = %decision.instrument_code, "Non-sell decision in sell batch ignored");
                continue;
            }
            let held = balance
                .holding(&decision.instrument_code)
                .map(|h| h.quantity)
                .unwrap_or(0);
            if held == 0 {
                plan.skip(decision, SkipReason::NotHeld);
                continue;
            }

            decision.quantity = match decision.quantity {
                0 => held,
                q => q.min(held),
            };
            plan.orders.push(decision);
        }

        plan
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
