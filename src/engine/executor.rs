//! Trade executor.
//!
//! Places planned orders through a `Brokerage` and reports every result,
//! success or failure, with the decision's rationale attached. Rejections
//! are terminal for the attempt; nothing is retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::broker::Brokerage;
use crate::notify::{Notification, Notifier};
use crate::types::{OrderReceipt, TradeDecision};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub executed: Vec<ExecutedTrade>,
    pub failed: Vec<FailedTrade>,
    /// Decisions not attempted because trading was halted.
    pub halted: Vec<TradeDecision>,
}

#[derive(Debug, Clone)]
pub struct ExecutedTrade {
    pub decision: TradeDecision,
    pub receipt: OrderReceipt,
}

#[derive(Debug, Clone)]
pub struct FailedTrade {
    pub decision: TradeDecision,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    broker: Arc<dyn Brokerage>,
    notifier: Arc<dyn Notifier>,
    halted: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(broker: Arc<dyn Brokerage>, notifier: Arc<dyn Notifier>, halted: Arc<AtomicBool>) -> Self {
        Self {
            broker,
            notifier,
            halted,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Execute orders in sequence. The halt flag is checked before each
    /// order; once set, the rest of the batch is skipped.
    pub async fn execute_batch(&self, orders: &[TradeDecision]) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        if orders.is_empty() {
            return report;
        }

        info!(count = orders.len(), broker = self.broker.name(), "Executing batch");

        for (i, decision) in orders.iter().enumerate() {
            if self.is_halted() {
                info!(skipped = orders.len() - i, "Trading halted, skipping remaining orders");
                report.halted.extend(orders[i..].iter().cloned());
                break;
            }

            match self.execute_one(decision).await {
                Ok(receipt) => report.executed.push(ExecutedTrade {
                    decision: decision.clone(),
                    receipt,
                }),
                Err(reason) => report.failed.push(FailedTrade {
                    decision: decision.clone(),
                    reason,
                }),
            }
        }

        info!(
            executed = report.executed.len(),
            failed = report.failed.len(),
            halted = report.halted.len(),
            "Batch execution complete"
        );
        report
    }

    async fn execute_one(&self, decision: &TradeDecision) -> Result<OrderReceipt, String> {
        info!(decision = %decision, "Placing order");

        let result = self
            .broker
            .place_order(
                decision.action,
                &decision.instrument_code,
                decision.quantity,
                decision.limit_price,
            )
            .await
            .map_err(|e| e.to_string());

        match &result {
            Ok(receipt) => info!(code = %decision.instrument_code, order_id = %receipt.order_id, "Order placed"),
            Err(e) => warn!(code = %decision.instrument_code, error = %e, "Order failed"),
        }

        self.notifier
            .notify(Notification::TradeResult {
                decision: decision.clone(),
                result: result.as_ref().map(|r| r.order_id.clone()).map_err(Clone::clone),
            })
            .await;

        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
