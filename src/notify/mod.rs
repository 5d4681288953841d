//! Operator-facing notifications and approvals.
//!
//! Two ports:
//! - `Notifier` — fire-and-forget messages (start, trade results, reports,
//!   errors). Delivery problems are the adapter's to log; callers never see
//!   them.
//! - `ApprovalChannel` — request/response with a hard timeout, used only by
//!   the scalp engine before it buys.

pub mod approval;
pub mod webhook;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::engine::accountant::DailyReport;
use crate::types::{Mode, ScalpPosition, TradeDecision};

pub use approval::ApprovalDesk;
pub use webhook::WebhookNotifier;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A scalp entry waiting for the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalpProposal {
    pub instrument_code: String,
    pub display_name: String,
    pub quantity: u64,
    pub price: Decimal,
    /// Percent.
    pub change_rate: Decimal,
    pub volume: u64,
}

impl ScalpProposal {
    /// Cash the buy needs at the proposal price.
    pub fn cost(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Why a scan stopped before asking for approval.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalpAbort {
    InsufficientBalance { cash: Decimal, needed: Decimal },
    AmountTooSmall { amount: Decimal, price: Decimal },
    BalanceUnavailable(String),
}

#[derive(Debug, Clone)]
pub enum Notification {
    SystemStart {
        mode: Mode,
        at: NaiveDateTime,
    },
    TradeResult {
        decision: TradeDecision,
        /// Order id on success, error text on failure.
        result: Result<String, String>,
    },
    ApprovalRequested {
        id: String,
        proposal: ScalpProposal,
        timeout: Duration,
    },
    ScalpFilled {
        position: ScalpPosition,
        order_id: String,
    },
    ScalpFailed {
        proposal: ScalpProposal,
        reason: String,
    },
    ScalpRejected {
        proposal: ScalpProposal,
    },
    ScalpExpired {
        proposal: ScalpProposal,
    },
    ScalpAborted {
        instrument_code: String,
        display_name: String,
        reason: ScalpAbort,
    },
    /// One per liquidated position.
    Liquidation {
        position: ScalpPosition,
        /// Order id on success, error text on failure.
        result: Result<String, String>,
    },
    DailyReport(DailyReport),
    Error {
        context: String,
        message: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::SystemStart { .. } => "system_start",
            Notification::TradeResult { .. } => "trade_result",
            Notification::ApprovalRequested { .. } => "approval_requested",
            Notification::ScalpFilled { .. } => "scalp_filled",
            Notification::ScalpFailed { .. } => "scalp_failed",
            Notification::ScalpRejected { .. } => "scalp_rejected",
            Notification::ScalpExpired { .. } => "scalp_expired",
            Notification::ScalpAborted { .. } => "scalp_aborted",
            Notification::Liquidation { .. } => "liquidation",
            Notification::DailyReport(_) => "daily_report",
            Notification::Error { .. } => "error",
        }
    }

    /// Plain-text rendering for chat webhooks.
    pub fn render(&self) -> String {
        match self {
            Notification::SystemStart { mode, at } => format!(
                "🔔 **Auto-trader started** ({})\nMode: {mode}",
                at.format("%Y-%m-%d %H:%M")
            ),
            Notification::TradeResult { decision, result } => {
                let (emoji, status) = match result {
                    Ok(id) => ("✅", format!("order {id}")),
                    Err(e) => ("❌", format!("failed: {e}")),
                };
                let price = if decision.is_market_order() {
                    "market".to_string()
                } else {
                    decision.limit_price.to_string()
                };
                format!(
                    "{emoji} **{} {}** ({})\nQty: {} @ {price}\nConfidence: {}/10\nReason: {}\nResult: {status}",
                    decision.action,
                    decision.display_name,
                    decision.instrument_code,
                    decision.quantity,
                    decision.confidence,
                    decision.rationale,
                )
            }
            Notification::ApprovalRequested { id, proposal, timeout } => format!(
                "🚀 **Scalp candidate** {} ({})\nRate: {:+}% | Volume: {}\nBuy {} @ {} (≈{})\nApprove within {}s: `{id}`",
                proposal.display_name,
                proposal.instrument_code,
                proposal.change_rate,
                proposal.volume,
                proposal.quantity,
                proposal.price,
                proposal.cost(),
                timeout.as_secs(),
            ),
            Notification::ScalpFilled { position, order_id } => format!(
                "✅ **Scalp buy filled** {}\nOrder: {order_id}",
                position
            ),
            Notification::ScalpFailed { proposal, reason } => format!(
                "❌ **Scalp buy failed** {} ({}) x{}\n{reason}",
                proposal.display_name, proposal.instrument_code, proposal.quantity
            ),
            Notification::ScalpRejected { proposal } => format!(
                "🚫 **Scalp rejected** {} ({})",
                proposal.display_name, proposal.instrument_code
            ),
            Notification::ScalpExpired { proposal } => format!(
                "⌛ **Scalp approval expired** {} ({})",
                proposal.display_name, proposal.instrument_code
            ),
            Notification::ScalpAborted {
                instrument_code,
                display_name,
                reason,
            } => {
                let why = match reason {
                    ScalpAbort::InsufficientBalance { cash, needed } => {
                        format!("insufficient balance: cash {cash} < {needed}")
                    }
                    ScalpAbort::AmountTooSmall { amount, price } => {
                        format!("amount too small: {amount} buys no shares at {price}")
                    }
                    ScalpAbort::BalanceUnavailable(e) => format!("balance lookup failed: {e}"),
                };
                format!("⚠️ **Scalp skipped** {display_name} ({instrument_code})\n{why}")
            }
            Notification::Liquidation { position, result } => match result {
                Ok(id) => format!(
                    "🏁 **Scalp closed** {} ({}) x{}\nSell order: {id}",
                    position.display_name, position.instrument_code, position.quantity
                ),
                Err(e) => format!(
                    "⚠️ **Scalp close failed** {} ({}) x{}\n{e}",
                    position.display_name, position.instrument_code, position.quantity
                ),
            },
            Notification::DailyReport(report) => report.render(),
            Notification::Error { context, message } => {
                format!("⚠️ **Error** ({context})\n```{message}```")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Never fails from the caller's point of view.
    async fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    TimedOut,
}

#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Ask the operator and wait at most `timeout` for an answer.
    async fn request_approval(&self, proposal: &ScalpProposal, timeout: Duration) -> ApprovalOutcome;
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        info!(kind = notification.kind(), text = %notification.render(), "Notification");
    }
}
