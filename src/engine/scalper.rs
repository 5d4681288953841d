//! Momentum scalping.
//!
//! One scan cycle: window check → ranked candidates → budget check →
//! approval request. The approval wait runs in its own task (`decide`), so
//! the scheduler never blocks on the operator. A position is created only
//! for a buy that was explicitly approved and accepted by the brokerage.
//!
//! Liquidation is separate: it sells every open position at market and
//! always leaves the book empty, whatever the individual sells did.

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::positions::PositionBook;
use super::scanner::{in_window, MomentumFilter};
use crate::broker::Brokerage;
use crate::clock::Clock;
use crate::config::{RiskConfig, ScalpConfig};
use crate::notify::{
    ApprovalChannel, ApprovalOutcome, Notification, Notifier, ScalpAbort, ScalpProposal,
};
use crate::strategy::shares_for;
use crate::types::{OrderSide, ScalpPosition, TraderError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one scan. Everything but `AwaitingApproval` ends the cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Outside the trading window.
    Idle,
    NoCandidate,
    InsufficientFunds { cash: Decimal, needed: Decimal },
    QuantityTooSmall { amount: Decimal, price: Decimal },
    BalanceUnavailable,
    AwaitingApproval(ScalpProposal),
}

/// Result of an approval round for one proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalpExecution {
    Filled(ScalpPosition),
    Rejected,
    TimedOut,
    /// Cash fell below the cost between proposal and approval.
    InsufficientFunds { needed: Decimal, available: Decimal },
    Failed(String),
}

/// Outcome of one liquidation sell.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationLine {
    pub position: ScalpPosition,
    /// Order id, or the error text.
    pub result: Result<String, String>,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScalpSettings {
    pub filter: MomentumFilter,
    pub window_start: chrono::NaiveTime,
    pub window_end: chrono::NaiveTime,
    pub entry_amount: Decimal,
    pub approval_timeout: Duration,
}

impl ScalpSettings {
    pub fn from_config(scalp: &ScalpConfig, risk: &RiskConfig) -> Self {
        Self {
            filter: MomentumFilter::from_config(scalp),
            window_start: scalp.window_start,
            window_end: scalp.window_end,
            entry_amount: risk.scalp_entry_amount,
            approval_timeout: Duration::from_secs(scalp.approval_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ScalpEngine {
    broker: Arc<dyn Brokerage>,
    book: Arc<PositionBook>,
    notifier: Arc<dyn Notifier>,
    approvals: Arc<dyn ApprovalChannel>,
    clock: Arc<dyn Clock>,
    settings: ScalpSettings,
    /// Codes with an approval outstanding.
    in_flight: Mutex<HashSet<String>>,
}

impl ScalpEngine {
    pub fn new(
        broker: Arc<dyn Brokerage>,
        book: Arc<PositionBook>,
        notifier: Arc<dyn Notifier>,
        approvals: Arc<dyn ApprovalChannel>,
        clock: Arc<dyn Clock>,
        settings: ScalpSettings,
    ) -> Self {
        Self {
            broker,
            book,
            notifier,
            approvals,
            clock,
            settings,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn book(&self) -> &Arc<PositionBook> {
        &self.book
    }

    fn is_in_flight(&self, code: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(code)
    }

    fn release(&self, code: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(code);
    }

    async fn abort(&self, code: &str, name: &str, reason: ScalpAbort) {
        self.notifier
            .notify(Notification::ScalpAborted {
                instrument_code: code.to_string(),
                display_name: name.to_string(),
                reason,
            })
            .await;
    }

    // -- Scan --------------------------------------------------------------

    /// Run one scan. Only a failed ranking fetch is an error.
    pub async fn scan(&self) -> Result<ScanOutcome, TraderError> {
        let now = self.clock.now();
        if !in_window(now.time(), self.settings.window_start, self.settings.window_end) {
            debug!(time = %now.time(), "Outside scalp window");
            return Ok(ScanOutcome::Idle);
        }

        let ranked = self.broker.get_rising_ranked().await?;
        let held: HashSet<String> = self.book.codes().await.into_iter().collect();

        let candidate = self
            .settings
            .filter
            .pick(&ranked, |code| held.contains(code) || self.is_in_flight(code))
            .cloned();
        let Some(candidate) = candidate else {
            debug!(ranked = ranked.len(), "No scalp candidate");
            return Ok(ScanOutcome::NoCandidate);
        };

        let needed = self.settings.entry_amount;
        let cash = match self.broker.get_balance().await {
            Ok(balance) => balance.cash_available,
            Err(e) => {
                warn!(code = %candidate.code, error = %e, "Balance lookup failed, scalp cancelled");
                self.abort(&candidate.code, &candidate.name, ScalpAbort::BalanceUnavailable(e.to_string()))
                    .await;
                return Ok(ScanOutcome::BalanceUnavailable);
            }
        };

        if cash < needed {
            warn!(code = %candidate.code, cash = %cash, needed = %needed, "Insufficient balance for scalp");
            self.abort(&candidate.code, &candidate.name, ScalpAbort::InsufficientBalance { cash, needed })
                .await;
            return Ok(ScanOutcome::InsufficientFunds { cash, needed });
        }

        let quantity = shares_for(needed, candidate.price);
        if quantity == 0 {
            warn!(code = %candidate.code, amount = %needed, price = %candidate.price, "Scalp amount too small");
            self.abort(
                &candidate.code,
                &candidate.name,
                ScalpAbort::AmountTooSmall {
                    amount: needed,
                    price: candidate.price,
                },
            )
            .await;
            return Ok(ScanOutcome::QuantityTooSmall {
                amount: needed,
                price: candidate.price,
            });
        }

        let proposal = ScalpProposal {
            instrument_code: candidate.code.clone(),
            display_name: candidate.name.clone(),
            quantity,
            price: candidate.price,
            change_rate: candidate.change_rate,
            volume: candidate.volume,
        };
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(proposal.instrument_code.clone());

        info!(
            code = %proposal.instrument_code,
            name = %proposal.display_name,
            qty = proposal.quantity,
            price = %proposal.price,
            rate = %proposal.change_rate,
            "Scalp candidate found, requesting approval"
        );
        Ok(ScanOutcome::AwaitingApproval(proposal))
    }

    /// Scan, and if a proposal comes out, wait for its approval in a
    /// spawned task. Returns the scan outcome and the task handle.
    pub async fn scan_and_dispatch(
        self: &Arc<Self>,
    ) -> Result<(ScanOutcome, Option<JoinHandle<ScalpExecution>>), TraderError> {
        let outcome = self.scan().await?;
        let handle = match &outcome {
            ScanOutcome::AwaitingApproval(proposal) => {
                let engine = Arc::clone(self);
                let proposal = proposal.clone();
                Some(tokio::spawn(async move { engine.decide(proposal).await }))
            }
            _ => None,
        };
        Ok((outcome, handle))
    }

    // -- Approval ------------------------------------------------------------

    /// Ask for approval and act on the answer.
    pub async fn decide(&self, proposal: ScalpProposal) -> ScalpExecution {
        let outcome = self
            .approvals
            .request_approval(&proposal, self.settings.approval_timeout)
            .await;

        let result = match outcome {
            ApprovalOutcome::Approved => self.execute_approved(&proposal).await,
            ApprovalOutcome::Rejected => {
                info!(code = %proposal.instrument_code, "Scalp rejected by operator");
                self.notifier
                    .notify(Notification::ScalpRejected {
                        proposal: proposal.clone(),
                    })
                    .await;
                ScalpExecution::Rejected
            }
            ApprovalOutcome::TimedOut => {
                info!(code = %proposal.instrument_code, "Scalp approval timed out");
                self.notifier
                    .notify(Notification::ScalpExpired {
                        proposal: proposal.clone(),
                    })
                    .await;
                ScalpExecution::TimedOut
            }
        };

        self.release(&proposal.instrument_code);
        result
    }

    /// Re-check cash, then buy at market and record the position.
    pub async fn execute_approved(&self, proposal: &ScalpProposal) -> ScalpExecution {
        let needed = proposal.cost();

        match self.broker.get_balance().await {
            Ok(balance) if balance.cash_available < needed => {
                let err = TraderError::InsufficientFunds {
                    needed,
                    available: balance.cash_available,
                };
                warn!(code = %proposal.instrument_code, error = %err, "Scalp buy cancelled");
                self.fail(proposal, err.to_string()).await;
                return ScalpExecution::InsufficientFunds {
                    needed,
                    available: balance.cash_available,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(code = %proposal.instrument_code, error = %e, "Balance re-check failed, scalp buy cancelled");
                let reason = format!("balance re-check failed: {e}");
                self.fail(proposal, reason.clone()).await;
                return ScalpExecution::Failed(reason);
            }
        }

        info!(code = %proposal.instrument_code, qty = proposal.quantity, "Executing scalp buy");
        let receipt = match self
            .broker
            .place_order(OrderSide::Buy, &proposal.instrument_code, proposal.quantity, Decimal::ZERO)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(code = %proposal.instrument_code, error = %e, "Scalp buy failed");
                self.fail(proposal, e.to_string()).await;
                return ScalpExecution::Failed(e.to_string());
            }
        };

        let position = ScalpPosition {
            instrument_code: proposal.instrument_code.clone(),
            display_name: proposal.display_name.clone(),
            quantity: proposal.quantity,
            entry_price: proposal.price,
            entry_time: self.clock.now(),
        };
        if let Err(e) = self.book.append(position.clone()).await {
            error!(code = %position.instrument_code, error = %e, "Failed to persist scalp position");
            self.notifier
                .notify(Notification::Error {
                    context: "scalp state".into(),
                    message: format!("{e:#}"),
                })
                .await;
        }

        self.notifier
            .notify(Notification::ScalpFilled {
                position: position.clone(),
                order_id: receipt.order_id,
            })
            .await;
        ScalpExecution::Filled(position)
    }

    async fn fail(&self, proposal: &ScalpProposal, reason: String) {
        self.notifier
            .notify(Notification::ScalpFailed {
                proposal: proposal.clone(),
                reason,
            })
            .await;
    }

    // -- Liquidation ---------------------------------------------------------

    /// Sell every open position at market, report each, and clear the book.
    pub async fn liquidate(&self) -> Vec<LiquidationLine> {
        let positions = self.book.drain().await;
        if positions.is_empty() {
            debug!("No scalp positions to liquidate");
            return Vec::new();
        }

        info!(count = positions.len(), "Liquidating scalp positions");
        let mut lines = Vec::with_capacity(positions.len());

        for position in positions {
            let result = self
                .broker
                .place_order(OrderSide::Sell, &position.instrument_code, position.quantity, Decimal::ZERO)
                .await
                .map(|r| r.order_id)
                .map_err(|e| e.to_string());

            match &result {
                Ok(id) => info!(code = %position.instrument_code, order_id = %id, "Scalp position closed"),
                Err(e) => error!(code = %position.instrument_code, error = %e, "Scalp close failed"),
            }

            self.notifier
                .notify(Notification::Liquidation {
                    position: position.clone(),
                    result: result.clone(),
                })
                .await;
            lines.push(LiquidationLine { position, result });
        }

        lines
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
