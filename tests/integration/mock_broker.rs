//! Mock brokerage for integration testing.
//!
//! A deterministic `Brokerage` with controllable cash, holdings, ranked
//! snapshot and per-instrument rejections. Every order is recorded. Also
//! provides a recording notifier and a scripted approval channel.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use autotrader::broker::{BrokerResult, Brokerage};
use autotrader::notify::{ApprovalChannel, ApprovalOutcome, Notification, Notifier, ScalpProposal};
use autotrader::types::*;

/// One order as the broker saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub side: OrderSide,
    pub code: String,
    pub quantity: u64,
    pub limit_price: Decimal,
}

pub struct MockBroker {
    cash: Mutex<Decimal>,
    holdings: Mutex<Vec<Holding>>,
    ranked: Mutex<Vec<RankedInstrument>>,
    quote: Decimal,
    reject: Mutex<HashSet<String>>,
    balance_error: Mutex<Option<String>>,
    orders: Mutex<Vec<PlacedOrder>>,
    next_id: Mutex<u64>,
}

impl MockBroker {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash: Mutex::new(cash),
            holdings: Mutex::new(Vec::new()),
            ranked: Mutex::new(Vec::new()),
            quote: Decimal::from(10_000),
            reject: Mutex::new(HashSet::new()),
            balance_error: Mutex::new(None),
            orders: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn with_ranked(self, ranked: Vec<RankedInstrument>) -> Self {
        *self.ranked.lock().unwrap() = ranked;
        self
    }

    pub fn with_holdings(self, holdings: Vec<Holding>) -> Self {
        *self.holdings.lock().unwrap() = holdings;
        self
    }

    pub fn set_cash(&self, cash: Decimal) {
        *self.cash.lock().unwrap() = cash;
    }

    /// Every order for `code` gets `rt_cd != 0` from now on.
    pub fn reject_orders_for(&self, code: &str) {
        self.reject.lock().unwrap().insert(code.to_string());
    }

    pub fn fail_balance(&self, msg: &str) {
        *self.balance_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Brokerage for MockBroker {
    async fn get_quote(&self, _code: &str) -> BrokerResult<Quote> {
        Ok(Quote {
            price: self.quote,
            change_amount: Decimal::ZERO,
            change_rate: Decimal::ZERO,
        })
    }

    async fn get_foreign_quote(&self, _exchange: &str, _symbol: &str) -> BrokerResult<ForeignQuote> {
        Ok(ForeignQuote { price: self.quote })
    }

    async fn get_balance(&self) -> BrokerResult<Balance> {
        if let Some(msg) = self.balance_error.lock().unwrap().clone() {
            return Err(TraderError::upstream("inquire-balance", msg));
        }
        let holdings = self.holdings.lock().unwrap().clone();
        let cash = *self.cash.lock().unwrap();
        let valuation = cash
            + holdings
                .iter()
                .map(|h| h.current_price * Decimal::from(h.quantity))
                .sum::<Decimal>();
        Ok(Balance {
            cash_available: cash,
            total_valuation: valuation,
            holdings,
        })
    }

    async fn place_order(
        &self,
        side: OrderSide,
        code: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt> {
        self.orders.lock().unwrap().push(PlacedOrder {
            side,
            code: code.to_string(),
            quantity,
            limit_price,
        });
        if self.reject.lock().unwrap().contains(code) {
            return Err(TraderError::OrderRejected {
                instrument: code.to_string(),
                message: "order amount exceeds orderable cash".into(),
            });
        }
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        Ok(OrderReceipt {
            order_id: format!("{:010}", *id),
        })
    }

    async fn place_foreign_order(
        &self,
        side: OrderSide,
        _exchange: &str,
        symbol: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt> {
        self.place_order(side, symbol, quantity, limit_price).await
    }

    async fn get_rising_ranked(&self) -> BrokerResult<Vec<RankedInstrument>> {
        Ok(self.ranked.lock().unwrap().clone())
    }

    fn mode(&self) -> Mode {
        Mode::Paper
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Notifier / approvals
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|n| n.kind()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// Answers approval requests from a script; `TimedOut` once it runs dry.
/// Records every proposal it was shown.
#[derive(Default)]
pub struct ScriptedApprovals {
    answers: Mutex<VecDeque<ApprovalOutcome>>,
    seen: Mutex<Vec<ScalpProposal>>,
}

impl ScriptedApprovals {
    pub fn answering(answers: &[ApprovalOutcome]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<ScalpProposal> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalChannel for ScriptedApprovals {
    async fn request_approval(&self, proposal: &ScalpProposal, _timeout: Duration) -> ApprovalOutcome {
        self.seen.lock().unwrap().push(proposal.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApprovalOutcome::TimedOut)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn ranked(code: &str, change_rate: i64, volume: u64, price: i64) -> RankedInstrument {
    RankedInstrument {
        code: code.to_string(),
        name: format!("Stock {code}"),
        change_rate: Decimal::from(change_rate),
        volume,
        price: Decimal::from(price),
    }
}

pub fn temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("autotrader_it_{tag}_{}", uuid::Uuid::new_v4()))
}
