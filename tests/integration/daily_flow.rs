//! Daily job end to end against the mock brokerage.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autotrader::analysis::{AnalysisContext, NoContext, TradeAnalyst};
use autotrader::clock::FixedClock;
use autotrader::config::RiskConfig;
use autotrader::engine::daily::DailyJob;
use autotrader::notify::Notification;
use autotrader::strategy::{size_order, SkipReason};
use autotrader::types::{Holding, OrderSide, TradeDecision};

use crate::mock_broker::{MockBroker, RecordingNotifier};

/// Returns fixed decision lists.
struct FixedAnalyst {
    sells: Vec<TradeDecision>,
    buys: Vec<TradeDecision>,
}

#[async_trait]
impl TradeAnalyst for FixedAnalyst {
    async fn sell_decisions(&self, _ctx: &AnalysisContext) -> anyhow::Result<Vec<TradeDecision>> {
        Ok(self.sells.clone())
    }

    async fn buy_decisions(&self, _ctx: &AnalysisContext) -> anyhow::Result<Vec<TradeDecision>> {
        Ok(self.buys.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn decision(action: OrderSide, code: &str, confidence: u8, limit_price: Decimal) -> TradeDecision {
    TradeDecision {
        action,
        instrument_code: code.into(),
        display_name: format!("Stock {code}"),
        quantity: 0,
        limit_price,
        rationale: format!("{code}: earnings beat, guidance raised"),
        confidence,
    }
}

fn holding(code: &str, quantity: u64, pnl_amount: Decimal) -> Holding {
    Holding {
        code: code.into(),
        name: format!("Stock {code}"),
        quantity,
        average_cost: dec!(10000),
        current_price: dec!(10000),
        pnl_rate: Decimal::ZERO,
        pnl_amount,
    }
}

fn job(
    broker: Arc<MockBroker>,
    analyst: FixedAnalyst,
    notifier: Arc<RecordingNotifier>,
    halted: Arc<AtomicBool>,
) -> DailyJob {
    DailyJob::new(
        broker,
        Arc::new(NoContext),
        Arc::new(analyst),
        notifier,
        Arc::new(FixedClock::at("2026-03-02 08:30:00")),
        RiskConfig::default(),
        halted,
    )
}

#[test]
fn test_max_confidence_sizes_to_max_amount() {
    assert_eq!(
        size_order(10, dec!(100000), dec!(5000000), dec!(1000000)),
        dec!(5000000)
    );
}

#[tokio::test]
async fn test_daily_run_executes_and_reports_with_rationale() {
    let broker = Arc::new(
        MockBroker::new(dec!(10000000)).with_holdings(vec![
            holding("005930", 30, dec!(120000)),
            holding("035420", 5, dec!(-20000)),
        ]),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let analyst = FixedAnalyst {
        // More than held: capped at 30.
        sells: vec![decision(OrderSide::Sell, "005930", 8, Decimal::ZERO)]
            .into_iter()
            .map(|mut d| {
                d.quantity = 50;
                d
            })
            .collect(),
        buys: vec![
            decision(OrderSide::Buy, "000660", 9, dec!(125000)),
            decision(OrderSide::Buy, "051910", 1, Decimal::ZERO),
        ],
    };

    let summary = job(broker.clone(), analyst, notifier.clone(), Arc::new(AtomicBool::new(false)))
        .run()
        .await
        .unwrap();

    let orders = broker.orders();
    assert_eq!(orders.len(), 3);
    assert_eq!((orders[0].side, orders[0].code.as_str(), orders[0].quantity), (OrderSide::Sell, "005930", 30));
    // 5,000,000 / 125,000 at the limit price.
    assert_eq!((orders[1].code.as_str(), orders[1].quantity, orders[1].limit_price), ("000660", 40, dec!(125000)));
    // 100,000 / 10,000 quote for the market order.
    assert_eq!((orders[2].code.as_str(), orders[2].quantity), ("051910", 10));

    let sent = notifier.all();
    assert_eq!(sent.len(), 4);
    for n in &sent[..3] {
        match n {
            Notification::TradeResult { decision, result } => {
                assert!(decision.rationale.contains("earnings beat"));
                assert!(result.is_ok());
                assert!(n.render().contains("guidance raised"));
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }
    match &sent[3] {
        Notification::DailyReport(report) => {
            assert_eq!(report.pnl, dec!(100000));
            assert_eq!(report.holdings.len(), 2);
        }
        other => panic!("unexpected notification {other:?}"),
    }
    assert_eq!(summary.report.pnl, dec!(100000));
}

#[tokio::test]
async fn test_rejection_is_reported_not_retried() {
    let broker = Arc::new(MockBroker::new(dec!(10000000)));
    broker.reject_orders_for("000660");
    let notifier = Arc::new(RecordingNotifier::default());
    let analyst = FixedAnalyst {
        sells: Vec::new(),
        buys: vec![decision(OrderSide::Buy, "000660", 6, dec!(100000))],
    };

    let summary = job(broker.clone(), analyst, notifier.clone(), Arc::new(AtomicBool::new(false)))
        .run()
        .await
        .unwrap();

    assert_eq!(broker.orders().len(), 1);
    assert_eq!(summary.buys.failed.len(), 1);
    match &notifier.all()[0] {
        Notification::TradeResult { result, .. } => {
            assert!(result.as_ref().unwrap_err().contains("orderable cash"));
        }
        other => panic!("unexpected notification {other:?}"),
    }
}

#[tokio::test]
async fn test_buy_list_truncated_to_daily_limit() {
    let broker = Arc::new(MockBroker::new(dec!(10000000)));
    let notifier = Arc::new(RecordingNotifier::default());
    let buys = ["000001", "000002", "000003", "000004"]
        .iter()
        .map(|c| decision(OrderSide::Buy, c, 5, dec!(10000)))
        .collect();
    let analyst = FixedAnalyst {
        sells: Vec::new(),
        buys,
    };

    let summary = job(broker.clone(), analyst, notifier, Arc::new(AtomicBool::new(false)))
        .run()
        .await
        .unwrap();

    let codes: Vec<_> = broker.orders().into_iter().map(|o| o.code).collect();
    assert_eq!(codes, vec!["000001", "000002", "000003"]);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].reason, SkipReason::DailyLimit);
    assert_eq!(summary.skipped[0].decision.instrument_code, "000004");
}

#[tokio::test]
async fn test_halt_flag_skips_every_order() {
    let broker = Arc::new(MockBroker::new(dec!(10000000)).with_holdings(vec![holding("005930", 30, Decimal::ZERO)]));
    let notifier = Arc::new(RecordingNotifier::default());
    let halted = Arc::new(AtomicBool::new(false));
    halted.store(true, Ordering::SeqCst);
    let analyst = FixedAnalyst {
        sells: vec![decision(OrderSide::Sell, "005930", 8, Decimal::ZERO)],
        buys: vec![decision(OrderSide::Buy, "000660", 9, Decimal::ZERO)],
    };

    let summary = job(broker.clone(), analyst, notifier.clone(), halted).run().await.unwrap();

    assert!(broker.orders().is_empty());
    assert_eq!(summary.sells.halted.len(), 1);
    assert_eq!(summary.buys.halted.len(), 1);
    assert_eq!(notifier.kinds(), vec!["daily_report"]);
}

#[tokio::test]
async fn test_balance_outage_aborts_with_one_error() {
    let broker = Arc::new(MockBroker::new(dec!(10000000)));
    broker.fail_balance("connection reset");
    let notifier = Arc::new(RecordingNotifier::default());
    let analyst = FixedAnalyst {
        sells: Vec::new(),
        buys: vec![decision(OrderSide::Buy, "000660", 9, dec!(10000))],
    };

    let result = job(broker.clone(), analyst, notifier.clone(), Arc::new(AtomicBool::new(false)))
        .run()
        .await;

    assert!(result.is_err());
    assert!(broker.orders().is_empty());
    assert_eq!(notifier.kinds(), vec!["error"]);
}
