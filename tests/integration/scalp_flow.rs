//! Scalp cycle end to end: scan → approval → buy → persist → liquidate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;

use autotrader::clock::{Clock, FixedClock};
use autotrader::config::{RiskConfig, ScalpConfig};
use autotrader::engine::positions::PositionBook;
use autotrader::engine::scalper::{ScalpEngine, ScalpExecution, ScalpSettings, ScanOutcome};
use autotrader::notify::{ApprovalOutcome, Notification, ScalpAbort};
use autotrader::storage::PositionStore;
use autotrader::types::{OrderSide, ScalpPosition};

use crate::mock_broker::{ranked, temp_dir, MockBroker, RecordingNotifier, ScriptedApprovals};

struct Harness {
    engine: Arc<ScalpEngine>,
    broker: Arc<MockBroker>,
    notifier: Arc<RecordingNotifier>,
    approvals: Arc<ScriptedApprovals>,
    clock: Arc<FixedClock>,
}

fn harness(broker: MockBroker, answers: &[ApprovalOutcome], dir: &Path) -> Harness {
    let clock = Arc::new(FixedClock::at("2026-03-02 10:00:00"));
    let book = PositionBook::restore(PositionStore::new(dir), clock.today());
    harness_with_book(broker, answers, book, clock)
}

fn harness_with_book(
    broker: MockBroker,
    answers: &[ApprovalOutcome],
    book: PositionBook,
    clock: Arc<FixedClock>,
) -> Harness {
    let broker = Arc::new(broker);
    let notifier = Arc::new(RecordingNotifier::default());
    let approvals = Arc::new(ScriptedApprovals::answering(answers));
    let engine = Arc::new(ScalpEngine::new(
        broker.clone(),
        Arc::new(book),
        notifier.clone(),
        approvals.clone(),
        clock.clone(),
        ScalpSettings::from_config(&ScalpConfig::default(), &RiskConfig::default()),
    ));
    Harness {
        engine,
        broker,
        notifier,
        approvals,
        clock,
    }
}

fn candidate_broker(cash: Decimal) -> MockBroker {
    MockBroker::new(cash).with_ranked(vec![ranked("123450", 10, 200_000, 10_000)])
}

#[tokio::test]
async fn test_candidate_requests_approval_with_sized_quantity() {
    let dir = temp_dir("scenario_b");
    let h = harness(candidate_broker(dec!(500000)), &[ApprovalOutcome::Rejected], &dir);

    let (outcome, handle) = h.engine.scan_and_dispatch().await.unwrap();
    let ScanOutcome::AwaitingApproval(proposal) = outcome else {
        panic!("expected a proposal, got {outcome:?}");
    };
    assert_eq!(proposal.instrument_code, "123450");
    assert_eq!(proposal.quantity, 10);
    assert_eq!(proposal.price, dec!(10000));
    assert_eq!(proposal.change_rate, dec!(10));

    assert_eq!(handle.unwrap().await.unwrap(), ScalpExecution::Rejected);
    assert_eq!(h.approvals.seen(), vec![proposal]);
    assert!(h.broker.orders().is_empty());
}

#[tokio::test]
async fn test_insufficient_cash_aborts_before_approval() {
    let dir = temp_dir("scenario_c");
    let h = harness(candidate_broker(dec!(50000)), &[], &dir);

    let outcome = h.engine.scan().await.unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::InsufficientFunds {
            cash: dec!(50000),
            needed: dec!(100000)
        }
    );
    assert!(h.approvals.seen().is_empty());
    assert!(h.engine.book().is_empty().await);

    let sent = h.notifier.all();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        Notification::ScalpAborted { instrument_code, reason, .. } => {
            assert_eq!(instrument_code, "123450");
            assert_eq!(
                *reason,
                ScalpAbort::InsufficientBalance {
                    cash: dec!(50000),
                    needed: dec!(100000)
                }
            );
        }
        other => panic!("unexpected notification {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_order_leaves_book_unchanged() {
    let dir = temp_dir("scenario_d");
    let h = harness(candidate_broker(dec!(500000)), &[ApprovalOutcome::Approved], &dir);
    h.broker.reject_orders_for("123450");

    let (_, handle) = h.engine.scan_and_dispatch().await.unwrap();
    let exec = handle.unwrap().await.unwrap();

    assert!(matches!(exec, ScalpExecution::Failed(ref msg) if msg.contains("orderable cash")));
    assert!(h.engine.book().is_empty().await);
    assert_eq!(h.notifier.kinds(), vec!["scalp_failed"]);
    assert_eq!(h.broker.orders().len(), 1);
    assert!(PositionStore::new(&dir).load_for(h.clock.today()).is_empty());
}

#[tokio::test]
async fn test_timeout_creates_no_position() {
    let dir = temp_dir("timeout");
    let h = harness(candidate_broker(dec!(500000)), &[ApprovalOutcome::TimedOut], &dir);

    let (_, handle) = h.engine.scan_and_dispatch().await.unwrap();
    assert_eq!(handle.unwrap().await.unwrap(), ScalpExecution::TimedOut);
    assert!(h.engine.book().is_empty().await);
    assert!(h.broker.orders().is_empty());
    assert_eq!(h.notifier.kinds(), vec!["scalp_expired"]);
}

#[tokio::test]
async fn test_held_instrument_is_never_proposed_again() {
    let dir = temp_dir("idempotent");
    let broker = MockBroker::new(dec!(1000000)).with_ranked(vec![
        ranked("123450", 10, 200_000, 10_000),
        ranked("678900", 7, 150_000, 5_000),
    ]);
    let h = harness(broker, &[ApprovalOutcome::Approved, ApprovalOutcome::Approved], &dir);

    let (_, handle) = h.engine.scan_and_dispatch().await.unwrap();
    assert!(matches!(handle.unwrap().await.unwrap(), ScalpExecution::Filled(_)));

    h.clock.advance(chrono::Duration::minutes(10));
    let (outcome, handle) = h.engine.scan_and_dispatch().await.unwrap();
    match outcome {
        ScanOutcome::AwaitingApproval(p) => {
            assert_eq!(p.instrument_code, "678900");
            assert_eq!(p.quantity, 20);
        }
        other => panic!("unexpected {other:?}"),
    }
    handle.unwrap().await.unwrap();

    h.clock.advance(chrono::Duration::minutes(10));
    assert_eq!(h.engine.scan().await.unwrap(), ScanOutcome::NoCandidate);
    assert_eq!(h.engine.book().codes().await, vec!["123450", "678900"]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_restart_keeps_only_todays_positions() {
    let dir = temp_dir("restart");
    let yesterday = ScalpPosition {
        instrument_code: "111110".into(),
        display_name: "Old".into(),
        quantity: 5,
        entry_price: dec!(20000),
        entry_time: chrono::NaiveDateTime::parse_from_str("2026-03-01 14:10:00", "%Y-%m-%d %H:%M:%S").unwrap(),
    };
    let today = ScalpPosition {
        instrument_code: "123450".into(),
        display_name: "Alpha".into(),
        quantity: 10,
        entry_price: dec!(10000),
        entry_time: chrono::NaiveDateTime::parse_from_str("2026-03-02 09:20:00", "%Y-%m-%d %H:%M:%S").unwrap(),
    };
    PositionStore::new(&dir).save(&[yesterday, today]).unwrap();

    // Restarted process: the candidate is already held today.
    let h = harness(candidate_broker(dec!(500000)), &[], &dir);
    assert_eq!(h.engine.book().codes().await, vec!["123450"]);
    assert_eq!(h.engine.scan().await.unwrap(), ScanOutcome::NoCandidate);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_liquidation_clears_even_when_a_sell_fails() {
    let dir = temp_dir("liquidate");
    let broker = MockBroker::new(dec!(1000000)).with_ranked(vec![
        ranked("123450", 10, 200_000, 10_000),
        ranked("678900", 7, 150_000, 5_000),
    ]);
    let h = harness(broker, &[ApprovalOutcome::Approved, ApprovalOutcome::Approved], &dir);

    for _ in 0..2 {
        let (_, handle) = h.engine.scan_and_dispatch().await.unwrap();
        handle.unwrap().await.unwrap();
    }
    assert_eq!(h.engine.book().len().await, 2);

    h.broker.reject_orders_for("123450");
    h.clock.set(chrono::NaiveDateTime::parse_from_str("2026-03-02 15:20:00", "%Y-%m-%d %H:%M:%S").unwrap());
    let lines = h.engine.liquidate().await;

    assert_eq!(lines.len(), 2);
    assert!(lines[0].result.is_err());
    assert!(lines[1].result.is_ok());
    assert!(h.engine.book().is_empty().await);
    assert!(PositionStore::new(&dir).load_for(h.clock.today()).is_empty());

    let sells: Vec<_> = h
        .broker
        .orders()
        .into_iter()
        .filter(|o| o.side == OrderSide::Sell)
        .map(|o| (o.code, o.quantity, o.limit_price))
        .collect();
    assert_eq!(
        sells,
        vec![
            ("123450".to_string(), 10, Decimal::ZERO),
            ("678900".to_string(), 20, Decimal::ZERO),
        ]
    );

    let liquidations = h
        .notifier
        .kinds()
        .into_iter()
        .filter(|k| *k == "liquidation")
        .count();
    assert_eq!(liquidations, 2);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_balance_outage_cancels_scan() {
    let dir = temp_dir("balance_outage");
    let h = harness(candidate_broker(dec!(500000)), &[], &dir);
    h.broker.fail_balance("gateway timeout");

    assert_eq!(h.engine.scan().await.unwrap(), ScanOutcome::BalanceUnavailable);
    assert_eq!(h.notifier.kinds(), vec!["scalp_aborted"]);
    assert!(h.approvals.seen().is_empty());
}

#[tokio::test]
async fn test_cash_spent_while_waiting_cancels_buy() {
    let dir = temp_dir("cash_drop");
    let h = harness(candidate_broker(dec!(500000)), &[ApprovalOutcome::Approved], &dir);

    let ScanOutcome::AwaitingApproval(proposal) = h.engine.scan().await.unwrap() else {
        panic!("expected a proposal");
    };
    h.broker.set_cash(dec!(30000));
    let exec = h.engine.decide(proposal).await;

    assert_eq!(
        exec,
        ScalpExecution::InsufficientFunds {
            needed: dec!(100000),
            available: dec!(30000)
        }
    );
    assert!(h.broker.orders().is_empty());
    assert!(h.engine.book().is_empty().await);
}

#[tokio::test]
async fn test_restored_book_is_shared_with_liquidation() {
    let dir = temp_dir("restored_liq");
    let clock = Arc::new(FixedClock::at("2026-03-02 15:20:00"));
    PositionStore::new(&dir)
        .save(&[ScalpPosition {
            instrument_code: "123450".into(),
            display_name: "Alpha".into(),
            quantity: 10,
            entry_price: dec!(10000),
            entry_time: chrono::NaiveDateTime::parse_from_str("2026-03-02 09:20:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        }])
        .unwrap();
    let book = PositionBook::restore(PositionStore::new(&dir), clock.today());
    let h = harness_with_book(MockBroker::new(dec!(0)), &[], book, clock);

    let lines = h.engine.liquidate().await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].result.as_deref(), Ok("0000000002"));
    assert!(PositionStore::new(&dir).load_for(h.clock.today()).is_empty());

    std::fs::remove_dir_all(&dir).unwrap();
}
