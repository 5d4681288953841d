//! In-process approval desk.
//!
//! Each request gets a uuid, is announced through the notifier, and waits
//! on a oneshot channel bounded by `tokio::time::timeout`. The dashboard
//! (or any other caller) answers with `resolve(id, approved)`. Expired
//! requests are removed, so a late answer finds nothing and returns false.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ApprovalChannel, ApprovalOutcome, Notification, Notifier, ScalpProposal};
use crate::clock::Clock;

/// A request still waiting for an answer.
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub id: String,
    pub proposal: ScalpProposal,
    pub requested_at: NaiveDateTime,
    pub timeout_secs: u64,
}

struct Entry {
    info: PendingApproval,
    reply: oneshot::Sender<bool>,
}

pub struct ApprovalDesk {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<String, Entry>>,
}

impl ApprovalDesk {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            notifier,
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of outstanding requests, oldest first.
    pub fn pending(&self) -> Vec<PendingApproval> {
        let pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<PendingApproval> = pending.values().map(|e| e.info.clone()).collect();
        out.sort_by_key(|p| p.requested_at);
        out
    }

    /// Answer a request. Returns false if the id is unknown or expired.
    pub fn resolve(&self, id: &str, approved: bool) -> bool {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);

        match entry {
            Some(entry) => {
                info!(id, approved, code = %entry.info.proposal.instrument_code, "Approval answered");
                entry.reply.send(approved).is_ok()
            }
            None => {
                warn!(id, "Approval answer for unknown or expired request");
                false
            }
        }
    }

    fn remove(&self, id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);
    }
}

#[async_trait]
impl ApprovalChannel for ApprovalDesk {
    async fn request_approval(&self, proposal: &ScalpProposal, timeout: Duration) -> ApprovalOutcome {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        let info = PendingApproval {
            id: id.clone(),
            proposal: proposal.clone(),
            requested_at: self.clock.now(),
            timeout_secs: timeout.as_secs(),
        };
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.clone(), Entry { info, reply: tx });

        info!(id = %id, code = %proposal.instrument_code, qty = proposal.quantity, "Approval requested");
        self.notifier
            .notify(Notification::ApprovalRequested {
                id: id.clone(),
                proposal: proposal.clone(),
                timeout,
            })
            .await;

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(true)) => ApprovalOutcome::Approved,
            Ok(Ok(false)) => ApprovalOutcome::Rejected,
            // Sender dropped without an answer.
            Ok(Err(_)) => ApprovalOutcome::Rejected,
            Err(_) => ApprovalOutcome::TimedOut,
        };

        self.remove(&id);
        info!(id = %id, outcome = ?outcome, "Approval settled");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::LogNotifier;
    use rust_decimal_macros::dec;

    fn proposal() -> ScalpProposal {
        ScalpProposal {
            instrument_code: "123450".into(),
            display_name: "Alpha".into(),
            quantity: 10,
            price: dec!(10000),
            change_rate: dec!(10),
            volume: 200_000,
        }
    }

    fn desk() -> Arc<ApprovalDesk> {
        Arc::new(ApprovalDesk::new(
            Arc::new(LogNotifier),
            Arc::new(FixedClock::at("2026-03-02 10:00:00")),
        ))
    }

    async fn wait_for_pending(desk: &ApprovalDesk) -> String {
        for _ in 0..200 {
            if let Some(p) = desk.pending().into_iter().next() {
                return p.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request never registered");
    }

    #[tokio::test]
    async fn test_approve() {
        let desk = desk();
        let d = desk.clone();
        let handle = tokio::spawn(async move {
            d.request_approval(&proposal(), Duration::from_secs(5)).await
        });

        let id = wait_for_pending(&desk).await;
        let pending = desk.pending();
        assert_eq!(pending[0].requested_at.to_string(), "2026-03-02 10:00:00");
        assert_eq!(pending[0].timeout_secs, 5);
        assert!(desk.resolve(&id, true));
        assert_eq!(handle.await.unwrap(), ApprovalOutcome::Approved);
        assert!(desk.pending().is_empty());
    }

    #[tokio::test]
    async fn test_reject() {
        let desk = desk();
        let d = desk.clone();
        let handle = tokio::spawn(async move {
            d.request_approval(&proposal(), Duration::from_secs(5)).await
        });

        let id = wait_for_pending(&desk).await;
        assert!(desk.resolve(&id, false));
        assert_eq!(handle.await.unwrap(), ApprovalOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry() {
        let desk = desk();
        let outcome = desk
            .request_approval(&proposal(), Duration::from_millis(30))
            .await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert!(desk.pending().is_empty());
    }

    #[tokio::test]
    async fn test_late_answer_is_refused() {
        let desk = desk();
        let d = desk.clone();
        let handle = tokio::spawn(async move {
            d.request_approval(&proposal(), Duration::from_millis(50)).await
        });
        let id = wait_for_pending(&desk).await;
        assert_eq!(handle.await.unwrap(), ApprovalOutcome::TimedOut);
        assert!(!desk.resolve(&id, true));
    }

    #[test]
    fn test_unknown_id() {
        assert!(!desk().resolve("nope", true));
    }
}
