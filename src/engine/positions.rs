//! Today's open scalp positions.
//!
//! Every mutation is persisted while the lock is held, so a scan's
//! "already bought?" check always agrees with what is on disk and two
//! writers can never interleave.

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::storage::PositionStore;
use crate::types::ScalpPosition;

pub struct PositionBook {
    store: PositionStore,
    positions: Mutex<Vec<ScalpPosition>>,
}

impl PositionBook {
    /// Restore today's positions from disk. Earlier days are dropped.
    pub fn restore(store: PositionStore, today: NaiveDate) -> Self {
        let positions = store.load_for(today);
        Self {
            store,
            positions: Mutex::new(positions),
        }
    }

    pub fn empty(store: PositionStore) -> Self {
        Self {
            store,
            positions: Mutex::new(Vec::new()),
        }
    }

    pub async fn snapshot(&self) -> Vec<ScalpPosition> {
        self.positions.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.positions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.positions
            .lock()
            .await
            .iter()
            .any(|p| p.instrument_code == code)
    }

    /// Codes currently held, for the scanner's skip list.
    pub async fn codes(&self) -> Vec<String> {
        self.positions
            .lock()
            .await
            .iter()
            .map(|p| p.instrument_code.clone())
            .collect()
    }

    /// Append and persist. The position stays in memory even if the write
    /// fails, since the shares were bought either way.
    pub async fn append(&self, position: ScalpPosition) -> Result<()> {
        let mut positions = self.positions.lock().await;
        info!(position = %position, "Scalp position opened");
        positions.push(position);
        self.store.save(&positions)
    }

    /// Remove everything, persist the empty set, and return what was held.
    /// The in-memory set is cleared even if the write fails.
    pub async fn drain(&self) -> Vec<ScalpPosition> {
        let mut positions = self.positions.lock().await;
        let drained = std::mem::take(&mut *positions);
        if let Err(e) = self.store.save(&positions) {
            warn!(error = %e, "Failed to persist cleared scalp state");
        }
        drained
    }
}
