//! Persistence layer.
//!
//! Two kinds of durable record, both plain JSON:
//! - one session token per (mode, account), so a restart can reuse an
//!   unexpired token;
//! - the set of open scalp positions for today.
//!
//! Every write goes to `<file>.tmp` first and is renamed over the target,
//! so a reader never observes a partially written file.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{Mode, ScalpPosition};

/// Token expiry format inside the token record.
pub const EXPIRES_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Entry time format inside the position record.
pub const TIME_STR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const POSITIONS_FILE: &str = "scalping_state.json";

// ---------------------------------------------------------------------------
// Atomic JSON helpers
// ---------------------------------------------------------------------------

/// Serialize `value` and atomically replace `path` with it.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialise record")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;

    debug!(path = %path.display(), "Record saved");
    Ok(())
}

/// Load a JSON record. Returns `None` if the file doesn't exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Session tokens
// ---------------------------------------------------------------------------

/// On-disk shape of a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub token_type: String,
    /// Local time, `%Y-%m-%dT%H:%M:%S`.
    pub expires_at: String,
}

impl TokenRecord {
    pub fn expires_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.expires_at, EXPIRES_AT_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&self.expires_at, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
    }
}

/// Token file for one `(mode, account)` key.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path, mode: Mode, account_key: &str) -> Self {
        Self {
            path: data_dir.join(format!("kis_token_{mode}_{account_key}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable and corrupt files all read as "no token".
    pub fn load(&self) -> Option<TokenRecord> {
        match load_json::<TokenRecord>(&self.path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token file");
                None
            }
        }
    }

    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        save_json(&self.path, record)
    }
}

// ---------------------------------------------------------------------------
// Scalp positions
// ---------------------------------------------------------------------------

/// On-disk shape of one scalp position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub code: String,
    pub name: String,
    pub quantity: u64,
    pub buy_price: Decimal,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub time_str: String,
}

impl From<&ScalpPosition> for PositionRecord {
    fn from(p: &ScalpPosition) -> Self {
        Self {
            code: p.instrument_code.clone(),
            name: p.display_name.clone(),
            quantity: p.quantity,
            buy_price: p.entry_price,
            time_str: p.entry_time.format(TIME_STR_FORMAT).to_string(),
        }
    }
}

impl PositionRecord {
    pub fn to_position(&self) -> Option<ScalpPosition> {
        let entry_time = NaiveDateTime::parse_from_str(&self.time_str, TIME_STR_FORMAT).ok()?;
        Some(ScalpPosition {
            instrument_code: self.code.clone(),
            display_name: self.name.clone(),
            quantity: self.quantity,
            entry_price: self.buy_price,
            entry_time,
        })
    }
}

/// The scalp position file.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(POSITIONS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load positions entered on `today`. Entries from other days and
    /// entries with unparseable timestamps are dropped.
    pub fn load_for(&self, today: chrono::NaiveDate) -> Vec<ScalpPosition> {
        let records = match load_json::<Vec<PositionRecord>>(&self.path) {
            Ok(Some(records)) => records,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable scalp state");
                return Vec::new();
            }
        };

        let total = records.len();
        let positions: Vec<ScalpPosition> = records
            .iter()
            .filter_map(PositionRecord::to_position)
            .filter(|p| p.entry_time.date() == today)
            .collect();

        info!(
            loaded = positions.len(),
            discarded = total - positions.len(),
            "Scalp state loaded"
        );
        positions
    }

    pub fn save(&self, positions: &[ScalpPosition]) -> Result<()> {
        let records: Vec<PositionRecord> = positions.iter().map(PositionRecord::from).collect();
        save_json(&self.path, &records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
