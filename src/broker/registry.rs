//! Process-wide registry of live session clients.
//!
//! At most one `KisClient` exists per `(mode, account number)`, so at most
//! one token lifecycle runs per key. Repeated lookups return the same `Arc`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use super::kis::KisClient;
use super::transport::HttpTransport;
use crate::accounts::{masked, AccountProfile, AccountRegistry};
use crate::clock::Clock;
use crate::types::{Mode, TraderError};

pub struct SessionRegistry {
    accounts: AccountRegistry,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    data_dir: PathBuf,
    selected_real: RwLock<Option<String>>,
    clients: Mutex<HashMap<(Mode, String), Arc<KisClient>>>,
}

impl SessionRegistry {
    pub fn new(
        accounts: AccountRegistry,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            accounts,
            transport,
            clock,
            data_dir: data_dir.into(),
            selected_real: RwLock::new(None),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.accounts
    }

    /// Client for `mode`. For real mode an explicit account number wins,
    /// then the selected default, then the first discovered profile.
    pub fn client(
        &self,
        mode: Mode,
        account_number: Option<&str>,
    ) -> Result<Arc<KisClient>, TraderError> {
        let profile = match mode {
            Mode::Paper => self
                .accounts
                .paper()
                .ok_or_else(|| TraderError::AccountNotFound("paper profile not configured".into()))?,
            Mode::Real => {
                let wanted = account_number
                    .map(str::to_string)
                    .or_else(|| self.selected_real_account());
                match wanted {
                    Some(number) => self
                        .accounts
                        .find_by_number(&number)
                        .filter(|p| p.mode == Mode::Real)
                        .ok_or_else(|| TraderError::AccountNotFound(masked(&number)))?,
                    None => self.accounts.default_real().ok_or_else(|| {
                        TraderError::AccountNotFound("no real profile configured".into())
                    })?,
                }
            }
        };

        Ok(self.client_for(profile))
    }

    /// Get or create the client for a profile.
    pub fn client_for(&self, profile: &AccountProfile) -> Arc<KisClient> {
        let key = (profile.mode, profile.account_number.clone());
        let mut clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        clients
            .entry(key)
            .or_insert_with(|| {
                info!(id = %profile.id, account = %masked(&profile.account_number), "Opening brokerage session");
                Arc::new(KisClient::new(
                    profile.clone(),
                    self.transport.clone(),
                    self.clock.clone(),
                    &self.data_dir,
                ))
            })
            .clone()
    }

    /// Change the default real account. Unknown numbers leave it unchanged.
    pub fn select_real_account(&self, account_number: &str) -> bool {
        if self
            .accounts
            .find_by_number(account_number)
            .filter(|p| p.mode == Mode::Real)
            .is_none()
        {
            warn!(account = %masked(account_number), "Cannot select unknown real account");
            return false;
        }
        *self.selected_real.write().unwrap_or_else(|p| p.into_inner()) =
            Some(account_number.to_string());
        info!(account = %masked(account_number), "Default real account selected");
        true
    }

    pub fn selected_real_account(&self) -> Option<String> {
        self.selected_real
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
