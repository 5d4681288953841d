//! Account registry.
//!
//! Resolves named trading profiles into connection parameters. One paper
//! profile comes from the `fake_account_*` variables; real profiles are
//! discovered from `real01_account_*`, `real02_account_*`, ... and
//! discovery stops at the first gap.

use secrecy::SecretString;
use std::fmt;
use tracing::{debug, info};

use crate::types::Mode;

pub const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
pub const PAPER_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

/// Highest profile number probed during discovery.
const MAX_REAL_PROFILES: u32 = 99;

const DEFAULT_PRODUCT_CODE: &str = "01";

/// One set of brokerage credentials plus an account number.
#[derive(Clone)]
pub struct AccountProfile {
    /// "paper", "real01", "real02", ...
    pub id: String,
    pub mode: Mode,
    pub app_key: String,
    pub app_secret: SecretString,
    pub base_endpoint: String,
    /// First eight digits of the account.
    pub account_number: String,
    /// Two-digit product code.
    pub account_product_code: String,
}

impl fmt::Debug for AccountProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountProfile")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("base_endpoint", &self.base_endpoint)
            .field("account_number", &masked(&self.account_number))
            .finish_non_exhaustive()
    }
}

/// Last four digits only, for logs.
pub fn masked(account_number: &str) -> String {
    let tail: String = account_number
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

/// Immutable set of discovered profiles.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    paper: Option<AccountProfile>,
    real: Vec<AccountProfile>,
}

impl AccountRegistry {
    pub fn new(paper: Option<AccountProfile>, real: Vec<AccountProfile>) -> Self {
        Self { paper, real }
    }

    /// Discover profiles from the process environment.
    pub fn from_env(real_base: &str, paper_base: &str) -> Self {
        Self::discover(|k| std::env::var(k).ok(), real_base, paper_base)
    }

    /// Discover profiles through an arbitrary key lookup.
    pub fn discover<F>(lookup: F, real_base: &str, paper_base: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let paper = read_profile(&lookup, "fake", "paper", Mode::Paper, paper_base);

        let mut real = Vec::new();
        for n in 1..=MAX_REAL_PROFILES {
            let id = format!("real{n:02}");
            match read_profile(&lookup, &id, &id, Mode::Real, real_base) {
                Some(profile) => {
                    debug!(id = %profile.id, account = %masked(&profile.account_number), "Real profile discovered");
                    real.push(profile);
                }
                None => break,
            }
        }

        info!(
            paper = paper.is_some(),
            real = real.len(),
            "Account discovery complete"
        );

        Self { paper, real }
    }

    /// All profiles of a mode. An empty slice is a valid answer.
    pub fn list(&self, mode: Mode) -> &[AccountProfile] {
        match mode {
            Mode::Real => &self.real,
            Mode::Paper => self.paper.as_slice(),
        }
    }

    pub fn paper(&self) -> Option<&AccountProfile> {
        self.paper.as_ref()
    }

    /// First discovered real profile; the implicit default.
    pub fn default_real(&self) -> Option<&AccountProfile> {
        self.real.first()
    }

    pub fn find_by_number(&self, account_number: &str) -> Option<&AccountProfile> {
        self.real
            .iter()
            .chain(self.paper.iter())
            .find(|p| p.account_number == account_number)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&AccountProfile> {
        self.real
            .iter()
            .chain(self.paper.iter())
            .find(|p| p.id == id)
    }
}

/// Read `<prefix>_account_{api_key,api_secret,number,product}`.
/// Key, secret and number are required; the product code defaults to "01".
fn read_profile<F>(
    lookup: &F,
    prefix: &str,
    id: &str,
    mode: Mode,
    base: &str,
) -> Option<AccountProfile>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |field: &str| {
        lookup(&format!("{prefix}_account_{field}")).filter(|v| !v.trim().is_empty())
    };

    let app_key = get("api_key")?;
    let app_secret = get("api_secret")?;
    let account_number = get("number")?;
    let account_product_code = get("product").unwrap_or_else(|| DEFAULT_PRODUCT_CODE.to_string());

    Some(AccountProfile {
        id: id.to_string(),
        mode,
        app_key,
        app_secret: SecretString::new(app_secret),
        base_endpoint: base.trim_end_matches('/').to_string(),
        account_number,
        account_product_code,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
