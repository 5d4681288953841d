//! Korea Investment & Securities (KIS) Open API client.
//!
//! One `KisClient` owns the session for one account profile. Every call goes
//! through `access_token()`, which reuses the cached token while it is still
//! in the future and otherwise performs exactly one credential exchange,
//! persists the result, and only then hands the token out.
//!
//! Base URLs:
//! - real:  https://openapi.koreainvestment.com:9443
//! - paper: https://openapivts.koreainvestment.com:29443
//!
//! Headers: `authorization: {token_type} {token}`, `appkey`, `appsecret`,
//! `tr_id`, `custtype: P`. Paper sessions use the `V...` operation-id
//! namespace for trading calls (`TTTC0802U` → `VTTC0802U`).

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use rust_decimal::prelude::*;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::transport::{ApiRequest, HttpMethod, HttpTransport};
use super::{BrokerResult, Brokerage};
use crate::accounts::{masked, AccountProfile};
use crate::clock::Clock;
use crate::storage::{TokenRecord, TokenStore, EXPIRES_AT_FORMAT};
use crate::types::{
    Balance, ForeignQuote, Holding, Mode, OrderReceipt, OrderSide, Quote, RankedInstrument,
    TraderError,
};

// ---------------------------------------------------------------------------
// Endpoints and operation ids
// ---------------------------------------------------------------------------

const TOKEN_PATH: &str = "/oauth2/tokenP";
const BALANCE_PATH: &str = "/uapi/domestic-stock/v1/trading/inquire-balance";
const QUOTE_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-price";
const FOREIGN_QUOTE_PATH: &str = "/uapi/overseas-price/v1/quotations/price";
const ORDER_PATH: &str = "/uapi/domestic-stock/v1/trading/order-cash";
const FOREIGN_ORDER_PATH: &str = "/uapi/overseas-stock/v1/trading/order";
const RANKING_PATH: &str = "/uapi/domestic-stock/v1/ranking/fluctuation";

const TR_BALANCE: &str = "TTTC8434R";
const TR_QUOTE: &str = "FHKST01010100";
const TR_FOREIGN_QUOTE: &str = "HHDFS00000300";
const TR_BUY: &str = "TTTC0802U";
const TR_SELL: &str = "TTTC0801U";
const TR_FOREIGN_BUY: &str = "TTTT1002U";
const TR_FOREIGN_SELL: &str = "TTTT1006U";
const TR_RANKING: &str = "FHPST01700000";

/// Token expiry as reported by the credential exchange.
const ISSUED_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Used when the exchange reports neither expiry field.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 86_400;

const ORD_DVSN_LIMIT: &str = "00";
const ORD_DVSN_MARKET: &str = "01";

/// Rewrite a trading operation id into the paper namespace.
pub fn operation_id(mode: Mode, tr_id: &str) -> String {
    match mode {
        Mode::Real => tr_id.to_string(),
        Mode::Paper => match tr_id.chars().next() {
            Some('T' | 'J' | 'C') => format!("V{}", &tr_id[1..]),
            _ => tr_id.to_string(),
        },
    }
}

fn order_division(limit_price: Decimal) -> &'static str {
    if limit_price.is_zero() {
        ORD_DVSN_MARKET
    } else {
        ORD_DVSN_LIMIT
    }
}

// ---------------------------------------------------------------------------
// KIS API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    access_token_token_expired: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteOutput {
    stck_prpr: String,
    prdy_vrss: String,
    prdy_ctrt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForeignQuoteOutput {
    last: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HoldingRow {
    pdno: String,
    prdt_name: String,
    hldg_qty: String,
    pchs_avg_pric: String,
    prpr: String,
    evlu_pfls_rt: String,
    evlu_pfls_amt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BalanceSummary {
    dnca_tot_amt: String,
    tot_evlu_amt: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrderOutput {
    #[serde(rename = "ODNO")]
    odno: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RankingRow {
    stck_shrn_iscd: String,
    hts_kor_isnm: String,
    prdy_ctrt: String,
    acml_vol: String,
    stck_prpr: String,
}

/// KIS sends every number as a string; blanks and junk read as zero.
fn num(s: &str) -> Decimal {
    Decimal::from_str(s.trim()).unwrap_or(Decimal::ZERO)
}

fn count(s: &str) -> u64 {
    num(s).trunc().to_u64().unwrap_or(0)
}

/// Decode `data[key]`. A missing or mistyped payload is an upstream fault,
/// never a zero-filled default.
fn output<T: serde::de::DeserializeOwned>(data: &Value, key: &str, path: &str) -> BrokerResult<T> {
    let value = data
        .get(key)
        .cloned()
        .ok_or_else(|| TraderError::upstream(path, format!("response has no `{key}`")))?;
    serde_json::from_value(value)
        .map_err(|e| TraderError::upstream(path, format!("malformed `{key}`: {e}")))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    token_type: String,
    expires_at: NaiveDateTime,
}

impl Session {
    fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at > now
    }

    fn from_record(record: &TokenRecord) -> Option<Self> {
        Some(Self {
            access_token: record.access_token.clone(),
            token_type: record.token_type.clone(),
            expires_at: record.expires_at()?,
        })
    }

    fn to_record(&self) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at.format(EXPIRES_AT_FORMAT).to_string(),
        }
    }

    fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Session manager for one account profile.
pub struct KisClient {
    profile: AccountProfile,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    store: TokenStore,
    session: Mutex<Option<Session>>,
}

impl KisClient {
    /// Build a client, adopting a persisted token if it is still valid.
    /// Performs no network I/O.
    pub fn new(
        profile: AccountProfile,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        data_dir: &Path,
    ) -> Self {
        let store = TokenStore::new(data_dir, profile.mode, &profile.id);
        let now = clock.now();

        let session = store
            .load()
            .and_then(|record| Session::from_record(&record))
            .filter(|s| s.is_valid_at(now));

        match &session {
            Some(s) => info!(
                account = %masked(&profile.account_number),
                mode = %profile.mode,
                expires_at = %s.expires_at,
                "Reusing persisted KIS token"
            ),
            None => debug!(
                account = %masked(&profile.account_number),
                mode = %profile.mode,
                "No reusable KIS token on disk"
            ),
        }

        Self {
            profile,
            transport,
            clock,
            store,
            session: Mutex::new(session),
        }
    }

    pub fn account_number(&self) -> &str {
        &self.profile.account_number
    }

    // -- Authentication ----------------------------------------------------

    /// Current session, issuing a new token if none is valid.
    ///
    /// The lock is held across the exchange so concurrent callers on the
    /// same profile wait for a single issuance.
    async fn access_token(&self) -> BrokerResult<Session> {
        let mut guard = self.session.lock().await;
        let now = self.clock.now();

        if let Some(session) = guard.as_ref() {
            if session.is_valid_at(now) {
                return Ok(session.clone());
            }
            info!(account = %masked(self.account_number()), "KIS token expired, refreshing");
        }

        let session = self.issue_token(now).await?;
        self.store
            .save(&session.to_record())
            .map_err(|e| TraderError::Storage(format!("{e:#}")))?;
        *guard = Some(session.clone());

        info!(
            account = %masked(self.account_number()),
            mode = %self.profile.mode,
            expires_at = %session.expires_at,
            "KIS token issued"
        );
        Ok(session)
    }

    async fn issue_token(&self, now: NaiveDateTime) -> BrokerResult<Session> {
        let mut request = ApiRequest::new(HttpMethod::Post, self.url(TOKEN_PATH));
        request
            .headers
            .push(("content-type".into(), "application/json".into()));
        request.body = Some(json!({
            "grant_type": "client_credentials",
            "appkey": self.profile.app_key,
            "appsecret": self.profile.app_secret.expose_secret(),
        }));

        let data = self.transport.send(request).await?;
        let resp: TokenResponse = serde_json::from_value(data)
            .map_err(|e| TraderError::upstream(TOKEN_PATH, format!("malformed token response: {e}")))?;

        let expires_at = resp
            .access_token_token_expired
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s.trim(), ISSUED_EXPIRY_FORMAT).ok())
            .unwrap_or_else(|| {
                now + Duration::seconds(resp.expires_in.unwrap_or(FALLBACK_TOKEN_LIFETIME_SECS))
            });

        Ok(Session {
            access_token: resp.access_token,
            token_type: resp.token_type,
            expires_at,
        })
    }

    // -- API helpers -------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.profile.base_endpoint, path)
    }

    fn account_fields(&self) -> [(&'static str, String); 2] {
        [
            ("CANO", self.profile.account_number.clone()),
            ("ACNT_PRDT_CD", self.profile.account_product_code.clone()),
        ]
    }

    /// Issue an authenticated call and check the payload's `rt_cd`.
    async fn call(
        &self,
        method: HttpMethod,
        path: &str,
        tr_id: &str,
        query: Vec<(&str, String)>,
        body: Option<Value>,
    ) -> BrokerResult<Value> {
        let session = self.access_token().await?;
        let tr_id = operation_id(self.profile.mode, tr_id);

        let mut request = ApiRequest::new(method, self.url(path));
        request.headers = vec![
            ("content-type".into(), "application/json; charset=utf-8".into()),
            ("authorization".into(), session.authorization()),
            ("appkey".into(), self.profile.app_key.clone()),
            ("appsecret".into(), self.profile.app_secret.expose_secret().clone()),
            ("tr_id".into(), tr_id.clone()),
            ("custtype".into(), "P".into()),
        ];
        request.query = query.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        request.body = body;

        debug!(path, tr_id = %tr_id, "KIS call");
        let data = self.transport.send(request).await?;
        check_result(&data)?;
        Ok(data)
    }

    /// Like `call`, but a business-level refusal becomes `OrderRejected`.
    async fn order_call(
        &self,
        path: &str,
        tr_id: &str,
        instrument: &str,
        body: Value,
    ) -> BrokerResult<OrderReceipt> {
        let data = match self.call(HttpMethod::Post, path, tr_id, Vec::new(), Some(body)).await {
            Ok(data) => data,
            Err(TraderError::Brokerage { code, message }) => {
                warn!(instrument, code = %code, message = %message, "KIS order rejected");
                return Err(TraderError::OrderRejected {
                    instrument: instrument.to_string(),
                    message,
                });
            }
            Err(e) => return Err(e),
        };

        let out: OrderOutput = output(&data, "output", path)?;
        if out.odno.trim().is_empty() {
            return Err(TraderError::upstream(path, "order accepted without an order number"));
        }
        info!(instrument, order_id = %out.odno, "KIS order accepted");
        Ok(OrderReceipt { order_id: out.odno })
    }
}

/// `rt_cd == "0"` is success; anything else carries `msg1`.
fn check_result(data: &Value) -> BrokerResult<()> {
    let code = data.get("rt_cd").and_then(Value::as_str).unwrap_or("");
    if code == "0" {
        return Ok(());
    }
    let message = data
        .get("msg1")
        .and_then(Value::as_str)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string());
    Err(TraderError::Brokerage {
        code: code.to_string(),
        message,
    })
}

// ---------------------------------------------------------------------------
// Brokerage trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Brokerage for KisClient {
    async fn get_quote(&self, instrument_code: &str) -> BrokerResult<Quote> {
        let data = self
            .call(
                HttpMethod::Get,
                QUOTE_PATH,
                TR_QUOTE,
                vec![
                    ("FID_COND_MRKT_DIV_CODE", "J".into()),
                    ("FID_INPUT_ISCD", instrument_code.into()),
                ],
                None,
            )
            .await?;

        let out: QuoteOutput = output(&data, "output", QUOTE_PATH)?;
        Ok(Quote {
            price: num(&out.stck_prpr),
            change_amount: num(&out.prdy_vrss),
            change_rate: num(&out.prdy_ctrt),
        })
    }

    async fn get_foreign_quote(&self, exchange_code: &str, symbol: &str) -> BrokerResult<ForeignQuote> {
        let data = self
            .call(
                HttpMethod::Get,
                FOREIGN_QUOTE_PATH,
                TR_FOREIGN_QUOTE,
                vec![
                    ("AUTH", String::new()),
                    ("EXCD", exchange_code.into()),
                    ("SYMB", symbol.into()),
                ],
                None,
            )
            .await?;

        let out: ForeignQuoteOutput = output(&data, "output", FOREIGN_QUOTE_PATH)?;
        Ok(ForeignQuote {
            price: num(&out.last),
        })
    }

    async fn get_balance(&self) -> BrokerResult<Balance> {
        let mut query: Vec<(&str, String)> = self.account_fields().into();
        query.extend([
            ("AFHR_FLPR_YN", "N".to_string()),
            ("OFL_YN", String::new()),
            ("INQR_DVSN", "02".into()),
            ("UNPR_DVSN", "01".into()),
            ("FUND_STTL_ICLD_YN", "N".into()),
            ("FNCG_AMT_AUTO_RDPT_YN", "N".into()),
            ("PRCS_DVSN", "00".into()),
            ("CTX_AREA_FK100", String::new()),
            ("CTX_AREA_NK100", String::new()),
        ]);

        let data = self
            .call(HttpMethod::Get, BALANCE_PATH, TR_BALANCE, query, None)
            .await?;
        let rows: Vec<HoldingRow> = output(&data, "output1", BALANCE_PATH)?;
        let summary = output::<Vec<BalanceSummary>>(&data, "output2", BALANCE_PATH)?
            .into_iter()
            .next()
            .ok_or_else(|| TraderError::upstream(BALANCE_PATH, "empty balance summary"))?;

        let holdings = rows
            .into_iter()
            .map(|row| Holding {
                quantity: count(&row.hldg_qty),
                average_cost: num(&row.pchs_avg_pric),
                current_price: num(&row.prpr),
                pnl_rate: num(&row.evlu_pfls_rt),
                pnl_amount: num(&row.evlu_pfls_amt),
                code: row.pdno,
                name: row.prdt_name,
            })
            .filter(|h| h.quantity > 0)
            .collect();

        Ok(Balance {
            cash_available: num(&summary.dnca_tot_amt),
            total_valuation: num(&summary.tot_evlu_amt),
            holdings,
        })
    }

    async fn place_order(
        &self,
        side: OrderSide,
        instrument_code: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt> {
        let tr_id = match side {
            OrderSide::Buy => TR_BUY,
            OrderSide::Sell => TR_SELL,
        };
        let [(_, cano), (_, product)] = self.account_fields();
        let body = json!({
            "CANO": cano,
            "ACNT_PRDT_CD": product,
            "PDNO": instrument_code,
            "ORD_DVSN": order_division(limit_price),
            "ORD_QTY": quantity.to_string(),
            "ORD_UNPR": limit_price.trunc().to_string(),
        });

        info!(%side, instrument = instrument_code, quantity, limit = %limit_price, "Placing KIS order");
        self.order_call(ORDER_PATH, tr_id, instrument_code, body).await
    }

    async fn place_foreign_order(
        &self,
        side: OrderSide,
        exchange_code: &str,
        symbol: &str,
        quantity: u64,
        limit_price: Decimal,
    ) -> BrokerResult<OrderReceipt> {
        let tr_id = match side {
            OrderSide::Buy => TR_FOREIGN_BUY,
            OrderSide::Sell => TR_FOREIGN_SELL,
        };
        let [(_, cano), (_, product)] = self.account_fields();
        let body = json!({
            "CANO": cano,
            "ACNT_PRDT_CD": product,
            "OVRS_EXCG_CD": exchange_code,
            "PDNO": symbol,
            "ORD_QTY": quantity.to_string(),
            "OVRS_ORD_UNPR": limit_price.normalize().to_string(),
            "ORD_SVR_DVSN_CD": "0",
            "ORD_DVSN": order_division(limit_price),
        });

        info!(%side, exchange = exchange_code, symbol, quantity, limit = %limit_price, "Placing KIS foreign order");
        self.order_call(FOREIGN_ORDER_PATH, tr_id, symbol, body).await
    }

    async fn get_rising_ranked(&self) -> BrokerResult<Vec<RankedInstrument>> {
        let query = vec![
            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
            ("FID_COND_SCR_DIV_CODE", "20170".into()),
            ("FID_INPUT_ISCD", "0000".into()),
            ("FID_RANK_SORT_CLS_CODE", "0".into()),
            ("FID_INPUT_CNT_1", "0".into()),
            ("FID_PRC_CLS_CODE", "0".into()),
            ("FID_INPUT_PRICE_1", String::new()),
            ("FID_INPUT_PRICE_2", String::new()),
            ("FID_VOL_CNT", String::new()),
            ("FID_TRGT_CLS_CODE", "0".into()),
            ("FID_TRGT_EXLS_CLS_CODE", "0".into()),
            ("FID_DIV_CLS_CODE", "0".into()),
            ("FID_RSFL_RATE1", String::new()),
            ("FID_RSFL_RATE2", String::new()),
        ];

        let data = self
            .call(HttpMethod::Get, RANKING_PATH, TR_RANKING, query, None)
            .await?;
        let rows: Vec<RankingRow> = output(&data, "output", RANKING_PATH)?;

        Ok(rows
            .into_iter()
            .map(|row| RankedInstrument {
                change_rate: num(&row.prdy_ctrt),
                volume: count(&row.acml_vol),
                price: num(&row.stck_prpr),
                code: row.stck_shrn_iscd,
                name: row.hts_kor_isnm,
            })
            .collect())
    }

    fn mode(&self) -> Mode {
        self.profile.mode
    }

    fn name(&self) -> &str {
        &self.profile.id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
