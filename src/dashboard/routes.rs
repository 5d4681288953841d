//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::engine::accountant::DailyReport;
use crate::engine::positions::PositionBook;
use crate::notify::approval::PendingApproval;
use crate::notify::ApprovalDesk;
use crate::types::{Mode, ScalpPosition};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub mode: Mode,
    pub started_at: NaiveDateTime,
    pub halted: Arc<AtomicBool>,
    pub book: Arc<PositionBook>,
    pub approvals: Arc<ApprovalDesk>,
    pub last_report: RwLock<Option<DailyReport>>,
    control_token: Option<SecretString>,
}

impl DashboardState {
    pub fn new(
        mode: Mode,
        started_at: NaiveDateTime,
        halted: Arc<AtomicBool>,
        book: Arc<PositionBook>,
        approvals: Arc<ApprovalDesk>,
    ) -> Self {
        Self {
            mode,
            started_at,
            halted,
            book,
            approvals,
            last_report: RwLock::new(None),
            control_token: None,
        }
    }

    /// Token the state-changing routes require. `None` locks them.
    pub fn with_control_token(mut self, token: Option<String>) -> Self {
        self.control_token = token.map(SecretString::new);
        self
    }

    fn accepts(&self, presented: &str) -> bool {
        self.control_token
            .as_ref()
            .is_some_and(|t| t.expose_secret().as_str() == presented)
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub mode: Mode,
    pub halted: bool,
    pub open_positions: usize,
    pub pending_approvals: usize,
    pub started_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalAnswer {
    pub id: String,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HaltResponse {
    pub halted: bool,
}

// ---------------------------------------------------------------------------
// Control gate
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// Header carrying the shared control token.
pub const CONTROL_TOKEN_HEADER: &str = "x-autotrader-token";

/// Rejects approval and halt requests without the configured token.
pub async fn require_control_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(CONTROL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(token) if state.accepts(token) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Blocked dashboard control request without a valid token");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        mode: state.mode,
        halted: state.halted.load(Ordering::SeqCst),
        open_positions: state.book.len().await,
        pending_approvals: state.approvals.pending().len(),
        started_at: state.started_at,
    })
}

/// GET /api/positions
pub async fn get_positions(State(state): State<AppState>) -> Json<Vec<ScalpPosition>> {
    Json(state.book.snapshot().await)
}

/// GET /api/approvals
pub async fn get_approvals(State(state): State<AppState>) -> Json<Vec<PendingApproval>> {
    Json(state.approvals.pending())
}

/// POST /api/approvals/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApprovalAnswer>, StatusCode> {
    answer(&state, id, true)
}

/// POST /api/approvals/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApprovalAnswer>, StatusCode> {
    answer(&state, id, false)
}

fn answer(state: &DashboardState, id: String, approved: bool) -> Result<Json<ApprovalAnswer>, StatusCode> {
    if state.approvals.resolve(&id, approved) {
        Ok(Json(ApprovalAnswer { id, approved }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// POST /api/trading/halt
pub async fn halt(State(state): State<AppState>) -> Json<HaltResponse> {
    state.halted.store(true, Ordering::SeqCst);
    info!("Trading halted from dashboard");
    Json(HaltResponse { halted: true })
}

/// POST /api/trading/resume
pub async fn resume(State(state): State<AppState>) -> Json<HaltResponse> {
    state.halted.store(false, Ordering::SeqCst);
    info!("Trading resumed from dashboard");
    Json(HaltResponse { halted: false })
}

/// GET /api/report
pub async fn get_report(State(state): State<AppState>) -> Result<Json<DailyReport>, StatusCode> {
    state
        .last_report
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::notify::LogNotifier;
    use crate::storage::PositionStore;

    fn state() -> AppState {
        let dir = std::env::temp_dir().join(format!("autotrader_routes_{}", uuid::Uuid::new_v4()));
        Arc::new(DashboardState::new(
            Mode::Paper,
            NaiveDateTime::parse_from_str("2026-03-02 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PositionBook::empty(PositionStore::new(&dir))),
            Arc::new(ApprovalDesk::new(
                Arc::new(LogNotifier),
                Arc::new(FixedClock::at("2026-03-02 08:00:00")),
            )),
        ))
    }

    #[tokio::test]
    async fn test_get_status_handler() {
        let Json(resp) = get_status(State(state())).await;
        assert_eq!(resp.mode, Mode::Paper);
        assert!(!resp.halted);
        assert_eq!(resp.open_positions, 0);
        assert_eq!(resp.pending_approvals, 0);
    }

    #[tokio::test]
    async fn test_halt_and_resume_flip_flag() {
        let s = state();
        let Json(r) = halt(State(s.clone())).await;
        assert!(r.halted);
        assert!(s.halted.load(Ordering::SeqCst));
        let Json(r) = resume(State(s.clone())).await;
        assert!(!r.halted);
        assert!(!s.halted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unknown_approval_is_not_found() {
        let err = approve(State(state()), Path("nope".into())).await.unwrap_err();
        assert_eq!(err, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_token_comparison() {
        let dir = std::env::temp_dir().join(format!("autotrader_routes_{}", uuid::Uuid::new_v4()));
        let locked = DashboardState::new(
            Mode::Paper,
            NaiveDateTime::parse_from_str("2026-03-02 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PositionBook::empty(PositionStore::new(&dir))),
            Arc::new(ApprovalDesk::new(
                Arc::new(LogNotifier),
                Arc::new(FixedClock::at("2026-03-02 08:00:00")),
            )),
        );
        assert!(!locked.accepts(""));

        let open = locked.with_control_token(Some("abc".into()));
        assert!(open.accepts("abc"));
        assert!(!open.accepts("abd"));
    }

    #[tokio::test]
    async fn test_report_empty_before_first_run() {
        let err = get_report(State(state())).await.unwrap_err();
        assert_eq!(err, StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_status_response_serializes() {
        let resp = StatusResponse {
            mode: Mode::Real,
            halted: true,
            open_positions: 2,
            pending_approvals: 1,
            started_at: NaiveDateTime::parse_from_str("2026-03-02 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"halted\":true"));
        assert!(json.contains("\"open_positions\":2"));
    }
}
