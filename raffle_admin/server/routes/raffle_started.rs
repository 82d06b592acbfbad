use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use raffle_admin_logic::error::AdminError;
use raffle_admin_logic::notification::RoundStarted;
use serde_json::json;

/// POST /api/admin/raffle-started
///
/// Checks the Telegram settings before looking at the body.
pub async fn raffle_started(
    State(state): State<SharedState>,
    body: Result<Json<RoundStarted>, JsonRejection>,
) -> ApiResult {
    let notifier = state.ensure_notifier()?;
    let Json(input) = body?;

    match notifier.send_round_started(&input).await {
        Ok(()) => Ok(Json(json!({ "ok": true }))),
        Err(AdminError::NotificationFailed(status)) => Err(ApiError::with_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "Failed to send Telegram message", "status": status }),
        )),
        Err(e) => Err(e.into()),
    }
}
