use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use raffle_admin_logic::error::AdminError;
use raffle_admin_logic::past_raffles::load_past_raffles;
use raffle_admin_logic::types::unix_now;
use serde_json::json;

/// GET /api/admin/past-raffles
pub async fn past_raffles(State(state): State<SharedState>) -> ApiResult {
    let indexer = state.ensure_indexer()?;
    let raffles = load_past_raffles(indexer, state.contract.as_ref(), unix_now())
        .await
        .map_err(|e| match e {
            AdminError::GraphQl(detail) => ApiError::with_body(
                StatusCode::BAD_GATEWAY,
                json!({ "error": "Subgraph error", "detail": detail }),
            ),
            other => other.into(),
        })?;
    Ok(Json(json!({ "raffles": raffles })))
}
