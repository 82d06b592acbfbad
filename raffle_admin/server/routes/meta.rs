use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use log::{error, info};
use raffle_admin_logic::metadata::{MetaStore, RaffleMeta, RaffleMetaInput};
use raffle_admin_logic::types::RoundId;
use serde_json::json;

/// POST /api/admin/raffles/meta
pub async fn upsert_meta(
    State(state): State<SharedState>,
    body: Result<Json<RaffleMetaInput>, JsonRejection>,
) -> ApiResult {
    let Json(input) = body?;
    let meta = input.validate()?;
    let store = state.ensure_meta_store()?;

    if let Err(e) = store.upsert(&meta).await {
        error!("raffle_meta upsert failed for round {}: {e}", meta.round_id);
        return Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "DB error"));
    }
    info!("stored metadata for round {}", meta.round_id);
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/admin/raffles/meta/:id
pub async fn get_meta(
    State(state): State<SharedState>,
    Path(round_id): Path<RoundId>,
) -> ApiResult<RaffleMeta> {
    let store = state.ensure_meta_store()?;
    match store.get(round_id).await? {
        Some(meta) => Ok(Json(meta)),
        None => Err(ApiError::not_found(format!("no metadata for round {round_id}"))),
    }
}
