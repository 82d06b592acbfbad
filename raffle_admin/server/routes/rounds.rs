use crate::error::ApiResult;
use crate::state::SharedState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use log::{info, warn};
use raffle_admin_logic::create_round::{create_round, plan_round, CreateRoundRequest};
use raffle_admin_logic::evm_contract::RaffleWriter;
use raffle_admin_logic::metadata::{MetaStore, RaffleMetaFields};
use raffle_admin_logic::rounds::{load_admin_rounds, load_drawable_rounds};
use raffle_admin_logic::types::{address_hex, unix_now, RaffleType, RoundId, TxHash};
use raffle_admin_logic::units::parse_units;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Debug, Default)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RandomnessRequest {
    /// overrides the configured fee, in wei
    #[serde(default)]
    pub fee_wei: Option<String>,
}

/// GET /api/admin/rounds
pub async fn admin_rounds(
    State(state): State<SharedState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult {
    let indexer = state.ensure_indexer()?;
    let rounds = state
        .admin_rounds
        .get_or_refresh(query.refresh, || load_admin_rounds(indexer, unix_now()))
        .await?;
    Ok(Json(json!({ "rounds": rounds })))
}

/// GET /api/admin/rounds/drawable
pub async fn drawable_rounds(
    State(state): State<SharedState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult {
    let indexer = state.ensure_indexer()?;
    let rounds = state
        .drawable_rounds
        .get_or_refresh(query.refresh, || {
            load_drawable_rounds(
                indexer,
                state.contract.as_ref(),
                &state.config.threshold,
                unix_now(),
            )
        })
        .await?;
    Ok(Json(json!({ "rounds": rounds })))
}

/// GET /api/admin/rounds/count
pub async fn round_count(State(state): State<SharedState>) -> ApiResult {
    let count = state.ensure_contract()?.round_count().await?;
    Ok(Json(json!({ "count": count })))
}

/// GET /api/admin/prize-nft
pub async fn prize_nft(State(state): State<SharedState>) -> ApiResult {
    let prize_nft = state.ensure_contract()?.prize_nft().await?;
    Ok(Json(json!({ "prizeNft": prize_nft.map(|a| address_hex(&a)) })))
}

/// GET /api/admin/rounds/:id/winners
pub async fn round_winners(
    State(state): State<SharedState>,
    Path(round_id): Path<RoundId>,
) -> ApiResult {
    let winners = state.ensure_contract()?.winners_of_round(round_id).await?;
    let winners: Vec<String> = winners.iter().map(address_hex).collect();
    Ok(Json(json!({ "roundId": round_id, "winners": winners })))
}

/// POST /api/admin/rounds
///
/// Metadata and the announcement only happen once the round id is known,
/// and their failures do not fail the request.
pub async fn create(
    State(state): State<SharedState>,
    body: Result<Json<CreateRoundRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let contract = state.ensure_contract()?;
    state.config.ensure_operator()?;

    let prize_nft = if RaffleType::try_from(request.raffle_type)?.is_physical() {
        contract.prize_nft().await?
    } else {
        None
    };
    let plan = plan_round(&request, prize_nft, state.config.miles_token, unix_now())?;
    let fee = request
        .request_randomness
        .then_some(state.config.randomness_fee);

    let created = create_round(contract, &plan, fee).await?;
    state.invalidate_rounds().await;

    if let Some(round_id) = created.round_id {
        if let Some(fields) = request.meta {
            store_meta(&state, fields, round_id).await;
        }

        let announcement = plan.announcement(round_id);
        let state = state.clone();
        tokio::spawn(async move {
            let Some(notifier) = state.notifier.as_ref() else {
                return;
            };
            if let Err(e) = notifier.send_round_started(&announcement).await {
                warn!("announcement for round {round_id} failed: {e}");
            }
        });
    }

    Ok(Json(json!({ "round": created })))
}

async fn store_meta(
    state: &SharedState,
    fields: RaffleMetaFields,
    round_id: RoundId,
) {
    let result = match (fields.for_round(round_id), state.ensure_meta_store()) {
        (Ok(meta), Ok(store)) => store.upsert(&meta).await,
        (Err(e), _) | (_, Err(e)) => Err(e),
    };
    if let Err(e) = result {
        warn!("metadata for round {round_id} not stored: {e}");
    }
}

/// POST /api/admin/rounds/:id/randomness
pub async fn request_randomness(
    State(state): State<SharedState>,
    Path(round_id): Path<RoundId>,
    body: Option<Json<RandomnessRequest>>,
) -> ApiResult {
    let contract = state.ensure_contract()?;
    let fee = match body.and_then(|Json(b)| b.fee_wei) {
        Some(fee) => parse_units(&fee, 0)?,
        None => state.config.randomness_fee,
    };
    let tx_hash = contract.request_randomness(round_id, fee).await?;
    written(&state, "randomness requested", round_id, tx_hash).await
}

/// POST /api/admin/rounds/:id/draw
pub async fn draw_winner(
    State(state): State<SharedState>,
    Path(round_id): Path<RoundId>,
) -> ApiResult {
    let tx_hash = state.ensure_contract()?.draw_winner(round_id).await?;
    written(&state, "winner drawn", round_id, tx_hash).await
}

/// POST /api/admin/rounds/:id/close
pub async fn close_raffle(
    State(state): State<SharedState>,
    Path(round_id): Path<RoundId>,
) -> ApiResult {
    let tx_hash = state.ensure_contract()?.close_raffle(round_id).await?;
    written(&state, "round closed", round_id, tx_hash).await
}

async fn written(
    state: &SharedState,
    what: &str,
    round_id: RoundId,
    tx_hash: TxHash,
) -> ApiResult {
    info!("round {round_id}: {what} in {tx_hash}");
    state.invalidate_rounds().await;
    Ok(Json(json!({ "roundId": round_id, "txHash": tx_hash })))
}
