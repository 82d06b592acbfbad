use crate::state::SharedState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

pub mod meta;
pub mod past_raffles;
pub mod raffle_started;
pub mod rounds;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/admin/raffles/meta", post(meta::upsert_meta))
        .route("/api/admin/raffles/meta/:id", get(meta::get_meta))
        .route("/api/admin/raffle-started", post(raffle_started::raffle_started))
        .route("/api/admin/past-raffles", get(past_raffles::past_raffles))
        .route(
            "/api/admin/rounds",
            get(rounds::admin_rounds).post(rounds::create),
        )
        .route("/api/admin/rounds/drawable", get(rounds::drawable_rounds))
        .route("/api/admin/rounds/count", get(rounds::round_count))
        .route(
            "/api/admin/rounds/:id/randomness",
            post(rounds::request_randomness),
        )
        .route("/api/admin/rounds/:id/winners", get(rounds::round_winners))
        .route("/api/admin/rounds/:id/draw", post(rounds::draw_winner))
        .route("/api/admin/rounds/:id/close", post(rounds::close_raffle))
        .route("/api/admin/prize-nft", get(rounds::prize_nft))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
