//! Request Handlers
//!
//! Thin adapters between HTTP and `GameService`. Every mutation goes through
//! the service lock, so handlers never observe a half-applied operation.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::{
    engine::{BetReceipt, FinalizeOutcome, GameState},
    ledger::Round,
    service::{GameConstants, GameService, PlayerEntry},
    types::{Address, RoundId},
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub service: GameService,
    pub node_id: String,
    pub version: String,
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let head = state.service.head().await;
    Json(HealthResponse {
        status: "Running".to_string(),
        node_id: state.node_id.clone(),
        version: state.version.clone(),
        block_height: head.number,
    })
}

/// GET /state
pub async fn game_state_handler(State(state): State<Arc<AppState>>) -> Json<GameState> {
    Json(state.service.game_state().await)
}

/// GET /can-finalize
pub async fn can_finalize_handler(State(state): State<Arc<AppState>>) -> Json<CanFinalizeResponse> {
    let game = state.service.game_state().await;
    Json(CanFinalizeResponse {
        can_finalize: game.can_finalize,
        emergency_required: game.emergency_required,
        current_round: game.current_round,
        current_block: game.current_block,
        target_block: game.target_block,
    })
}

/// GET /constants
pub async fn constants_handler(State(state): State<Arc<AppState>>) -> Json<GameConstants> {
    Json(state.service.constants())
}

/// GET /rounds/:round
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(round): Path<RoundId>,
) -> Result<Json<Round>, ApiError> {
    state
        .service
        .round(round)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("Round {} not found", round)))
}

/// GET /rounds/:round/bets
pub async fn round_bets_handler(
    State(state): State<Arc<AppState>>,
    Path(round): Path<RoundId>,
) -> Json<RoundBetsResponse> {
    Json(RoundBetsResponse {
        round,
        bets: state.service.round_bets(round).await,
    })
}

/// GET /rounds/:round/winners
pub async fn round_winners_handler(
    State(state): State<Arc<AppState>>,
    Path(round): Path<RoundId>,
) -> Json<RoundWinnersResponse> {
    Json(RoundWinnersResponse {
        round,
        winners: state.service.round_winners(round).await,
    })
}

/// GET /rounds/:round/winning-number
pub async fn winning_number_handler(
    State(state): State<Arc<AppState>>,
    Path(round): Path<RoundId>,
) -> Json<WinningNumberResponse> {
    Json(WinningNumberResponse {
        round,
        winning_value: state.service.round_winning_number(round).await,
    })
}

/// GET /rounds/:round/players/:player
pub async fn player_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path((round, player)): Path<(RoundId, String)>,
) -> Result<Json<PlayerEntry>, ApiError> {
    let player: Address = player
        .parse()
        .map_err(|e| ApiError::bad_request(request_id.0, format!("Invalid player address: {}", e)))?;
    Ok(Json(state.service.player_entry(round, player).await))
}

/// GET /events?from={sequence}&limit={n}
pub async fn events_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    if query.limit == 0 || query.limit > 1_000 {
        return Err(ApiError::bad_request(
            request_id.0,
            "limit must be between 1 and 1000".to_string(),
        ));
    }
    let events = state.service.events(query.from, query.limit).await;
    let next = events.last().map(|r| r.sequence + 1).unwrap_or(query.from);
    Ok(Json(EventsResponse { events, next }))
}

/// POST /bets
pub async fn submit_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<BetRequest>,
) -> Result<Json<BetReceipt>, ApiError> {
    state
        .service
        .submit_bet(request.player, request.amount)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_node(request_id.0, e))
}

/// POST /finalize
pub async fn finalize_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<FinalizeRequest>>,
) -> Result<Json<FinalizeOutcome>, ApiError> {
    let round = body.and_then(|Json(request)| request.round);
    state
        .service
        .finalize(round)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_node(request_id.0, e))
}

/// POST /emergency-finalize
pub async fn emergency_finalize_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<FinalizeRequest>>,
) -> Result<Json<FinalizeOutcome>, ApiError> {
    let round = body.and_then(|Json(request)| request.round);
    state
        .service
        .emergency_finalize(round)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_node(request_id.0, e))
}

/// GET /metrics
pub async fn metrics_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.service.config().monitoring.enable_metrics {
        return Err(ApiError::not_found(request_id.0, "Metrics are disabled".to_string()));
    }
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.service.metrics().render(),
    ))
}
