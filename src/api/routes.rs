//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Current round
        .route("/state", get(game_state_handler))
        .route("/can-finalize", get(can_finalize_handler))
        .route("/constants", get(constants_handler))
        // Round history
        .route("/rounds/:round", get(round_handler))
        .route("/rounds/:round/bets", get(round_bets_handler))
        .route("/rounds/:round/winners", get(round_winners_handler))
        .route("/rounds/:round/winning-number", get(winning_number_handler))
        .route("/rounds/:round/players/:player", get(player_handler))
        .route("/events", get(events_handler))
        // Mutations
        .route("/bets", post(submit_bet_handler))
        .route("/finalize", post(finalize_handler))
        .route("/emergency-finalize", post(emergency_finalize_handler))
        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
