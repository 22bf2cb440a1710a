//! HTTP API tests driven through the router without binding a socket

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use blockhash_guess::{
    api::build_app,
    config::NodeConfig,
    service::GameService,
    types::{Address, Amount},
};
use serde::Deserialize;
use tower::ServiceExt;

const UNIT: Amount = 1_000_000_000_000_000_000;

#[derive(Debug, Deserialize)]
struct StateView {
    current_round: u64,
    target_block: u64,
    current_block: u64,
    jackpot: Amount,
    bet_count: usize,
    can_finalize: bool,
}

#[derive(Debug, Deserialize)]
struct ReceiptView {
    round: u64,
    amount: Amount,
    jackpot: Amount,
}

#[derive(Debug, Deserialize)]
struct OutcomeView {
    round: u64,
    path: String,
    winning_value: Amount,
    final_jackpot: Amount,
    next_round: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorView {
    request_id: String,
    error: ErrorBodyView,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyView {
    code: String,
}

fn setup() -> (GameService, Router) {
    let config = NodeConfig::testing();
    let service = GameService::start(config.clone()).unwrap();
    let app = build_app(&config.api, service.clone());
    (service, app)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

async fn post_empty(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    send(app, Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap()).await
}

fn bet_body(player: Address, amount: Amount) -> String {
    // u128 amounts exceed what serde_json::Value can hold
    format!(r#"{{"player":"{}","amount":{}}}"#, player, amount)
}

fn error_code(bytes: &[u8]) -> String {
    serde_json::from_slice::<ErrorView>(bytes).unwrap().error.code
}

#[tokio::test]
async fn test_health_and_constants() {
    let (_service, app) = setup();

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "Running");
    assert_eq!(health["block_height"], 0);

    let (status, body) = get(&app, "/constants").await;
    assert_eq!(status, StatusCode::OK);
    let constants: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(constants["blocks_to_wait"], 5);
    assert_eq!(constants["blockhash_window"], 256);
}

#[tokio::test]
async fn test_bet_submission_and_rejections() {
    let (_service, app) = setup();
    let player = Address::repeat_byte(7);

    let (status, body) = post_json(&app, "/bets", bet_body(player, 20 * UNIT)).await;
    assert_eq!(status, StatusCode::OK);
    let receipt: ReceiptView = serde_json::from_slice(&body).unwrap();
    assert_eq!(receipt.round, 1);
    assert_eq!(receipt.amount, 20 * UNIT);
    assert_eq!(receipt.jackpot, 20 * UNIT);

    let (status, body) = post_json(&app, "/bets", bet_body(player, 30 * UNIT)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ALREADY_PLAYED");

    let (status, body) = post_json(&app, "/bets", bet_body(Address::repeat_byte(8), 51 * UNIT)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorView = serde_json::from_slice(&body).unwrap();
    assert_eq!(error.error.code, "INVALID_BET_AMOUNT");
    assert!(!error.request_id.is_empty());

    let (status, body) = get(&app, "/state").await;
    assert_eq!(status, StatusCode::OK);
    let state: StateView = serde_json::from_slice(&body).unwrap();
    assert_eq!(state.bet_count, 1);
    assert_eq!(state.jackpot, 20 * UNIT);

    let (status, body) = get(&app, &format!("/rounds/1/players/{}", player)).await;
    assert_eq!(status, StatusCode::OK);
    let entry: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry["has_played"], true);

    let (status, _) = get(&app, "/rounds/1/players/not-an-address").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_finalize_flow() {
    let (service, app) = setup();
    post_json(&app, "/bets", bet_body(Address::repeat_byte(1), 10 * UNIT)).await;
    post_json(&app, "/bets", bet_body(Address::repeat_byte(2), 50 * UNIT)).await;

    let (status, body) = post_empty(&app, "/finalize").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CANNOT_FINALIZE_YET");

    service.advance_blocks(5).await.unwrap();
    let (_, body) = get(&app, "/can-finalize").await;
    let check: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(check["can_finalize"], true);

    let (status, body) = post_empty(&app, "/finalize").await;
    assert_eq!(status, StatusCode::OK);
    let outcome: OutcomeView = serde_json::from_slice(&body).unwrap();
    assert_eq!(outcome.round, 1);
    assert_eq!(outcome.path, "normal");
    assert_eq!(outcome.final_jackpot, 60 * UNIT);
    assert_eq!(outcome.next_round, 2);

    let (status, body) = post_empty(&app, "/finalize").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ROUND_ALREADY_FINALIZED");

    let (status, body) = post_json(&app, "/finalize", r#"{"round":1}"#.to_string()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "ROUND_ALREADY_FINALIZED");

    let (status, body) = get(&app, "/rounds/1/winning-number").await;
    assert_eq!(status, StatusCode::OK);
    #[derive(Deserialize)]
    struct WinningView {
        winning_value: Amount,
    }
    let winning: WinningView = serde_json::from_slice(&body).unwrap();
    assert_eq!(winning.winning_value, outcome.winning_value);

    let (status, _) = get(&app, "/rounds/1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get(&app, "/rounds/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");

    let (_, body) = get(&app, "/state").await;
    let state: StateView = serde_json::from_slice(&body).unwrap();
    assert_eq!(state.current_round, 2);
    assert_eq!(state.target_block, state.current_block + 5);
    assert!(!state.can_finalize);
}

#[tokio::test]
async fn test_emergency_finalize_endpoint() {
    let (service, app) = setup();

    let (status, body) = post_empty(&app, "/emergency-finalize").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CANNOT_FINALIZE_YET");

    service.advance_blocks(5 + 256).await.unwrap();
    let (status, body) = post_empty(&app, "/finalize").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "BLOCKHASH_UNAVAILABLE");

    let (status, body) = post_json(&app, "/emergency-finalize", r#"{"round":1}"#.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let outcome: OutcomeView = serde_json::from_slice(&body).unwrap();
    assert_eq!(outcome.path, "emergency");
    assert_eq!(outcome.final_jackpot, 0);
}

#[tokio::test]
async fn test_events_paging() {
    let (_service, app) = setup();
    for byte in 1..=3u8 {
        post_json(&app, "/bets", bet_body(Address::repeat_byte(byte), 15 * UNIT)).await;
    }

    let (status, body) = get(&app, "/events?from=0&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["events"].as_array().unwrap().len(), 2);
    assert_eq!(page["next"], 2);
    assert!(page["events"][0]["event"]["round_started"].is_object());

    let (_, body) = get(&app, "/events?from=2").await;
    let page: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(page["events"].as_array().unwrap().len(), 2);
    assert_eq!(page["next"], 4);

    let (status, _) = get(&app, "/events?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_and_request_id() {
    let (_service, app) = setup();
    post_json(&app, "/bets", bet_body(Address::repeat_byte(1), 12 * UNIT)).await;

    let request = Request::builder()
        .uri("/metrics")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-me");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("bhg_bets_accepted_total 1"));
    assert!(text.contains("bhg_current_round 1"));
}
