//! API Request and Response Models
//!
//! Amounts are smallest units and travel as JSON integers.

use crate::{
    events::EventRecord,
    ledger::Bet,
    types::{Address, Amount, BlockNumber, RoundId},
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub version: String,
    pub block_height: BlockNumber,
}

/// POST /bets body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub player: Address,
    pub amount: Amount,
}

/// Optional body of POST /finalize and POST /emergency-finalize
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeRequest {
    #[serde(default)]
    pub round: Option<RoundId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanFinalizeResponse {
    pub can_finalize: bool,
    pub emergency_required: bool,
    pub current_round: RoundId,
    pub current_block: BlockNumber,
    pub target_block: BlockNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundBetsResponse {
    pub round: RoundId,
    pub bets: Vec<Bet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundWinnersResponse {
    pub round: RoundId,
    pub winners: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinningNumberResponse {
    pub round: RoundId,
    /// 0 while the round is open or unknown
    pub winning_value: Amount,
}

/// Event list query parameters
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: u64,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
    /// Sequence to pass as `from` for the next page
    pub next: u64,
}
