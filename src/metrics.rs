//! Game metrics exported in Prometheus text format

use crate::errors::RoundError;
use crate::ledger::FinalizationPath;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct GameMetrics {
    registry: Registry,
    bets_accepted: IntCounter,
    bets_rejected: IntCounterVec,
    rounds_finalized: IntCounterVec,
    payout_failures: IntCounter,
    jackpots_burned: IntCounter,
    current_round: IntGauge,
    current_jackpot_units: IntGauge,
    block_height: IntGauge,
}

impl GameMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bets_accepted = IntCounter::new("bhg_bets_accepted_total", "Bets accepted into a round")?;
        let bets_rejected = IntCounterVec::new(
            Opts::new("bhg_bets_rejected_total", "Bets rejected, by error code"),
            &["reason"],
        )?;
        let rounds_finalized = IntCounterVec::new(
            Opts::new("bhg_rounds_finalized_total", "Rounds finalized, by derivation path"),
            &["path"],
        )?;
        let payout_failures = IntCounter::new("bhg_payout_failures_total", "Finalizations rolled back by a failed payout")?;
        let jackpots_burned = IntCounter::new("bhg_jackpots_burned_total", "Rounds settled without a winner")?;
        let current_round = IntGauge::new("bhg_current_round", "Id of the active round")?;
        let current_jackpot_units = IntGauge::new("bhg_current_jackpot_units", "Jackpot of the active round in whole units")?;
        let block_height = IntGauge::new("bhg_block_height", "Height of the latest block")?;

        registry.register(Box::new(bets_accepted.clone()))?;
        registry.register(Box::new(bets_rejected.clone()))?;
        registry.register(Box::new(rounds_finalized.clone()))?;
        registry.register(Box::new(payout_failures.clone()))?;
        registry.register(Box::new(jackpots_burned.clone()))?;
        registry.register(Box::new(current_round.clone()))?;
        registry.register(Box::new(current_jackpot_units.clone()))?;
        registry.register(Box::new(block_height.clone()))?;

        Ok(Self {
            registry,
            bets_accepted,
            bets_rejected,
            rounds_finalized,
            payout_failures,
            jackpots_burned,
            current_round,
            current_jackpot_units,
            block_height,
        })
    }

    pub fn record_bet(&self) {
        self.bets_accepted.inc();
    }

    pub fn record_rejection(&self, error: &RoundError) {
        self.bets_rejected.with_label_values(&[error.code()]).inc();
    }

    pub fn record_finalization(&self, path: FinalizationPath, burned: bool) {
        let label = match path {
            FinalizationPath::Normal => "normal",
            FinalizationPath::Emergency => "emergency",
        };
        self.rounds_finalized.with_label_values(&[label]).inc();
        if burned {
            self.jackpots_burned.inc();
        }
    }

    pub fn record_payout_failure(&self) {
        self.payout_failures.inc();
    }

    pub fn set_round(&self, round: u64, jackpot_units: u128) {
        self.current_round.set(round as i64);
        self.current_jackpot_units.set(jackpot_units.min(i64::MAX as u128) as i64);
    }

    pub fn set_block_height(&self, height: u64) {
        self.block_height.set(height as i64);
    }

    /// Render every registered metric
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
