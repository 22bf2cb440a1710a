//! Block production loop
//!
//! Appends one block per tick to the simulated chain. When the keeper is
//! enabled in configuration, each block also finalizes the current round if it
//! has become finalizable, using the emergency path once the target hash has
//! expired.

use crate::service::GameService;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub struct BlockProducer {
    service: GameService,
    block_interval: Duration,
    running: Arc<AtomicBool>,
    blocks_produced: Arc<AtomicU64>,
}

/// Handle to a spawned producer
pub struct ProducerHandle {
    running: Arc<AtomicBool>,
    blocks_produced: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ProducerHandle {
    pub fn blocks_produced(&self) -> u64 {
        self.blocks_produced.load(Ordering::SeqCst)
    }

    /// Clear the running flag, abort the loop and wait for the task to end
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
        let _ = self.task.await;
    }
}

impl BlockProducer {
    pub fn new(service: GameService, block_interval: Duration) -> Self {
        Self {
            service,
            block_interval,
            running: Arc::new(AtomicBool::new(false)),
            blocks_produced: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn spawn(self) -> ProducerHandle {
        let running = self.running.clone();
        let blocks_produced = self.blocks_produced.clone();
        let task = tokio::spawn(self.run());
        ProducerHandle {
            running,
            blocks_produced,
            task,
        }
    }

    pub async fn run(self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Block producer started, interval {}ms", self.block_interval.as_millis());

        let mut ticker = interval(self.block_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            match self.service.produce_block().await {
                Ok(block) => {
                    self.blocks_produced.fetch_add(1, Ordering::SeqCst);
                    tracing::trace!("Produced block {}", block.number);
                }
                Err(e) => tracing::warn!("Block production error: {}", e),
            }
        }

        tracing::info!("Block producer stopped");
    }
}
