//! Game state survives stopping and restarting the node

use blockhash_guess::{
    config::NodeConfig,
    engine::RoundEngine,
    errors::{NodeError, RoundError, StorageError},
    history::RoundHistory,
    randomness::BlockhashRandomness,
    round_store,
    service::{GameService, NodeState},
    storage::OptimizedStorage,
    types::{Address, Amount},
};
use tempfile::TempDir;

const UNIT: Amount = 1_000_000_000_000_000_000;

fn config_for(dir: &TempDir) -> NodeConfig {
    let mut config = NodeConfig::testing();
    config.storage.enabled = true;
    config.storage.clear_on_start = false;
    config.storage.data_directory = dir.path().join("db").to_string_lossy().to_string();
    config
}

#[tokio::test]
async fn test_state_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    // Phase 1: play a round and leave the next one half filled
    let (before_state, before_events, first_winning) = {
        let service = GameService::start(config.clone()).unwrap();
        service.submit_bet(Address::repeat_byte(1), 20 * UNIT).await.unwrap();
        service.submit_bet(Address::repeat_byte(2), 35 * UNIT).await.unwrap();
        service.advance_blocks(5).await.unwrap();
        let outcome = service.finalize(None).await.unwrap();
        assert_eq!(outcome.next_round, 2);

        service.submit_bet(Address::repeat_byte(3), 44 * UNIT).await.unwrap();
        service.advance_blocks(2).await.unwrap();

        (
            service.game_state().await,
            service.events(0, usize::MAX).await,
            outcome.winning_value,
        )
    };

    // Phase 2: reopen the same directory
    let service = GameService::start(config).unwrap();
    let state = service.game_state().await;
    assert_eq!(state, before_state);
    assert_eq!(state.current_round, 2);
    assert_eq!(state.jackpot, 44 * UNIT);
    assert_eq!(service.events(0, usize::MAX).await, before_events);
    assert_eq!(service.round_winning_number(1).await, first_winning);

    let entry = service.player_entry(2, Address::repeat_byte(3)).await;
    assert!(entry.has_played);
    assert_eq!(entry.amount, 44 * UNIT);

    // Rules still enforced on restored state
    let err = service.submit_bet(Address::repeat_byte(3), 11 * UNIT).await.unwrap_err();
    assert!(matches!(err, NodeError::Round(RoundError::AlreadyPlayed { round: 2, .. })));

    let err = service.finalize(Some(1)).await.unwrap_err();
    assert!(matches!(err, NodeError::Round(RoundError::RoundAlreadyFinalized { round: 1 })));

    // The restored journal still replays cleanly and keeps growing
    service.advance_blocks(3).await.unwrap();
    service.finalize(Some(2)).await.unwrap();
    let events = service.events(0, usize::MAX).await;
    let history = RoundHistory::replay(&events).unwrap();
    assert_eq!(history.current, Some(3));
    assert_eq!(history.get(2).unwrap().final_jackpot, 44 * UNIT);
}

#[tokio::test]
async fn test_clear_on_start_resets_state() {
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&dir);

    {
        let service = GameService::start(config.clone()).unwrap();
        service.advance_blocks(5).await.unwrap();
        service.finalize(None).await.unwrap();
        assert_eq!(service.game_state().await.current_round, 2);
    }

    config.storage.clear_on_start = true;
    let service = GameService::start(config).unwrap();
    let state = service.game_state().await;
    assert_eq!(state.current_round, 1);
    assert_eq!(state.current_block, 0);
    assert_eq!(service.events(0, 10).await.len(), 1);
}

#[tokio::test]
async fn test_rejected_operations_do_not_touch_storage() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    let events_before = {
        let service = GameService::start(config.clone()).unwrap();
        service.submit_bet(Address::repeat_byte(1), 10 * UNIT).await.unwrap();
        assert!(service.submit_bet(Address::repeat_byte(1), 10 * UNIT).await.is_err());
        assert!(service.submit_bet(Address::repeat_byte(2), 5 * UNIT).await.is_err());
        assert!(service.finalize(None).await.is_err());
        service.events(0, usize::MAX).await
    };

    let service = GameService::start(config).unwrap();
    assert_eq!(service.events(0, usize::MAX).await, events_before);
    assert_eq!(service.round_bets(1).await.len(), 1);
}

#[tokio::test]
async fn test_failed_write_undoes_mutation() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    {
        let service = GameService::start(config.clone()).unwrap();
        service.submit_bet(Address::repeat_byte(1), 20 * UNIT).await.unwrap();
        service.advance_blocks(3).await.unwrap();
    }

    // A read-only handle makes every write fail
    let before = {
        let storage = OptimizedStorage::open_read_only(&config.storage.data_directory).unwrap();
        let persisted = round_store::load_state(&storage).unwrap().unwrap();
        let state = NodeState {
            engine: RoundEngine::restore(
                config.game.clone(),
                persisted.ledger,
                persisted.journal,
                BlockhashRandomness::new(),
                persisted.vault,
            ),
            chain: persisted.chain,
        };
        let service = GameService::from_state(config.clone(), state, Some(storage)).unwrap();
        let before = service.game_state().await;
        let events = service.events(0, usize::MAX).await;

        let err = service.submit_bet(Address::repeat_byte(2), 30 * UNIT).await.unwrap_err();
        assert!(matches!(err, NodeError::Storage(StorageError::WriteFailed(_))));
        assert!(!service.player_entry(1, Address::repeat_byte(2)).await.has_played);

        let err = service.advance_blocks(2).await.unwrap_err();
        assert!(matches!(err, NodeError::Storage(_)));
        assert_eq!(service.head().await.number, before.current_block);

        assert_eq!(service.game_state().await, before);
        assert_eq!(service.events(0, usize::MAX).await, events);
        before
    };

    // Storage never saw the failed mutations, and the node keeps going from there
    let service = GameService::start(config).unwrap();
    assert_eq!(service.game_state().await, before);
    service.submit_bet(Address::repeat_byte(2), 30 * UNIT).await.unwrap();
    service.advance_blocks(2).await.unwrap();
    let outcome = service.finalize(None).await.unwrap();
    assert_eq!(outcome.final_jackpot, 50 * UNIT);

    drop(service);
    let service = GameService::start(config_for(&dir)).unwrap();
    let events = service.events(0, usize::MAX).await;
    assert!(RoundHistory::replay(&events).is_ok());
    assert_eq!(service.game_state().await.current_round, 2);
}

#[tokio::test]
async fn test_failed_write_undoes_finalization() {
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir);

    {
        let service = GameService::start(config.clone()).unwrap();
        service.submit_bet(Address::repeat_byte(1), 20 * UNIT).await.unwrap();
        service.advance_blocks(5).await.unwrap();
    }

    let storage = OptimizedStorage::open_read_only(&config.storage.data_directory).unwrap();
    let persisted = round_store::load_state(&storage).unwrap().unwrap();
    let vault = persisted.vault.clone();
    let state = NodeState {
        engine: RoundEngine::restore(
            config.game.clone(),
            persisted.ledger,
            persisted.journal,
            BlockhashRandomness::new(),
            persisted.vault,
        ),
        chain: persisted.chain,
    };
    let service = GameService::from_state(config, state, Some(storage)).unwrap();
    let events = service.events(0, usize::MAX).await;

    let err = service.finalize(None).await.unwrap_err();
    assert!(matches!(err, NodeError::Storage(_)));

    let state = service.game_state().await;
    assert_eq!(state.current_round, 1);
    assert_eq!(state.jackpot, 20 * UNIT);
    assert!(state.can_finalize);
    assert_eq!(service.events(0, usize::MAX).await, events);
    service
        .with_state(|state| assert_eq!(state.engine.executor(), &vault))
        .await;
}
