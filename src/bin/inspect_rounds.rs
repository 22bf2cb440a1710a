//! Round store inspector
//!
//! Prints rounds and journaled events from a node's data directory and checks
//! that replaying the journal reproduces the stored rounds.

use blockhash_guess::{
    errors::NodeResult,
    history::RoundHistory,
    ledger::{Round, SettlementOutcome},
    round_store,
    storage::OptimizedStorage,
};
use clap::Parser;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "inspect_rounds")]
#[command(about = "Inspect stored rounds and game events", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/rounds")]
    db_path: String,

    /// Show only this round
    #[arg(short, long)]
    round: Option<u64>,

    /// Print the last N events
    #[arg(short, long, default_value = "20")]
    events: usize,

    /// Replay the journal and compare it with stored rounds
    #[arg(long)]
    verify: bool,
}

fn main() {
    let args = Args::parse();

    if !Path::new(&args.db_path).exists() {
        println!("No game data found at {}", args.db_path);
        return;
    }

    if let Err(e) = inspect(&args) {
        eprintln!("Inspection failed: {}", e);
        std::process::exit(1);
    }
}

fn inspect(args: &Args) -> NodeResult<()> {
    let storage = OptimizedStorage::open_read_only(&args.db_path)?;

    let Some(state) = round_store::load_state(&storage)? else {
        println!("Database at {} holds no game state", args.db_path);
        return Ok(());
    };

    println!("Round Inspector");
    println!("===============");
    println!("Active round: {}", state.ledger.current_id());
    println!("Chain head:   #{} {}", state.chain.head().number, hex::encode(state.chain.head().hash));
    println!("Events:       {}", state.journal.len());
    println!(
        "Vault:        held {} burned {} stranded {} paid {}",
        state.vault.held(),
        state.vault.burned(),
        state.vault.stranded(),
        state.vault.total_paid()
    );
    println!();

    match args.round {
        Some(id) => match state.ledger.get(id) {
            Some(round) => print_round(round),
            None => println!("Round {} not found", id),
        },
        None => state.ledger.rounds().for_each(print_round),
    }

    let records = state.journal.records();
    let tail = records.len().saturating_sub(args.events);
    if args.events > 0 && !records.is_empty() {
        println!("Last {} events:", records.len() - tail);
        for record in &records[tail..] {
            println!(
                "   #{:<6} block {:<8} {}",
                record.sequence,
                record.block_number,
                serde_json::to_string(&record.event).unwrap_or_else(|_| record.event.name().to_string())
            );
        }
        println!();
    }

    if args.verify {
        verify(&state.ledger.rounds().collect::<Vec<_>>(), records);
    }

    Ok(())
}

fn print_round(round: &Round) {
    let status = if round.active { "open" } else { "finalized" };
    println!("Round #{} ({})", round.id, status);
    println!("   Target block: {}", round.target_block);
    println!("   Opened at:    {}", round.opened_at_block);
    println!("   Bets:         {}", round.bets.len());
    for bet in &round.bets {
        println!("      {} {}", bet.player, bet.amount);
    }
    if let Some(summary) = &round.settlement {
        println!("   Path:         {:?}", summary.path);
        println!("   Winning:      {}", round.winning_value);
        println!("   Jackpot:      {}", summary.final_jackpot);
        match &summary.outcome {
            SettlementOutcome::Paid { payout_per_winner, dust } => {
                println!("   Winners:      {}", round.winners.len());
                println!("   Each:         {} (dust {})", payout_per_winner, dust);
            }
            SettlementOutcome::Burned { amount } => println!("   Burned:       {}", amount),
        }
        println!("   Finalized at: {}", summary.finalized_at_block);
    } else {
        println!("   Jackpot:      {}", round.jackpot);
    }
    println!();
}

fn verify(rounds: &[&Round], records: &[blockhash_guess::events::EventRecord]) {
    let history = match RoundHistory::replay(records) {
        Ok(history) => history,
        Err(e) => {
            println!("Replay failed: {}", e);
            return;
        }
    };

    let mut mismatches = 0;
    for round in rounds {
        let Some(replayed) = history.get(round.id) else {
            println!("   Round {} missing from journal", round.id);
            mismatches += 1;
            continue;
        };
        let bets: Vec<_> = round.bets.iter().map(|b| (b.player, b.amount)).collect();
        let consistent = replayed.bets == bets
            && replayed.finalized == !round.active
            && replayed.winners == round.winners
            && replayed.winning_value == round.winning_value
            && replayed.target_block == round.target_block;
        if !consistent {
            println!("   Round {} differs from its journal replay", round.id);
            mismatches += 1;
        }
    }

    if mismatches == 0 {
        println!("Journal replay matches all {} stored rounds", rounds.len());
    } else {
        println!("{} rounds failed verification", mismatches);
    }
}
