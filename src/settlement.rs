//! Settlement Module
//!
//! Moves value into custody when bets are accepted and out of custody when a
//! round finalizes. A `SettlementPlan` is computed from the final jackpot and
//! the winner list, then handed to a `SettlementExecutor` which must apply it
//! completely or not at all.

use crate::types::{Address, Amount, RoundId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What happens to the remainder of `jackpot / winners`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DustPolicy {
    /// Remainder stays in custody, unclaimed, and is tracked as stranded
    #[default]
    Strand,
    /// Remainder is added to the first winner's payout (bet order)
    FirstWinner,
}

/// Single outbound transfer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub recipient: Address,
    pub amount: Amount,
}

/// Everything the executor must do for one finalized round
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPlan {
    Payout {
        round: RoundId,
        transfers: Vec<Transfer>,
        payout_per_winner: Amount,
        dust: Amount,
        dust_policy: DustPolicy,
    },
    Burn {
        round: RoundId,
        amount: Amount,
    },
}

impl SettlementPlan {
    /// Split `jackpot` evenly between `winners`, or burn it if there are none
    pub fn build(round: RoundId, jackpot: Amount, winners: &[Address], dust_policy: DustPolicy) -> Self {
        if winners.is_empty() {
            return SettlementPlan::Burn { round, amount: jackpot };
        }

        let count = winners.len() as Amount;
        let payout_per_winner = jackpot / count;
        let dust = jackpot % count;

        let transfers = winners
            .iter()
            .enumerate()
            .map(|(i, winner)| {
                let bonus = if i == 0 && dust_policy == DustPolicy::FirstWinner { dust } else { 0 };
                Transfer {
                    recipient: *winner,
                    amount: payout_per_winner + bonus,
                }
            })
            .collect();

        SettlementPlan::Payout {
            round,
            transfers,
            payout_per_winner,
            dust,
            dust_policy,
        }
    }

    pub fn round(&self) -> RoundId {
        match self {
            SettlementPlan::Payout { round, .. } | SettlementPlan::Burn { round, .. } => *round,
        }
    }

    /// Value leaving custody through transfers
    pub fn paid_out(&self) -> Amount {
        match self {
            SettlementPlan::Payout { transfers, .. } => transfers.iter().map(|t| t.amount).sum(),
            SettlementPlan::Burn { .. } => 0,
        }
    }

    pub fn burned(&self) -> Amount {
        match self {
            SettlementPlan::Burn { amount, .. } => *amount,
            SettlementPlan::Payout { .. } => 0,
        }
    }

    /// Value left in custody unclaimed
    pub fn stranded(&self) -> Amount {
        match self {
            SettlementPlan::Payout {
                dust,
                dust_policy: DustPolicy::Strand,
                ..
            } => *dust,
            _ => 0,
        }
    }

    /// Jackpot this plan accounts for
    pub fn total(&self) -> Amount {
        self.paid_out() + self.burned() + self.stranded()
    }
}

/// Result of a fully applied plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub round: RoundId,
    pub paid: Vec<Transfer>,
    pub burned: Amount,
    pub stranded: Amount,
}

/// Failures reported by an executor. Custody is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("Transfer of {amount} to {recipient} rejected: {reason}")]
    TransferRejected {
        recipient: Address,
        amount: Amount,
        reason: String,
    },

    #[error("Deposit of {amount} from {from} rejected: {reason}")]
    DepositRejected {
        from: Address,
        amount: Amount,
        reason: String,
    },

    #[error("Insufficient custody: need {required}, holding {held}")]
    InsufficientCustody { required: Amount, held: Amount },
}

impl SettlementError {
    /// Recipient whose transfer failed, if the failure is attributable to one
    pub fn recipient(&self) -> Option<Address> {
        match self {
            SettlementError::TransferRejected { recipient, .. } => Some(*recipient),
            _ => None,
        }
    }
}

/// Moves value in and out of custody
pub trait SettlementExecutor: Send {
    /// Take `amount` from `from` into custody
    fn escrow(&mut self, from: &Address, amount: Amount) -> Result<(), SettlementError>;

    /// Apply every transfer and burn in `plan`, or none of them
    fn settle(&mut self, plan: &SettlementPlan) -> Result<SettlementReceipt, SettlementError>;
}

/// In-process custody account.
///
/// Tracks what is held, what each recipient has been credited, and what has
/// been burned or stranded. Individual recipients or depositors can be marked
/// as rejecting to exercise failure paths.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyVault {
    held: Amount,
    burned: Amount,
    stranded: Amount,
    deposited: Amount,
    credited: BTreeMap<Address, Amount>,
    #[serde(default)]
    rejecting_recipients: BTreeSet<Address>,
    #[serde(default)]
    rejecting_depositors: BTreeSet<Address>,
}

impl CustodyVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value currently in custody, including stranded dust
    pub fn held(&self) -> Amount {
        self.held
    }

    pub fn burned(&self) -> Amount {
        self.burned
    }

    pub fn stranded(&self) -> Amount {
        self.stranded
    }

    /// Total ever escrowed
    pub fn deposited(&self) -> Amount {
        self.deposited
    }

    pub fn credited(&self, recipient: &Address) -> Amount {
        self.credited.get(recipient).copied().unwrap_or(0)
    }

    pub fn total_paid(&self) -> Amount {
        self.credited.values().sum()
    }

    /// Make every transfer to `recipient` fail until `accept_payouts` is called
    pub fn reject_payouts(&mut self, recipient: Address) {
        self.rejecting_recipients.insert(recipient);
    }

    pub fn accept_payouts(&mut self, recipient: &Address) {
        self.rejecting_recipients.remove(recipient);
    }

    pub fn reject_deposits(&mut self, depositor: Address) {
        self.rejecting_depositors.insert(depositor);
    }

    pub fn accept_deposits(&mut self, depositor: &Address) {
        self.rejecting_depositors.remove(depositor);
    }

    fn transfer(&mut self, transfer: &Transfer) -> Result<(), SettlementError> {
        if self.rejecting_recipients.contains(&transfer.recipient) {
            return Err(SettlementError::TransferRejected {
                recipient: transfer.recipient,
                amount: transfer.amount,
                reason: "recipient refused transfer".to_string(),
            });
        }
        if transfer.amount > self.held {
            return Err(SettlementError::InsufficientCustody {
                required: transfer.amount,
                held: self.held,
            });
        }
        self.held -= transfer.amount;
        *self.credited.entry(transfer.recipient).or_insert(0) += transfer.amount;
        Ok(())
    }
}

impl SettlementExecutor for CustodyVault {
    fn escrow(&mut self, from: &Address, amount: Amount) -> Result<(), SettlementError> {
        if self.rejecting_depositors.contains(from) {
            return Err(SettlementError::DepositRejected {
                from: *from,
                amount,
                reason: "depositor refused transfer".to_string(),
            });
        }
        self.held += amount;
        self.deposited += amount;
        Ok(())
    }

    fn settle(&mut self, plan: &SettlementPlan) -> Result<SettlementReceipt, SettlementError> {
        // Apply to a staged copy so a failed transfer leaves custody untouched
        let mut staged = self.clone();

        match plan {
            SettlementPlan::Payout { transfers, .. } => {
                for transfer in transfers {
                    staged.transfer(transfer)?;
                }
            }
            SettlementPlan::Burn { amount, .. } => {
                if *amount > staged.held {
                    return Err(SettlementError::InsufficientCustody {
                        required: *amount,
                        held: staged.held,
                    });
                }
                staged.held -= amount;
                staged.burned += amount;
            }
        }
        staged.stranded += plan.stranded();

        *self = staged;

        Ok(SettlementReceipt {
            round: plan.round(),
            paid: match plan {
                SettlementPlan::Payout { transfers, .. } => transfers.clone(),
                SettlementPlan::Burn { .. } => Vec::new(),
            },
            burned: plan.burned(),
            stranded: plan.stranded(),
        })
    }
}
