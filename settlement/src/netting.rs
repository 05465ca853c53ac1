//! Minimal-transfer netting
//!
//! Greedy debtor/creditor matching over net positions.
//!
//! # Algorithm
//!
//! 1. Check money conservation: positions must sum to exactly zero
//! 2. Split users into debtors (negative) and creditors (positive)
//! 3. Match the largest debtor with the largest creditor
//! 4. Transfer `min(debt, credit)`, put the unmatched rest back, repeat
//!
//! Equal magnitudes are taken in ascending user id order.
//!
//! # Example
//!
//! ```text
//! Net positions:
//!   A: +50 (creditor)
//!   B: +30 (creditor)
//!   C: -80 (debtor)
//!
//! Transfers:
//!   C pays A: 50
//!   C pays B: 30
//! ```
//!
//! Every step zeroes at least one user and the last step zeroes two, so `n`
//! users with a nonzero position need at most `n - 1` transfers. Finding the
//! true minimum is NP-hard; greedy matching is the chosen approximation.

use crate::{
    balance::Balances,
    types::{Money, Transfer, UserId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

/// Outstanding magnitude of one side of the netting
#[derive(Debug, PartialEq, Eq)]
struct Outstanding {
    amount: Money,
    user: UserId,
}

impl Ord for Outstanding {
    // Max-heap: largest amount first, then smallest user id
    fn cmp(&self, other: &Self) -> Ordering {
        self.amount
            .cmp(&other.amount)
            .then_with(|| other.user.cmp(&self.user))
    }
}

impl PartialOrd for Outstanding {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Smallest greedy set of transfers that zeroes every position
///
/// `positions`: positive = creditor, negative = debtor. Fails with
/// [`Error::UnbalancedLedger`] when the positions do not sum to zero.
pub fn minimal_settlement(positions: &Balances) -> Result<Vec<Transfer>> {
    let total = Money::checked_sum(positions.values().copied())
        .ok_or_else(|| Error::overflow("summing net positions"))?;
    if !total.is_zero() {
        let nonzero: Vec<String> = positions
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(user, amount)| format!("{}={}", user, amount))
            .collect();
        warn!(%total, "Net positions do not sum to zero");
        return Err(Error::unbalanced(format!(
            "net positions sum to {} [{}]",
            total,
            nonzero.join(", ")
        )));
    }

    let mut debtors = BinaryHeap::new();
    let mut creditors = BinaryHeap::new();
    for (user, &amount) in positions {
        if amount.is_positive() {
            creditors.push(Outstanding {
                amount,
                user: user.clone(),
            });
        } else if amount.is_negative() {
            let amount = amount
                .checked_abs()
                .ok_or_else(|| Error::overflow(format!("taking position of {}", user)))?;
            debtors.push(Outstanding {
                amount,
                user: user.clone(),
            });
        }
    }

    let mut transfers = Vec::with_capacity(debtors.len() + creditors.len());
    while let (Some(debtor), Some(creditor)) = (debtors.peek(), creditors.peek()) {
        let amount = debtor.amount.min(creditor.amount);
        let (Some(debtor), Some(creditor)) = (debtors.pop(), creditors.pop()) else {
            break;
        };

        debug!(
            from = %debtor.user,
            to = %creditor.user,
            %amount,
            "Matched debtor with creditor"
        );
        transfers.push(Transfer::new(
            debtor.user.clone(),
            creditor.user.clone(),
            amount,
        ));

        requeue(&mut debtors, debtor, amount)?;
        requeue(&mut creditors, creditor, amount)?;
    }

    if !debtors.is_empty() || !creditors.is_empty() {
        return Err(Error::unbalanced(format!(
            "{} debtors and {} creditors left unmatched",
            debtors.len(),
            creditors.len()
        )));
    }

    Ok(transfers)
}

fn requeue(heap: &mut BinaryHeap<Outstanding>, side: Outstanding, paid: Money) -> Result<()> {
    let rest = side
        .amount
        .checked_sub(paid)
        .ok_or_else(|| Error::overflow(format!("reducing position of {}", side.user)))?;
    if rest.is_positive() {
        heap.push(Outstanding {
            amount: rest,
            user: side.user,
        });
    }
    Ok(())
}

/// Apply transfers to net positions
///
/// The payer's position rises by the amount and the payee's falls by it.
pub fn apply_transfers(positions: &Balances, transfers: &[Transfer]) -> Result<Balances> {
    let mut result = positions.clone();
    for transfer in transfers {
        let from = result.entry(transfer.from.clone()).or_insert(Money::ZERO);
        *from = from
            .checked_add(transfer.amount)
            .ok_or_else(|| Error::overflow(format!("applying {}", transfer)))?;

        let to = result.entry(transfer.to.clone()).or_insert(Money::ZERO);
        *to = to
            .checked_sub(transfer.amount)
            .ok_or_else(|| Error::overflow(format!("applying {}", transfer)))?;
    }
    Ok(result)
}

/// Netting engine
#[derive(Debug, Clone)]
pub struct NettingEngine {
    /// Maximum users with a nonzero position
    max_participants: usize,
}

impl NettingEngine {
    /// Create new netting engine
    pub fn new(max_participants: usize) -> Self {
        Self { max_participants }
    }

    /// Compute transfers for `positions`, enforcing the participant limit
    pub fn settle(&self, positions: &Balances) -> Result<Vec<Transfer>> {
        let participants = positions.values().filter(|a| !a.is_zero()).count();
        if participants > self.max_participants {
            return Err(Error::Config(format!(
                "{} participants exceed netting limit {}",
                participants, self.max_participants
            )));
        }
        minimal_settlement(positions)
    }
}

impl Default for NettingEngine {
    fn default() -> Self {
        Self::new(crate::config::NettingConfig::default().max_participants)
    }
}

/// Netting statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NettingStats {
    /// Users with a nonzero position
    pub participant_count: usize,

    /// Transfers needed when every pair settles separately
    pub pairwise_transfer_count: usize,

    /// Transfers after netting
    pub transfer_count: usize,

    /// Amount moved when every pair settles separately
    pub pairwise_total: Money,

    /// Amount moved after netting
    pub total_transferred: Money,

    /// Transfers saved versus pairwise settlement
    pub transfers_eliminated: usize,
}

impl NettingStats {
    /// Compare netted transfers against pairwise settlement
    pub fn compute(
        positions: &Balances,
        pairwise: &[Transfer],
        transfers: &[Transfer],
    ) -> Result<Self> {
        let pairwise_total = Money::checked_sum(pairwise.iter().map(|t| t.amount))
            .ok_or_else(|| Error::overflow("summing pairwise transfers"))?;
        let total_transferred = Money::checked_sum(transfers.iter().map(|t| t.amount))
            .ok_or_else(|| Error::overflow("summing netted transfers"))?;

        Ok(Self {
            participant_count: positions.values().filter(|a| !a.is_zero()).count(),
            pairwise_transfer_count: pairwise.len(),
            transfer_count: transfers.len(),
            pairwise_total,
            total_transferred,
            transfers_eliminated: pairwise.len().saturating_sub(transfers.len()),
        })
    }
}
