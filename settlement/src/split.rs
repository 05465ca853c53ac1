//! Split computation
//!
//! Turns a total and a split specification into integer per-participant
//! shares that sum exactly to the total.
//!
//! # Rounding
//!
//! Leftover minor units are handed out one at a time (largest remainder):
//!
//! ```text
//! total 100, equal between [alice, bob, carol]
//!   base 33, remainder 1
//!   alice 34, bob 33, carol 33
//!
//! total 1000, percentages [33.33, 33.33, 33.34]
//!   raw 333.3, 333.3, 333.4 → floors 333, 333, 333, leftover 1
//!   largest fraction: carol → 333, 333, 334
//! ```
//!
//! With the default [`RemainderOrder::Supplied`], ties go to participants in
//! the order they were supplied.

use crate::{
    config::{RemainderOrder, SplitConfig},
    types::{Money, ParticipantShare, SplitMethod, UserId},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Method-specific split parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "values", rename_all = "snake_case")]
pub enum Split {
    /// Divide evenly
    Equal,
    /// Explicit amount per participant, in participant order
    Exact(Vec<Money>),
    /// Explicit percentage per participant, in participant order
    Percentage(Vec<Decimal>),
}

impl Split {
    /// The method this specification belongs to
    pub fn method(&self) -> SplitMethod {
        match self {
            Split::Equal => SplitMethod::Equal,
            Split::Exact(_) => SplitMethod::Exact,
            Split::Percentage(_) => SplitMethod::Percentage,
        }
    }
}

/// Computes participant shares
#[derive(Debug, Clone, Default)]
pub struct SplitCalculator {
    /// Allowed distance of a percentage sum from 100
    percentage_tolerance: Decimal,

    /// Tie order for leftover minor units
    remainder_order: RemainderOrder,
}

impl SplitCalculator {
    /// Create new calculator
    pub fn new(percentage_tolerance: Decimal, remainder_order: RemainderOrder) -> Self {
        Self {
            percentage_tolerance,
            remainder_order,
        }
    }

    /// Create from configuration
    pub fn from_config(config: &SplitConfig) -> Self {
        Self::new(config.percentage_tolerance, config.remainder_order)
    }

    /// Compute shares for `participants`, returned in supplied order
    pub fn compute(
        &self,
        total: Money,
        participants: &[UserId],
        split: &Split,
    ) -> Result<Vec<ParticipantShare>> {
        if participants.is_empty() {
            return Err(reject("no participants".to_string()));
        }
        if !total.is_positive() {
            return Err(reject(format!("total {} is not positive", total)));
        }

        let mut seen = HashSet::with_capacity(participants.len());
        if let Some(dup) = participants.iter().find(|id| !seen.insert(*id)) {
            return Err(reject(format!("participant {} listed twice", dup)));
        }

        let order = self.remainder_rank(participants);

        let amounts = match split {
            Split::Equal => equal_shares(total.minor(), &order)?,
            Split::Exact(amounts) => exact_shares(total, participants, amounts)?,
            Split::Percentage(percentages) => {
                self.percentage_shares(total.minor(), participants, percentages, &order)?
            }
        };

        debug!(
            method = %split.method(),
            total = %total,
            participants = participants.len(),
            "Split computed"
        );

        Ok(participants
            .iter()
            .zip(amounts)
            .map(|(id, amount)| ParticipantShare::new(id.clone(), Money::from_minor(amount)))
            .collect())
    }

    /// Participant indices in the order leftover units are handed out
    fn remainder_rank(&self, participants: &[UserId]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..participants.len()).collect();
        if self.remainder_order == RemainderOrder::UserId {
            order.sort_by(|&a, &b| participants[a].cmp(&participants[b]));
        }
        order
    }

    fn percentage_shares(
        &self,
        total: i64,
        participants: &[UserId],
        percentages: &[Decimal],
        order: &[usize],
    ) -> Result<Vec<i64>> {
        if percentages.len() != participants.len() {
            return Err(reject(format!(
                "{} percentages for {} participants",
                percentages.len(),
                participants.len()
            )));
        }

        if let Some((idx, pct)) = percentages
            .iter()
            .enumerate()
            .find(|(_, p)| p.is_sign_negative() && !p.is_zero())
        {
            return Err(reject(format!(
                "negative percentage {} for {}",
                pct, participants[idx]
            )));
        }

        let pct_sum = percentages
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(*p))
            .ok_or_else(|| reject("percentages overflow".to_string()))?;
        if (pct_sum - Decimal::ONE_HUNDRED).abs() > self.percentage_tolerance {
            return Err(reject(format!("percentages sum to {}, expected 100", pct_sum)));
        }

        // Bring every percentage to a common scale so the weights are integers
        let scale = percentages.iter().map(|p| p.scale()).max().unwrap_or(0);
        let weights = percentages
            .iter()
            .map(|p| {
                10i128
                    .checked_pow(scale - p.scale())
                    .and_then(|factor| p.mantissa().checked_mul(factor))
            })
            .collect::<Option<Vec<i128>>>()
            .ok_or_else(|| Error::overflow("scaling percentages"))?;
        let weight_sum = weights
            .iter()
            .try_fold(0i128, |acc, w| acc.checked_add(*w))
            .ok_or_else(|| Error::overflow("summing percentage weights"))?;
        if weight_sum == 0 {
            return Err(reject("all percentages are zero".to_string()));
        }

        // share_i = total * w_i / sum(w), floored, remainder kept for ranking
        let mut floors = Vec::with_capacity(weights.len());
        let mut remainders = Vec::with_capacity(weights.len());
        for w in &weights {
            let numerator = i128::from(total)
                .checked_mul(*w)
                .ok_or_else(|| Error::overflow("computing percentage share"))?;
            floors.push(numerator / weight_sum);
            remainders.push(numerator % weight_sum);
        }

        let floor_sum: i128 = floors.iter().sum();
        let leftover = i128::from(total) - floor_sum;

        let mut rank = vec![0usize; order.len()];
        for (position, &idx) in order.iter().enumerate() {
            rank[idx] = position;
        }
        let mut by_fraction: Vec<usize> = (0..weights.len()).collect();
        by_fraction.sort_by(|&a, &b| {
            remainders[b]
                .cmp(&remainders[a])
                .then(rank[a].cmp(&rank[b]))
        });

        for &idx in by_fraction.iter().take(leftover as usize) {
            debug!(participant = %participants[idx], "Leftover minor unit assigned");
            floors[idx] += 1;
        }

        floors
            .into_iter()
            .map(|share| {
                i64::try_from(share).map_err(|_| Error::overflow("narrowing percentage share"))
            })
            .collect()
    }
}

/// Compute shares with the default calculator
pub fn compute_split(
    total: Money,
    participants: &[UserId],
    split: &Split,
) -> Result<Vec<ParticipantShare>> {
    SplitCalculator::default().compute(total, participants, split)
}

fn equal_shares(total: i64, order: &[usize]) -> Result<Vec<i64>> {
    let n = i64::try_from(order.len()).map_err(|_| Error::overflow("counting participants"))?;
    let base = total / n;
    let remainder = total % n;

    let mut shares = vec![base; order.len()];
    for &idx in order.iter().take(remainder as usize) {
        shares[idx] += 1;
    }
    Ok(shares)
}

fn exact_shares(total: Money, participants: &[UserId], amounts: &[Money]) -> Result<Vec<i64>> {
    if amounts.len() != participants.len() {
        return Err(reject(format!(
            "{} amounts for {} participants",
            amounts.len(),
            participants.len()
        )));
    }

    if let Some((idx, amount)) = amounts.iter().enumerate().find(|(_, a)| a.is_negative()) {
        return Err(reject(format!(
            "negative share {} for {}",
            amount, participants[idx]
        )));
    }

    let sum = Money::checked_sum(amounts.iter().copied())
        .ok_or_else(|| Error::overflow("summing exact shares"))?;
    if sum != total {
        return Err(reject(format!(
            "exact shares sum to {}, expected {}",
            sum, total
        )));
    }

    Ok(amounts.iter().map(|a| a.minor()).collect())
}

fn reject(reason: String) -> Error {
    warn!(%reason, "Rejected split");
    Error::InvalidSplit { reason }
}
