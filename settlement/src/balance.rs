//! Balance aggregation
//!
//! Every expense and settlement is reduced to directed debt edges
//! `(debtor, creditor, amount)`:
//!
//! ```text
//! expense: alice pays 90 for {alice, bob, carol}, 30 each
//!   bob   -> alice  30
//!   carol -> alice  30          (alice's own share is skipped)
//!
//! settlement: bob pays alice 30
//!   alice -> bob    30          (cancels bob's debt)
//! ```
//!
//! Edges are then summed with plain integer addition, so the result does not
//! depend on the order records are supplied in.
//!
//! # Sign conventions
//!
//! - [`aggregate_balances`]: positive = the perspective user owes the
//!   counterpart, negative = the counterpart owes the perspective user.
//! - [`net_positions`]: positive = the user is owed money (creditor),
//!   negative = the user owes money (debtor).

use crate::{
    types::{Expense, Money, Settlement, Transfer, UserId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Net balances keyed by user
pub type Balances = BTreeMap<UserId, Money>;

/// Directed debt edge: debtor owes creditor `amount`
type DebtEdge<'a> = (&'a UserId, &'a UserId, Money);

/// Validate every record, then flatten the ledger into debt edges
fn debt_edges<'a>(
    expenses: &'a [Expense],
    settlements: &'a [Settlement],
) -> Result<Vec<DebtEdge<'a>>> {
    for expense in expenses {
        expense.validate().inspect_err(|e| warn!(error = %e, "Rejected expense"))?;
    }
    for settlement in settlements {
        settlement
            .validate()
            .inspect_err(|e| warn!(error = %e, "Rejected settlement"))?;
    }

    let from_expenses = expenses.iter().flat_map(|expense| {
        expense
            .participants
            .iter()
            .filter(move |share| share.user_id != expense.payer_id)
            .map(move |share| (&share.user_id, &expense.payer_id, share.share_amount))
    });

    // A settlement from -> to is a debt edge to -> from
    let from_settlements = settlements
        .iter()
        .map(|s| (&s.to_user_id, &s.from_user_id, s.amount));

    Ok(from_expenses.chain(from_settlements).collect())
}

fn credit(balances: &mut Balances, user: &UserId, amount: Money) -> Result<()> {
    let entry = balances.entry(user.clone()).or_insert(Money::ZERO);
    *entry = entry
        .checked_add(amount)
        .ok_or_else(|| Error::overflow(format!("aggregating balance of {}", user)))?;
    Ok(())
}

fn debit(balances: &mut Balances, user: &UserId, amount: Money) -> Result<()> {
    let negated = amount
        .checked_neg()
        .ok_or_else(|| Error::overflow(format!("aggregating balance of {}", user)))?;
    credit(balances, user, negated)
}

/// Net balance of `perspective` against each counterpart
///
/// Counterparts whose balance nets to zero are omitted.
pub fn aggregate_balances(
    expenses: &[Expense],
    settlements: &[Settlement],
    perspective: &UserId,
) -> Result<Balances> {
    let mut balances = Balances::new();

    for (debtor, creditor, amount) in debt_edges(expenses, settlements)? {
        if debtor == perspective {
            credit(&mut balances, creditor, amount)?;
        } else if creditor == perspective {
            debit(&mut balances, debtor, amount)?;
        }
    }

    balances.retain(|_, amount| !amount.is_zero());
    Ok(balances)
}

/// Net position of every user appearing in the ledger
pub fn net_positions(expenses: &[Expense], settlements: &[Settlement]) -> Result<Balances> {
    let mut positions = Balances::new();

    for (debtor, creditor, amount) in debt_edges(expenses, settlements)? {
        credit(&mut positions, creditor, amount)?;
        debit(&mut positions, debtor, amount)?;
    }

    // Users who only paid for themselves still appear, at zero
    for expense in expenses {
        positions.entry(expense.payer_id.clone()).or_insert(Money::ZERO);
    }

    Ok(positions)
}

/// Pairwise settlement without simplification
///
/// One transfer per pair of users with a nonzero net debt, ordered by
/// `(from, to)`.
pub fn pairwise_debts(expenses: &[Expense], settlements: &[Settlement]) -> Result<Vec<Transfer>> {
    // Key is (lower id, higher id); positive = lower owes higher
    let mut pairs: BTreeMap<(&UserId, &UserId), Money> = BTreeMap::new();

    for (debtor, creditor, amount) in debt_edges(expenses, settlements)? {
        let (key, signed) = if debtor < creditor {
            ((debtor, creditor), Some(amount))
        } else {
            ((creditor, debtor), amount.checked_neg())
        };
        let signed = signed.ok_or_else(|| Error::overflow("netting pairwise debts"))?;
        let entry = pairs.entry(key).or_insert(Money::ZERO);
        *entry = entry
            .checked_add(signed)
            .ok_or_else(|| Error::overflow("netting pairwise debts"))?;
    }

    let mut transfers = Vec::new();
    for ((low, high), net) in pairs {
        if net.is_positive() {
            transfers.push(Transfer::new(low.clone(), high.clone(), net));
        } else if net.is_negative() {
            let amount = net
                .checked_abs()
                .ok_or_else(|| Error::overflow("netting pairwise debts"))?;
            transfers.push(Transfer::new(high.clone(), low.clone(), amount));
        }
    }
    transfers.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

    Ok(transfers)
}

/// Which way money flows for one counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceDirection {
    /// Counterpart owes the user
    OwesYou,
    /// User owes the counterpart
    YouOwe,
}

/// One counterpart in a balance summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    /// Counterpart
    pub counterpart: UserId,

    /// Outstanding amount (always positive)
    pub amount: Money,

    /// Direction
    pub direction: BalanceDirection,
}

/// A user's outstanding balances, ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Perspective user
    pub user: UserId,

    /// Per-counterpart entries, ordered by counterpart id
    pub entries: Vec<BalanceEntry>,

    /// Sum of everything the user owes
    pub total_you_owe: Money,

    /// Sum of everything owed to the user
    pub total_owed_to_you: Money,
}

impl BalanceSummary {
    /// Build from the output of [`aggregate_balances`]
    pub fn from_balances(user: UserId, balances: &Balances) -> Result<Self> {
        let mut entries = Vec::with_capacity(balances.len());
        let mut total_you_owe = Money::ZERO;
        let mut total_owed_to_you = Money::ZERO;

        for (counterpart, &net) in balances {
            if net.is_zero() {
                continue;
            }
            let amount = net
                .checked_abs()
                .ok_or_else(|| Error::overflow(format!("summarising balance with {}", counterpart)))?;
            let (direction, total) = if net.is_positive() {
                (BalanceDirection::YouOwe, &mut total_you_owe)
            } else {
                (BalanceDirection::OwesYou, &mut total_owed_to_you)
            };
            *total = total
                .checked_add(amount)
                .ok_or_else(|| Error::overflow("summarising balances"))?;
            entries.push(BalanceEntry {
                counterpart: counterpart.clone(),
                amount,
                direction,
            });
        }

        Ok(Self {
            user,
            entries,
            total_you_owe,
            total_owed_to_you,
        })
    }

    /// Nothing owed in either direction
    pub fn is_settled_up(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExpenseCategory, ParticipantShare, SplitMethod};
    use chrono::Utc;
    use uuid::Uuid;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn expense(payer: &str, shares: &[(&str, i64)]) -> Expense {
        let participants: Vec<ParticipantShare> = shares
            .iter()
            .map(|(id, amount)| ParticipantShare::new(*id, Money::from_minor(*amount)))
            .collect();
        Expense {
            id: Uuid::now_v7(),
            description: String::new(),
            category: ExpenseCategory::General,
            total_amount: Money::from_minor(shares.iter().map(|(_, a)| a).sum()),
            payer_id: user(payer),
            participants,
            split_method: SplitMethod::Exact,
            group_id: None,
            created_at: Utc::now(),
            reverses: None,
        }
    }

    fn balances(entries: &[(&str, i64)]) -> Balances {
        entries
            .iter()
            .map(|(id, amount)| (user(id), Money::from_minor(*amount)))
            .collect()
    }

    fn trip() -> Vec<Expense> {
        vec![
            expense("A", &[("A", 30), ("B", 30), ("C", 30)]),
            expense("B", &[("B", 15), ("C", 15)]),
        ]
    }

    #[test]
    fn test_aggregate_from_each_perspective() {
        let expenses = trip();

        assert_eq!(
            aggregate_balances(&expenses, &[], &user("A")).unwrap(),
            balances(&[("B", -30), ("C", -30)])
        );
        assert_eq!(
            aggregate_balances(&expenses, &[], &user("B")).unwrap(),
            balances(&[("A", 30), ("C", -15)])
        );
        assert_eq!(
            aggregate_balances(&expenses, &[], &user("C")).unwrap(),
            balances(&[("A", 30), ("B", 15)])
        );
    }

    #[test]
    fn test_settlement_reduces_debt_and_zero_is_omitted() {
        let expenses = trip();
        let settlements = vec![Settlement::new("B", "A", Money::from_minor(30), Utc::now())];

        let from_a = aggregate_balances(&expenses, &settlements, &user("A")).unwrap();
        assert_eq!(from_a, balances(&[("C", -30)]));

        let from_b = aggregate_balances(&expenses, &settlements, &user("B")).unwrap();
        assert_eq!(from_b, balances(&[("C", -15)]));
    }

    #[test]
    fn test_overpaying_settlement_flips_direction() {
        let expenses = trip();
        let settlements = vec![Settlement::new("C", "A", Money::from_minor(40), Utc::now())];

        let from_a = aggregate_balances(&expenses, &settlements, &user("A")).unwrap();
        assert_eq!(from_a, balances(&[("B", -30), ("C", 10)]));
    }

    #[test]
    fn test_net_positions_sum_to_zero() {
        let positions = net_positions(&trip(), &[]).unwrap();
        assert_eq!(positions, balances(&[("A", 60), ("B", -15), ("C", -45)]));
        assert_eq!(
            Money::checked_sum(positions.values().copied()),
            Some(Money::ZERO)
        );
    }

    #[test]
    fn test_net_positions_include_self_only_payers() {
        let expenses = vec![expense("D", &[("D", 500)])];
        let positions = net_positions(&expenses, &[]).unwrap();
        assert_eq!(positions, balances(&[("D", 0)]));
    }

    #[test]
    fn test_reversal_cancels_expense() {
        let original = expense("A", &[("A", 30), ("B", 30), ("C", 30)]);
        let reversal = original.reversal(Uuid::now_v7(), Utc::now()).unwrap();

        let balances = aggregate_balances(&[original, reversal], &[], &user("A")).unwrap();
        assert!(balances.is_empty());
    }

    #[test]
    fn test_inconsistent_expense_is_unbalanced_ledger() {
        let mut broken = expense("A", &[("A", 50), ("B", 50)]);
        broken.total_amount = Money::from_minor(90);

        let err = aggregate_balances(&[broken], &[], &user("A")).unwrap_err();
        assert!(matches!(err, Error::UnbalancedLedger { .. }));
    }

    #[test]
    fn test_pairwise_debts() {
        let transfers = pairwise_debts(&trip(), &[]).unwrap();
        assert_eq!(
            transfers,
            vec![
                Transfer::new("B", "A", Money::from_minor(30)),
                Transfer::new("C", "A", Money::from_minor(30)),
                Transfer::new("C", "B", Money::from_minor(15)),
            ]
        );
    }

    #[test]
    fn test_balance_summary() {
        let balances = aggregate_balances(&trip(), &[], &user("B")).unwrap();
        let summary = BalanceSummary::from_balances(user("B"), &balances).unwrap();

        assert_eq!(summary.total_you_owe, Money::from_minor(30));
        assert_eq!(summary.total_owed_to_you, Money::from_minor(15));
        assert_eq!(
            summary.entries,
            vec![
                BalanceEntry {
                    counterpart: user("A"),
                    amount: Money::from_minor(30),
                    direction: BalanceDirection::YouOwe,
                },
                BalanceEntry {
                    counterpart: user("C"),
                    amount: Money::from_minor(15),
                    direction: BalanceDirection::OwesYou,
                },
            ]
        );
        assert!(!summary.is_settled_up());

        let json = serde_json::to_value(&summary.entries[0]).unwrap();
        assert_eq!(json["direction"], "you_owe");
    }
}
