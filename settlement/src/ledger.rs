//! Ledger snapshot
//!
//! A read-only, consistent view of expense and settlement records handed to
//! the engine by the persistence layer. Records are append-only: corrections
//! arrive as reversing expenses and payments as settlements.

use crate::{
    balance::{self, Balances},
    types::{Expense, GroupId, Money, Settlement, Transfer, UserId},
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot of all expense and settlement records for a group or user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Expense records, including reversals
    #[serde(default)]
    pub expenses: Vec<Expense>,

    /// Settlement records
    #[serde(default)]
    pub settlements: Vec<Settlement>,
}

impl LedgerSnapshot {
    /// Create new snapshot
    pub fn new(expenses: Vec<Expense>, settlements: Vec<Settlement>) -> Self {
        Self {
            expenses,
            settlements,
        }
    }

    /// Parse a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON snapshot from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check every record and the cross-record invariants
    ///
    /// Ids are unique, each reversal points at an existing ordinary expense
    /// with the same payer and participants, and no expense is reversed twice.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.expenses.len() + self.settlements.len());
        for expense in &self.expenses {
            expense.validate()?;
            if !ids.insert(expense.id) {
                return Err(duplicate(expense.id));
            }
        }
        for settlement in &self.settlements {
            settlement.validate()?;
            if !ids.insert(settlement.id) {
                return Err(duplicate(settlement.id));
            }
        }

        let by_id: HashMap<Uuid, &Expense> = self.expenses.iter().map(|e| (e.id, e)).collect();
        let mut reversed = HashSet::new();
        for reversal in self.expenses.iter().filter(|e| e.is_reversal()) {
            let Some(target_id) = reversal.reverses else {
                continue;
            };
            let target = by_id.get(&target_id).ok_or_else(|| {
                Error::unbalanced(format!(
                    "expense {} reverses unknown expense {}",
                    reversal.id, target_id
                ))
            })?;
            if target.is_reversal() {
                return Err(Error::unbalanced(format!(
                    "expense {} reverses reversal {}",
                    reversal.id, target_id
                )));
            }
            if !reversed.insert(target_id) {
                return Err(Error::unbalanced(format!(
                    "expense {} is reversed more than once",
                    target_id
                )));
            }
            if !mirrors(reversal, target) {
                return Err(Error::unbalanced(format!(
                    "expense {} does not mirror expense {}",
                    reversal.id, target_id
                )));
            }
        }

        debug!(
            expenses = self.expenses.len(),
            settlements = self.settlements.len(),
            "Ledger snapshot validated"
        );
        Ok(())
    }

    /// Records belonging to `group`
    pub fn for_group(&self, group: &GroupId) -> LedgerSnapshot {
        LedgerSnapshot {
            expenses: self
                .expenses
                .iter()
                .filter(|e| e.group_id.as_ref() == Some(group))
                .cloned()
                .collect(),
            settlements: self
                .settlements
                .iter()
                .filter(|s| s.group_id.as_ref() == Some(group))
                .cloned()
                .collect(),
        }
    }

    /// Net balances of `user` against each counterpart
    pub fn balances_for(&self, user: &UserId) -> Result<Balances> {
        balance::aggregate_balances(&self.expenses, &self.settlements, user)
    }

    /// Net position of every user in the snapshot
    pub fn net_positions(&self) -> Result<Balances> {
        balance::net_positions(&self.expenses, &self.settlements)
    }

    /// Sum of all expense totals, reversals included
    pub fn total_expenses(&self) -> Result<Money> {
        Money::checked_sum(self.expenses.iter().map(|e| e.total_amount))
            .ok_or_else(|| Error::overflow("summing expense totals"))
    }

    /// Most recent expenses `user` paid for or participates in, newest first
    ///
    /// Reversed expenses and their reversals are left out.
    pub fn recent_expenses(&self, user: &UserId, limit: usize) -> Vec<&Expense> {
        let reversed: HashSet<Uuid> = self.expenses.iter().filter_map(|e| e.reverses).collect();

        let mut recent: Vec<&Expense> = self
            .expenses
            .iter()
            .filter(|e| e.involves(user) && !e.is_reversal() && !reversed.contains(&e.id))
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        recent.truncate(limit);
        recent
    }

    /// Append a reversing entry for expense `id`
    pub fn reverse_expense(&mut self, id: Uuid, at: DateTime<Utc>) -> Result<&Expense> {
        if self.expenses.iter().any(|e| e.reverses == Some(id)) {
            warn!(expense = %id, "Expense already reversed");
            return Err(Error::unbalanced(format!("expense {} is already reversed", id)));
        }
        let original = self
            .expenses
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::unbalanced(format!("expense {} not found", id)))?;

        let reversal = original.reversal(Uuid::now_v7(), at)?;
        self.expenses.push(reversal);
        self.expenses
            .last()
            .ok_or_else(|| Error::unbalanced("reversal was not recorded"))
    }

    /// Record executed transfers as settlements
    pub fn record_transfers(
        &mut self,
        transfers: &[Transfer],
        date: DateTime<Utc>,
        group: Option<&GroupId>,
    ) -> Result<Vec<Uuid>> {
        let settlements: Vec<Settlement> = transfers
            .iter()
            .map(|t| t.to_settlement(date, group.cloned()))
            .collect();
        for settlement in &settlements {
            settlement.validate()?;
        }

        let ids = settlements.iter().map(|s| s.id).collect();
        self.settlements.extend(settlements);
        Ok(ids)
    }
}

fn duplicate(id: Uuid) -> Error {
    Error::unbalanced(format!("record id {} appears more than once", id))
}

/// Same payer and participants with every amount negated
fn mirrors(reversal: &Expense, target: &Expense) -> bool {
    reversal.payer_id == target.payer_id
        && reversal.total_amount.checked_neg() == Some(target.total_amount)
        && reversal.participants.len() == target.participants.len()
        && reversal
            .participants
            .iter()
            .zip(&target.participants)
            .all(|(r, t)| {
                r.user_id == t.user_id && r.share_amount.checked_neg() == Some(t.share_amount)
            })
}
