//! Main settlement engine
//!
//! Orchestrates split computation, balance aggregation and netting. The
//! engine holds only configuration; every call receives the ledger snapshot
//! and perspective user explicitly, so one engine can be shared across
//! threads.

use crate::{
    balance::{self, BalanceSummary, Balances},
    config::Config,
    ledger::LedgerSnapshot,
    netting::{self, NettingEngine, NettingStats},
    split::{Split, SplitCalculator},
    types::*,
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Input of the add-expense flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Category
    #[serde(default)]
    pub category: ExpenseCategory,

    /// Total cost in minor units
    pub total_amount: Money,

    /// User who paid
    pub payer_id: UserId,

    /// Participants, in the order remainders are assigned
    pub participant_ids: Vec<UserId>,

    /// Split specification
    pub split: Split,

    /// Owning group
    #[serde(default)]
    pub group_id: Option<GroupId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Suggested transfers for a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    /// Net position of every user (positive = owed money)
    pub positions: Balances,

    /// Transfers that zero every position, in execution order
    pub transfers: Vec<Transfer>,

    /// Comparison against pairwise settlement
    pub stats: NettingStats,
}

/// Settlement engine
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    /// Split calculator
    splitter: SplitCalculator,

    /// Netting engine
    netting: NettingEngine,

    /// Configuration
    config: Config,
}

impl SettlementEngine {
    /// Create new settlement engine
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let splitter = SplitCalculator::from_config(&config.split);
        let netting = NettingEngine::new(config.netting.max_participants);

        Ok(Self {
            splitter,
            netting,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shares of `total` between `participants`
    pub fn compute_split(
        &self,
        total: Money,
        participants: &[UserId],
        split: &Split,
    ) -> Result<Vec<ParticipantShare>> {
        self.splitter.compute(total, participants, split)
    }

    /// Build a validated expense record from the add-expense flow
    pub fn create_expense(&self, request: NewExpense) -> Result<Expense> {
        let participants =
            self.compute_split(request.total_amount, &request.participant_ids, &request.split)?;

        let expense = Expense {
            id: Uuid::now_v7(),
            description: request.description,
            category: request.category,
            total_amount: request.total_amount,
            payer_id: request.payer_id,
            participants,
            split_method: request.split.method(),
            group_id: request.group_id,
            created_at: request.created_at,
            reverses: None,
        };
        expense.validate()?;

        info!(
            expense = %expense.id,
            payer = %expense.payer_id,
            total = %expense.total_amount,
            method = %expense.split_method,
            "Expense created"
        );
        Ok(expense)
    }

    /// Net balances of `perspective` against each counterpart
    ///
    /// Positive = `perspective` owes the counterpart.
    pub fn aggregate_balances(
        &self,
        expenses: &[Expense],
        settlements: &[Settlement],
        perspective: &UserId,
    ) -> Result<Balances> {
        balance::aggregate_balances(expenses, settlements, perspective)
    }

    /// Display-ready balances of `user` across the snapshot
    pub fn balance_summary(&self, ledger: &LedgerSnapshot, user: &UserId) -> Result<BalanceSummary> {
        ledger.validate()?;
        let balances = ledger.balances_for(user)?;
        let summary = BalanceSummary::from_balances(user.clone(), &balances)?;

        info!(
            user = %user,
            counterparts = summary.entries.len(),
            you_owe = %summary.total_you_owe,
            owed_to_you = %summary.total_owed_to_you,
            "Balance summary computed"
        );
        Ok(summary)
    }

    /// Transfers that zero `positions` (positive = creditor)
    pub fn minimal_settlement(&self, positions: &Balances) -> Result<Vec<Transfer>> {
        self.netting.settle(positions)
    }

    /// Net positions, transfers and statistics for a whole snapshot
    pub fn plan(&self, ledger: &LedgerSnapshot) -> Result<SettlementPlan> {
        ledger.validate()?;

        let positions = ledger.net_positions()?;
        let transfers = self.minimal_settlement(&positions)?;

        let remaining = netting::apply_transfers(&positions, &transfers)?;
        if let Some((user, amount)) = remaining.iter().find(|(_, a)| !a.is_zero()) {
            return Err(Error::unbalanced(format!(
                "plan leaves {} at {}",
                user, amount
            )));
        }

        let pairwise = balance::pairwise_debts(&ledger.expenses, &ledger.settlements)?;
        let stats = NettingStats::compute(&positions, &pairwise, &transfers)?;

        info!(
            participants = stats.participant_count,
            transfers = stats.transfer_count,
            eliminated = stats.transfers_eliminated,
            total = %stats.total_transferred,
            "Settlement plan computed"
        );

        Ok(SettlementPlan {
            positions,
            transfers,
            stats,
        })
    }
}
