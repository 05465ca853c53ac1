//! Core types for the settlement engine
//!
//! All money is carried as integer minor units ([`Money`]). Decimal strings
//! only appear at the presentation boundary (`Display` / `FromStr`).

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User identifier as issued by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Group identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Create new group ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed amount in minor currency units (cents)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero
    pub const ZERO: Money = Money(0);

    /// Minor units in one major unit
    pub const MINOR_PER_MAJOR: i64 = 100;

    /// Decimal places shown at the presentation boundary
    pub const SCALE: u32 = 2;

    /// Create from minor units
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Raw minor units
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Is zero
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Is strictly positive
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Is strictly negative
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Checked negation
    pub fn checked_neg(self) -> Option<Money> {
        self.0.checked_neg().map(Money)
    }

    /// Checked absolute value
    pub fn checked_abs(self) -> Option<Money> {
        self.0.checked_abs().map(Money)
    }

    /// Sum an iterator of amounts, `None` on overflow
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Convert a decimal major-unit amount (e.g. `12.34`) to minor units
    pub fn from_decimal(amount: Decimal) -> Result<Self> {
        let scaled = amount
            .checked_mul(Decimal::from(Self::MINOR_PER_MAJOR))
            .ok_or_else(|| Error::InvalidAmount(format!("{} is out of range", amount)))?;

        if !scaled.fract().is_zero() {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} decimal places",
                amount,
                Self::SCALE
            )));
        }

        scaled
            .to_i64()
            .map(Money)
            .ok_or_else(|| Error::InvalidAmount(format!("{} is out of range", amount)))
    }

    /// Decimal major-unit representation
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, Self::SCALE)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| Error::InvalidAmount(format!("'{}': {}", s, e)))?;
        Money::from_decimal(amount)
    }
}

/// How the shares of an expense were derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    /// Everyone pays the same amount
    Equal,
    /// Explicit amount per participant
    Exact,
    /// Explicit percentage per participant
    Percentage,
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Exact => "exact",
            SplitMethod::Percentage => "percentage",
        };
        write!(f, "{}", name)
    }
}

/// Expense category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    /// Uncategorised
    #[default]
    General,
    /// Food and dining
    Food,
    /// Transportation
    Transport,
    /// Entertainment
    Entertainment,
    /// Groceries
    Groceries,
    /// Utilities
    Utilities,
}

/// One participant's share of an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantShare {
    /// Participant
    pub user_id: UserId,

    /// Amount owed towards the expense, in minor units
    pub share_amount: Money,
}

impl ParticipantShare {
    /// Create new share
    pub fn new(user_id: impl Into<UserId>, share_amount: Money) -> Self {
        Self {
            user_id: user_id.into(),
            share_amount,
        }
    }
}

/// Immutable record of one shared cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    /// Expense ID
    pub id: Uuid,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Category
    #[serde(default)]
    pub category: ExpenseCategory,

    /// Total cost (negative only for reversals)
    pub total_amount: Money,

    /// User who fronted the money
    pub payer_id: UserId,

    /// Participant shares, in supplied order
    pub participants: Vec<ParticipantShare>,

    /// How the shares were derived
    pub split_method: SplitMethod,

    /// Owning group
    #[serde(default)]
    pub group_id: Option<GroupId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Expense this record reverses
    #[serde(default)]
    pub reverses: Option<Uuid>,
}

impl Expense {
    /// Whether this record reverses another expense
    pub fn is_reversal(&self) -> bool {
        self.reverses.is_some()
    }

    /// Share owed by `user`, if they participate
    pub fn share_of(&self, user: &UserId) -> Option<Money> {
        self.participants
            .iter()
            .find(|p| &p.user_id == user)
            .map(|p| p.share_amount)
    }

    /// Whether `user` paid for or participates in this expense
    pub fn involves(&self, user: &UserId) -> bool {
        &self.payer_id == user || self.participants.iter().any(|p| &p.user_id == user)
    }

    /// Check the record's own invariants
    ///
    /// Ordinary expenses have a positive total and non-negative shares;
    /// reversals have a negative total and non-positive shares. In both cases
    /// the shares sum exactly to the total.
    pub fn validate(&self) -> Result<()> {
        if self.participants.is_empty() {
            return Err(Error::unbalanced(format!(
                "expense {} has no participants",
                self.id
            )));
        }

        let mut seen = HashSet::with_capacity(self.participants.len());
        for share in &self.participants {
            if !seen.insert(&share.user_id) {
                return Err(Error::unbalanced(format!(
                    "expense {} lists participant {} twice",
                    self.id, share.user_id
                )));
            }
        }

        let reversal = self.is_reversal();
        if reversal && self.reverses == Some(self.id) {
            return Err(Error::unbalanced(format!(
                "expense {} reverses itself",
                self.id
            )));
        }

        let total_ok = if reversal {
            self.total_amount.is_negative()
        } else {
            self.total_amount.is_positive()
        };
        if !total_ok {
            return Err(Error::unbalanced(format!(
                "expense {} has total {} (reversal: {})",
                self.id, self.total_amount, reversal
            )));
        }

        for share in &self.participants {
            let share_ok = if reversal {
                !share.share_amount.is_positive()
            } else {
                !share.share_amount.is_negative()
            };
            if !share_ok {
                return Err(Error::unbalanced(format!(
                    "expense {} assigns share {} to {}",
                    self.id, share.share_amount, share.user_id
                )));
            }
        }

        let sum = Money::checked_sum(self.participants.iter().map(|p| p.share_amount))
            .ok_or_else(|| Error::overflow(format!("summing shares of expense {}", self.id)))?;
        if sum != self.total_amount {
            return Err(Error::unbalanced(format!(
                "expense {} shares sum to {}, total is {}",
                self.id, sum, self.total_amount
            )));
        }

        Ok(())
    }

    /// Build the reversing entry that cancels this expense
    pub fn reversal(&self, id: Uuid, created_at: DateTime<Utc>) -> Result<Expense> {
        if self.is_reversal() {
            return Err(Error::unbalanced(format!(
                "expense {} is itself a reversal",
                self.id
            )));
        }

        let negate = |amount: Money| {
            amount
                .checked_neg()
                .ok_or_else(|| Error::overflow(format!("negating expense {}", self.id)))
        };

        let participants = self
            .participants
            .iter()
            .map(|p| {
                Ok(ParticipantShare {
                    user_id: p.user_id.clone(),
                    share_amount: negate(p.share_amount)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Expense {
            id,
            description: format!("Reversal of {}", self.description),
            category: self.category,
            total_amount: negate(self.total_amount)?,
            payer_id: self.payer_id.clone(),
            participants,
            split_method: self.split_method,
            group_id: self.group_id.clone(),
            created_at,
            reverses: Some(self.id),
        })
    }
}

/// Money transferred outside the app to resolve balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Settlement ID
    pub id: Uuid,

    /// User who paid
    pub from_user_id: UserId,

    /// User who received
    pub to_user_id: UserId,

    /// Amount paid (positive)
    pub amount: Money,

    /// Payment date
    pub date: DateTime<Utc>,

    /// Group the payment was made in
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

impl Settlement {
    /// Create new settlement record
    pub fn new(
        from_user_id: impl Into<UserId>,
        to_user_id: impl Into<UserId>,
        amount: Money,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            from_user_id: from_user_id.into(),
            to_user_id: to_user_id.into(),
            amount,
            date,
            group_id: None,
        }
    }

    /// Check the record's own invariants
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(Error::unbalanced(format!(
                "settlement {} has non-positive amount {}",
                self.id, self.amount
            )));
        }
        if self.from_user_id == self.to_user_id {
            return Err(Error::unbalanced(format!(
                "settlement {} pays {} to themselves",
                self.id, self.from_user_id
            )));
        }
        Ok(())
    }

    /// Whether `user` paid or received this settlement
    pub fn involves(&self, user: &UserId) -> bool {
        &self.from_user_id == user || &self.to_user_id == user
    }
}

/// Suggested payment that reduces outstanding balances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Debtor (pays)
    pub from: UserId,

    /// Creditor (receives)
    pub to: UserId,

    /// Amount to pay
    pub amount: Money,
}

impl Transfer {
    /// Create new transfer
    pub fn new(from: impl Into<UserId>, to: impl Into<UserId>, amount: Money) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Record this transfer as an executed settlement
    pub fn to_settlement(&self, date: DateTime<Utc>, group_id: Option<GroupId>) -> Settlement {
        Settlement {
            group_id,
            ..Settlement::new(self.from.clone(), self.to.clone(), self.amount, date)
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.to, self.amount)
    }
}
