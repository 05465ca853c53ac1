//! Expense Settlement Engine
//!
//! Computes cent-exact expense splits, net balances between users and a
//! small set of transfers that settles a group.
//!
//! # Architecture
//!
//! The engine is pure: it receives a consistent ledger snapshot and returns
//! plain data. It performs no I/O of its own apart from the convenience
//! loaders on [`Config`] and [`LedgerSnapshot`].
//!
//! 1. **Split**: turn a total into integer shares that sum exactly to it
//! 2. **Aggregate**: fold expenses and settlements into signed balances
//! 3. **Net**: greedily match debtors with creditors
//!
//! # Invariants
//!
//! - Money is integer minor units end to end; no floating point
//! - Shares of every expense sum exactly to its total
//! - Net positions of a ledger always sum to zero
//! - Same records in any order produce the same balances
//!
//! # Example
//!
//! ```
//! use settlement::{Config, Money, SettlementEngine, Split, UserId};
//!
//! # fn main() -> settlement::Result<()> {
//! let engine = SettlementEngine::new(Config::default())?;
//! let people = [UserId::new("alice"), UserId::new("bob"), UserId::new("carol")];
//!
//! let shares = engine.compute_split(Money::from_minor(100), &people, &Split::Equal)?;
//! let amounts: Vec<i64> = shares.iter().map(|s| s.share_amount.minor()).collect();
//! assert_eq!(amounts, vec![34, 33, 33]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod netting;
pub mod split;
pub mod types;

// Re-exports
pub use balance::{aggregate_balances, BalanceSummary, Balances};
pub use config::Config;
pub use engine::{NewExpense, SettlementEngine, SettlementPlan};
pub use error::{Error, Result};
pub use ledger::LedgerSnapshot;
pub use netting::{minimal_settlement, NettingStats};
pub use split::{compute_split, Split};
pub use types::*;
