//! Property-based tests for settlement invariants
//!
//! These tests use proptest to verify:
//! - Exact splits: shares always sum to the total
//! - Order independence: same records in any order → same balances
//! - Conservation: netting zeroes every position in at most n - 1 transfers
//! - Round trip: recording a plan as settlements leaves nothing owed

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use settlement::{
    aggregate_balances, balance::net_positions, compute_split, minimal_settlement,
    netting::apply_transfers, Balances, Expense, ExpenseCategory, LedgerSnapshot, Money,
    Settlement, Split, UserId,
};
use uuid::Uuid;

const USERS: [&str; 6] = ["ana", "ben", "cai", "dev", "eli", "fay"];

fn user(idx: usize) -> UserId {
    UserId::new(USERS[idx % USERS.len()])
}

/// Strategy for a participant list of 1..=6 distinct users
fn participants_strategy() -> impl Strategy<Value = Vec<UserId>> {
    (1u8..64u8).prop_map(|mask| {
        (0..USERS.len())
            .filter(|i| mask & (1 << i) != 0)
            .map(user)
            .collect()
    })
}

/// Strategy for percentages (two decimal places) that sum to exactly 100
fn percentages_strategy(n: usize) -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(0i64..=10_000, n.saturating_sub(1)).prop_map(move |mut cuts| {
        cuts.sort_unstable();
        let mut previous = 0;
        let mut percentages = Vec::with_capacity(n);
        for cut in cuts.into_iter().chain(std::iter::once(10_000)) {
            percentages.push(Decimal::new(cut - previous, 2));
            previous = cut;
        }
        percentages
    })
}

/// Strategy for a valid equal-split expense
fn expense_strategy() -> impl Strategy<Value = Expense> {
    (0usize..USERS.len(), participants_strategy(), 1i64..100_000, 0i64..1_000_000).prop_map(
        |(payer, participants, total, offset)| {
            let total = Money::from_minor(total);
            let shares = compute_split(total, &participants, &Split::Equal).unwrap();
            Expense {
                id: Uuid::new_v4(),
                description: "generated".to_string(),
                category: ExpenseCategory::General,
                total_amount: total,
                payer_id: user(payer),
                participants: shares,
                split_method: settlement::SplitMethod::Equal,
                group_id: None,
                created_at: Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap(),
                reverses: None,
            }
        },
    )
}

/// Strategy for a valid settlement between two distinct users
fn settlement_strategy() -> impl Strategy<Value = Settlement> {
    (0usize..USERS.len(), 1usize..USERS.len(), 1i64..50_000).prop_map(|(from, step, amount)| {
        Settlement::new(
            user(from),
            user(from + step),
            Money::from_minor(amount),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
    })
}

/// Strategy for positions that sum to zero
fn positions_strategy() -> impl Strategy<Value = Balances> {
    prop::collection::vec(-100_000i64..100_000, 1..USERS.len()).prop_map(|amounts| {
        let mut positions: Balances = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| (user(i), Money::from_minor(*amount)))
            .collect();
        let last: i64 = amounts.iter().sum();
        positions.insert(user(amounts.len()), Money::from_minor(-last));
        positions
    })
}

fn share_sum(shares: &[settlement::ParticipantShare]) -> i64 {
    shares.iter().map(|s| s.share_amount.minor()).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: equal shares sum to the total and differ by at most one unit
    #[test]
    fn prop_equal_split_exact(total in 1i64..10_000_000, participants in participants_strategy()) {
        let shares = compute_split(Money::from_minor(total), &participants, &Split::Equal).unwrap();

        prop_assert_eq!(share_sum(&shares), total);
        let max = shares.iter().map(|s| s.share_amount).max().unwrap();
        let min = shares.iter().map(|s| s.share_amount).min().unwrap();
        prop_assert!(max.minor() - min.minor() <= 1);
    }

    /// Property: percentage shares summing to 100 reproduce the total exactly
    #[test]
    fn prop_percentage_split_exact(
        total in 1i64..10_000_000,
        (participants, percentages) in participants_strategy()
            .prop_flat_map(|p| {
                let n = p.len();
                (Just(p), percentages_strategy(n))
            }),
    ) {
        let shares = compute_split(
            Money::from_minor(total),
            &participants,
            &Split::Percentage(percentages),
        )
        .unwrap();

        prop_assert_eq!(share_sum(&shares), total);
        prop_assert!(shares.iter().all(|s| !s.share_amount.is_negative()));
    }

    /// Property: aggregation does not depend on record order
    #[test]
    fn prop_aggregation_order_independent(
        (expenses, shuffled) in prop::collection::vec(expense_strategy(), 0..12)
            .prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle())),
        settlements in prop::collection::vec(settlement_strategy(), 0..6),
        perspective in 0usize..USERS.len(),
    ) {
        let mut reversed_settlements = settlements.clone();
        reversed_settlements.reverse();

        let me = user(perspective);
        prop_assert_eq!(
            aggregate_balances(&expenses, &settlements, &me).unwrap(),
            aggregate_balances(&shuffled, &reversed_settlements, &me).unwrap()
        );
    }

    /// Property: splitting one expense into two halves leaves balances unchanged
    #[test]
    fn prop_aggregation_invariant_under_expense_split(
        payer in 0usize..USERS.len(),
        participants in participants_strategy(),
        shares in prop::collection::vec(2i64..10_000, USERS.len()),
        perspective in 0usize..USERS.len(),
    ) {
        let build = |amounts: Vec<i64>| {
            let participants: Vec<settlement::ParticipantShare> = participants
                .iter()
                .zip(amounts)
                .map(|(id, amount)| settlement::ParticipantShare::new(id.clone(), Money::from_minor(amount)))
                .collect();
            Expense {
                id: Uuid::new_v4(),
                description: String::new(),
                category: ExpenseCategory::General,
                total_amount: Money::from_minor(share_sum(&participants)),
                payer_id: user(payer),
                participants,
                split_method: settlement::SplitMethod::Exact,
                group_id: None,
                created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                reverses: None,
            }
        };

        let whole = build(shares.clone());
        let first = build(shares.iter().map(|s| s / 2).collect());
        let second = build(shares.iter().map(|s| s - s / 2).collect());

        let me = user(perspective);
        prop_assert_eq!(
            aggregate_balances(&[whole], &[], &me).unwrap(),
            aggregate_balances(&[first, second], &[], &me).unwrap()
        );
    }

    /// Property: netting zeroes every position in at most n - 1 transfers
    #[test]
    fn prop_minimal_settlement_conserves(positions in positions_strategy()) {
        let transfers = minimal_settlement(&positions).unwrap();

        let after = apply_transfers(&positions, &transfers).unwrap();
        prop_assert!(after.values().all(|a| a.is_zero()));

        let nonzero = positions.values().filter(|a| !a.is_zero()).count();
        prop_assert!(transfers.len() <= nonzero.saturating_sub(1));
        prop_assert!(transfers.iter().all(|t| t.amount.is_positive() && t.from != t.to));
    }

    /// Property: recording the plan as settlements leaves nothing owed
    #[test]
    fn prop_round_trip_settles_everything(
        expenses in prop::collection::vec(expense_strategy(), 1..10),
        settlements in prop::collection::vec(settlement_strategy(), 0..4),
    ) {
        let mut ledger = LedgerSnapshot::new(expenses, settlements);
        let positions = ledger.net_positions().unwrap();
        let transfers = minimal_settlement(&positions).unwrap();

        ledger
            .record_transfers(&transfers, Utc.timestamp_opt(1_800_000_000, 0).unwrap(), None)
            .unwrap();

        let after = net_positions(&ledger.expenses, &ledger.settlements).unwrap();
        prop_assert!(after.values().all(|a| a.is_zero()));

        // Every user's balances against counterparts net out to zero
        for idx in 0..USERS.len() {
            let balances = ledger.balances_for(&user(idx)).unwrap();
            prop_assert_eq!(
                Money::checked_sum(balances.values().copied()),
                Some(Money::ZERO)
            );
        }
    }
}
