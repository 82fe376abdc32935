// SPDX-License-Identifier: MIT
//! Property-based tests for the ticket lifecycle machine.
//!
//! 1. Random valid-transition walks visit only modelled statuses and stop
//!    at terminal states.
//! 2. Terminal statuses accept no further transitions; OPEN is entry-only.
//! 3. Status labels round-trip through the string form stored in SQLite.
//! 4. Ticket numbers keep their fixed shape for any company id and suffix.
//!
//! Run with: cargo test --test proptest_lifecycle

use deskd::tickets::machine;
use deskd::tickets::model::TicketStatus;
use deskd::tickets::number;
use proptest::prelude::*;

const ALL_STATUSES: &[TicketStatus] = &[
    TicketStatus::Open,
    TicketStatus::InProgress,
    TicketStatus::PendingCustomer,
    TicketStatus::Resolved,
    TicketStatus::Closed,
    TicketStatus::Cancelled,
];

fn valid_next_states(from: TicketStatus) -> Vec<TicketStatus> {
    ALL_STATUSES
        .iter()
        .copied()
        .filter(|to| machine::valid_transition(from, *to))
        .collect()
}

proptest! {
    /// Any walk that follows valid edges from OPEN visits only modelled
    /// statuses and halts exactly when it reaches a terminal one.
    #[test]
    fn valid_walks_stay_valid(
        step_count in 1_usize..100,
        pick in any::<u64>(),
    ) {
        let mut current = TicketStatus::Open;
        for step in 0..step_count {
            let nexts = valid_next_states(current);
            if nexts.is_empty() {
                prop_assert!(
                    current.is_terminal(),
                    "{current:?} has no exits but is not terminal"
                );
                break;
            }
            // Pick the next state deterministically from the seed and step
            let next = nexts[(pick as usize).wrapping_add(step) % nexts.len()];
            prop_assert!(machine::ensure(current, next).is_ok());
            // Only working statuses occupy an agent slot
            if next.occupies_agent() {
                prop_assert!(
                    matches!(next, TicketStatus::InProgress | TicketStatus::PendingCustomer),
                    "{next:?} should not hold an agent slot"
                );
            }
            current = next;
        }
    }

    /// Terminal statuses (CLOSED, CANCELLED) have NO valid transitions.
    #[test]
    fn terminal_statuses_have_no_exits(
        from_idx in 0_usize..2,
        to_idx in 0_usize..6,
    ) {
        let terminals = [TicketStatus::Closed, TicketStatus::Cancelled];
        let from = terminals[from_idx % terminals.len()];
        let to = ALL_STATUSES[to_idx % ALL_STATUSES.len()];
        prop_assert!(!machine::valid_transition(from, to));
        prop_assert!(machine::ensure(from, to).is_err());
    }

    /// Nothing transitions back to OPEN — it is strictly the entry status.
    #[test]
    fn open_has_no_inbound_edges(from_idx in 0_usize..6) {
        let from = ALL_STATUSES[from_idx % ALL_STATUSES.len()];
        prop_assert!(!machine::valid_transition(from, TicketStatus::Open));
    }

    /// No status can transition to itself.
    #[test]
    fn no_self_transitions(idx in 0_usize..6) {
        let status = ALL_STATUSES[idx % ALL_STATUSES.len()];
        prop_assert!(!machine::valid_transition(status, status));
    }

    /// Both working statuses can wrap a ticket up in a single step, without
    /// an intermediate reactivation or resolve.
    #[test]
    fn working_statuses_close_directly(idx in 0_usize..2) {
        let from = [TicketStatus::InProgress, TicketStatus::PendingCustomer][idx];
        prop_assert!(machine::valid_transition(from, TicketStatus::Resolved));
        prop_assert!(machine::valid_transition(from, TicketStatus::Closed));
    }

    /// Status labels round-trip through parse/as_str.
    #[test]
    fn status_labels_round_trip(idx in 0_usize..6) {
        let status = ALL_STATUSES[idx % ALL_STATUSES.len()];
        prop_assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
    }
}

// ─── Ticket number shape ─────────────────────────────────────────────────────

proptest! {
    /// For any company and suffix the generated number is 18 characters:
    /// 'T', two company digits, twelve timestamp digits, three suffix digits.
    #[test]
    fn ticket_numbers_keep_their_shape(
        company_id in 0_i64..1_000_000,
        suffix in any::<u32>(),
    ) {
        let number = number::ticket_number(company_id, chrono::Utc::now(), suffix);
        prop_assert_eq!(number.len(), 18);
        prop_assert!(number.starts_with('T'));
        prop_assert!(number[1..].chars().all(|c| c.is_ascii_digit()));
        prop_assert_eq!(&number[1..3], &format!("{:02}", company_id % 100));
    }
}
