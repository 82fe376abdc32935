// SPDX-License-Identifier: MIT
//! Company-scoped human-readable ticket numbers.
//!
//! Format: `T<companyTag><YYMMDDHHMMSS><3-digit-random>`. The generator is
//! collision-checked by the caller against the store; the random suffix only
//! keeps same-second collisions rare, it does not guarantee uniqueness.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};

/// Two-digit company tag embedded in the ticket number.
pub fn company_tag(company_id: i64) -> String {
    format!("{:02}", company_id.rem_euclid(100))
}

/// Build a ticket number from its parts. `suffix` is reduced mod 1000.
pub fn ticket_number(company_id: i64, now: DateTime<Utc>, suffix: u32) -> String {
    format!(
        "T{}{}{:03}",
        company_tag(company_id),
        now.format("%y%m%d%H%M%S"),
        suffix % 1000
    )
}

/// Fresh 3-digit suffix from OS randomness.
pub fn random_suffix() -> u32 {
    OsRng.next_u32() % 1000
}
