// SPDX-License-Identifier: MIT
//! Company performance insights — read-only rollups over tickets, agents,
//! customers and reviews. Nothing here mutates state; the only failure mode
//! beyond storage errors is an unknown company.

pub mod aggregate;
pub mod model;
pub mod storage;
