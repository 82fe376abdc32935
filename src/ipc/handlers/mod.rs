// SPDX-License-Identifier: MIT
pub mod agents;
pub mod daemon;
pub mod insights;
pub mod reviews;
pub mod tickets;
