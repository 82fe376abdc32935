// SPDX-License-Identifier: MIT
//! Ticket lifecycle: data model, state machine, numbering, storage flows,
//! conversation threads, and the service facade the IPC layer calls.

pub mod machine;
pub mod model;
pub mod number;
pub mod responses;
pub mod service;
pub mod storage;
