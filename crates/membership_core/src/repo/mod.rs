//! Repository layer contracts and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service and backup orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `MembershipApplication::validate()`.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod application_repo;
