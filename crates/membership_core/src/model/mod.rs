//! Domain model for membership applications.
//!
//! # Responsibility
//! - Define the canonical application record and its value objects.
//! - Keep validation rules next to the data they protect.
//!
//! # Invariants
//! - Every application is identified by a stable, non-nil `ApplicationId`.
//! - `backup_at = None` means the personal data was never backed up.

pub mod application;
