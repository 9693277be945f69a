//! Membership application use-case services.
//!
//! # Responsibility
//! - Turn use-case requests into repository calls and shape responses.
//! - Keep CLI/adapters decoupled from storage details.

pub mod application_service;
