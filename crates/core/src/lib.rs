//! Core business logic for persona-rs.
//!
//! - [`catalog`]: the legal values of each personality system
//! - [`voter`]: anonymous voter identity
//! - [`tally`]: the per-comment vote tally
//! - [`services`]: vote submission, statistics, reconciliation and comments

pub mod catalog;
pub mod services;
pub mod tally;
pub mod voter;

pub use catalog::PersonalitySystem;
pub use services::*;
pub use tally::VoteTally;
pub use voter::{VoterId, VoterSource};
