//! Database repositories.

pub mod comment;
pub mod vote;

pub use comment::CommentRepository;
pub use vote::{VoteFilter, VoteRepository};
