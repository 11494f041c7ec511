//! Database entities.

pub mod comment;
pub mod vote;

pub use comment::Entity as Comment;
pub use vote::Entity as Vote;
