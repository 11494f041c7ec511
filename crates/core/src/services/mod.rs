//! Business logic services.

pub mod comment;
pub mod reconcile;
pub mod vote;
pub mod vote_stats;

pub use comment::{CommentService, CommentSummary, CreateCommentInput};
pub use reconcile::{ReconcileReport, TallyReconciler};
pub use vote::{
    BulkItemResult, BulkOutcome, BulkSummary, PublicVote, SubmitStatus, SubmitVoteInput,
    VoteOutcome, VoteService,
};
pub use vote_stats::{
    CommentStats, HistoryEntry, HistoryOrder, HistoryQuery, Page, SystemBreakdown, SystemStats,
    TopComment, VoteStatsService,
};
