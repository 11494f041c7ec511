//! Vote engine integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test -p persona-core --test vote_integration -- --ignored`
//!
//! Connection settings come from the `TEST_DB_*` environment variables, see
//! `persona_db::test_utils::TestDbConfig`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use futures::future::join_all;
use persona_common::AppError;
use persona_core::{
    CommentService, CreateCommentInput, PersonalitySystem, SubmitStatus, SubmitVoteInput,
    TallyReconciler, VoteService, VoteStatsService, VoteTally,
};
use persona_db::{
    migrate,
    repositories::{CommentRepository, VoteRepository},
    test_utils::TestDatabase,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};

struct Harness {
    _db: TestDatabase,
    conn: Arc<sea_orm::DatabaseConnection>,
    comments: CommentService,
    votes: VoteService,
    stats: VoteStatsService,
    reconciler: TallyReconciler,
}

async fn harness() -> Harness {
    let db = TestDatabase::new().await.expect("Failed to connect");
    migrate(db.connection()).await.unwrap();
    db.reset_votes().await.unwrap();

    let conn = db.shared();
    let comment_repo = CommentRepository::new(Arc::clone(&conn));
    let vote_repo = VoteRepository::new(Arc::clone(&conn));
    let comments = CommentService::new(comment_repo.clone());

    Harness {
        _db: db,
        conn: Arc::clone(&conn),
        votes: VoteService::new(vote_repo.clone(), comment_repo.clone()),
        stats: VoteStatsService::new(vote_repo, comments.clone()),
        reconciler: TallyReconciler::new(comment_repo, 100),
        comments,
    }
}

async fn new_comment(h: &Harness) -> String {
    h.comments
        .create(CreateCommentInput {
            profile_id: "profile1".to_string(),
            author: "tester".to_string(),
            title: None,
            content: "Which type is this?".to_string(),
        })
        .await
        .unwrap()
        .id
}

fn vote(comment_id: &str, voter: &str, system: &str, value: &str) -> SubmitVoteInput {
    SubmitVoteInput {
        comment_id: comment_id.to_string(),
        personality_system: system.to_string(),
        personality_value: value.to_string(),
        voter_identifier: voter.to_string(),
        profile_id: None,
    }
}

async fn tally(h: &Harness, comment_id: &str) -> VoteTally {
    h.stats.comment_stats(comment_id).await.unwrap().tally
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_two_voter_scenario() {
    let h = harness().await;
    let c = new_comment(&h).await;

    let first = h.votes.submit(vote(&c, "v1", "mbti", "intj")).await.unwrap();
    assert_eq!(first.status, SubmitStatus::Submitted);
    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Mbti, "INTJ"), 1);
    assert_eq!(t.total_votes, 1);

    let changed = h.votes.submit(vote(&c, "v1", "mbti", "enfp")).await.unwrap();
    assert_eq!(changed.status, SubmitStatus::Updated);
    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Mbti, "INTJ"), 0);
    assert_eq!(t.get(PersonalitySystem::Mbti, "ENFP"), 1);
    assert_eq!(t.total_votes, 1);

    h.votes.submit(vote(&c, "v2", "mbti", "ENFP")).await.unwrap();
    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Mbti, "ENFP"), 2);
    assert_eq!(t.total_votes, 2);

    let removed = h.votes.remove(&c, "v1", "mbti").await.unwrap();
    assert!(removed.is_some());
    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Mbti, "INTJ"), 0);
    assert_eq!(t.get(PersonalitySystem::Mbti, "ENFP"), 1);
    assert_eq!(t.total_votes, 1);
    assert!(t.is_consistent());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_resubmission_is_unchanged() {
    let h = harness().await;
    let c = new_comment(&h).await;

    h.votes.submit(vote(&c, "v1", "zodiac", "Leo")).await.unwrap();
    let again = h.votes.submit(vote(&c, "v1", "zodiac", "leo")).await.unwrap();

    assert_eq!(again.status, SubmitStatus::Unchanged);
    assert!(again.is_update);
    assert_eq!(tally(&h, &c).await.total_votes, 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_round_trip_returns_to_zero() {
    let h = harness().await;
    let c = new_comment(&h).await;

    h.votes.submit(vote(&c, "v1", "enneagram", "4w5")).await.unwrap();
    h.votes.submit(vote(&c, "v1", "enneagram", "5w4")).await.unwrap();
    h.votes.remove(&c, "v1", "enneagram").await.unwrap();

    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Enneagram, "4w5"), 0);
    assert_eq!(t.get(PersonalitySystem::Enneagram, "5w4"), 0);
    assert_eq!(t.total_votes, 0);

    // Nothing left to remove.
    assert!(h.votes.remove(&c, "v1", "enneagram").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_invalid_value_leaves_tally_untouched() {
    let h = harness().await;
    let c = new_comment(&h).await;

    let result = h.votes.submit(vote(&c, "v1", "zodiac", "Ophiuchus")).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(tally(&h, &c).await, VoteTally::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_voters_lose_no_increments() {
    const VOTERS: usize = 40;
    let h = harness().await;
    let c = new_comment(&h).await;
    let values = persona_core::catalog::values(PersonalitySystem::Mbti);

    let tasks = (0..VOTERS).map(|i| {
        let votes = h.votes.clone();
        let input = vote(&c, &format!("voter-{i}"), "mbti", values[i % values.len()]);
        tokio::spawn(async move { votes.submit(input).await })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let t = tally(&h, &c).await;
    assert_eq!(t.total_votes, VOTERS as u64);
    assert!(t.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL instance"]
async fn test_racing_first_votes_keep_one_active_record() {
    const ATTEMPTS: usize = 8;
    let h = harness().await;
    let c = new_comment(&h).await;

    let tasks = (0..ATTEMPTS).map(|_| {
        let votes = h.votes.clone();
        let input = vote(&c, "same-voter", "mbti", "INTJ");
        tokio::spawn(async move { votes.submit(input).await })
    });

    let mut submitted = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(outcome) if outcome.status == SubmitStatus::Submitted => submitted += 1,
            Ok(_) | Err(AppError::DuplicateVote(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(submitted, 1);
    assert_eq!(
        h.stats
            .count(Some(&c), Some(PersonalitySystem::Mbti))
            .await
            .unwrap(),
        1
    );
    assert_eq!(tally(&h, &c).await.total_votes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_value_changes_by_one_voter_keep_tally_exact() {
    const ROUNDS: usize = 10;
    let h = harness().await;

    for _ in 0..ROUNDS {
        let c = new_comment(&h).await;
        h.votes.submit(vote(&c, "v2", "mbti", "INTJ")).await.unwrap();
        h.votes.submit(vote(&c, "v1", "mbti", "INTJ")).await.unwrap();

        let tasks = ["ENFP", "ISTP", "ESTJ", "INFP"].map(|value| {
            let votes = h.votes.clone();
            let input = vote(&c, "v1", "mbti", value);
            tokio::spawn(async move { votes.submit(input).await })
        });
        for result in join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap().status, SubmitStatus::Updated);
        }

        let t = tally(&h, &c).await;
        assert_eq!(t.get(PersonalitySystem::Mbti, "INTJ"), 1);
        assert_eq!(t.total_votes, 2);
        assert!(t.is_consistent());
        // Stored tally already matches the active votes.
        assert!(!h.reconciler.reconcile_comment(&c).await.unwrap());
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_reconciliation_repairs_drift() {
    let h = harness().await;
    let c = new_comment(&h).await;

    h.votes.submit(vote(&c, "v1", "mbti", "INTJ")).await.unwrap();
    h.votes.submit(vote(&c, "v2", "mbti", "INTJ")).await.unwrap();

    h.conn
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            r#"UPDATE comment SET vote_stats = '{"mbti": {"INTJ": 7}}'::jsonb, total_votes = 9 WHERE id = $1"#,
            [c.clone().into()],
        ))
        .await
        .unwrap();

    let report = h.reconciler.reconcile_all().await.unwrap();
    assert_eq!(report.repaired, 1);

    let t = tally(&h, &c).await;
    assert_eq!(t.get(PersonalitySystem::Mbti, "INTJ"), 2);
    assert_eq!(t.total_votes, 2);

    assert!(!h.reconciler.reconcile_comment(&c).await.unwrap());
}
