//! Review state machine for persisted questions.
//!
//! Allowed transitions: pending→approved, pending→rejected,
//! rejected→approved (which clears the rejection metadata), and
//! approved→rejected. Re-approving an approved row or re-rejecting a
//! rejected row is a caller-visible conflict.
//!
//! Each transition runs as one read-modify-write under the store's write
//! lock, so two concurrent calls cannot both observe `pending` and both
//! claim success.

use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{ReviewStatus, StoredQuestion};
use crate::error::ReviewError;
use crate::store::QuestionStore;

/// Recorded when a reviewer rejects without giving a reason.
pub const DEFAULT_REJECTION_REASON: &str = "Rejected during review";

/// Counts reported by the bulk operations: rows actually modified versus
/// rows requested. Unknown or already-terminal ids simply do not count.
#[derive(Debug, serde::Serialize)]
pub struct BulkReviewOutcome {
  pub requested: usize,
  pub modified: usize,
}

#[instrument(level = "info", skip(store), fields(%id, %reviewer))]
pub async fn approve(
  store: &QuestionStore,
  id: &str,
  reviewer: &str,
) -> Result<StoredQuestion, ReviewError> {
  let result = store
    .modify(id, |q| {
      if q.status == ReviewStatus::Approved {
        return Err(ReviewError::AlreadyApproved(q.id.clone()));
      }
      q.status = ReviewStatus::Approved;
      q.approved_by = Some(reviewer.to_string());
      q.approved_at = Some(Utc::now());
      // Moving out of `rejected` clears the rejection trail.
      q.rejected_by = None;
      q.rejected_at = None;
      q.rejection_reason = None;
      Ok(q.clone())
    })
    .await
    .ok_or_else(|| ReviewError::NotFound(id.to_string()))??;

  info!(target: "review", %id, "question approved");
  Ok(result)
}

#[instrument(level = "info", skip(store, reason), fields(%id, %reviewer))]
pub async fn reject(
  store: &QuestionStore,
  id: &str,
  reviewer: &str,
  reason: Option<String>,
) -> Result<StoredQuestion, ReviewError> {
  let reason = reason
    .filter(|r| !r.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

  let result = store
    .modify(id, |q| {
      if q.status == ReviewStatus::Rejected {
        return Err(ReviewError::AlreadyRejected(q.id.clone()));
      }
      q.status = ReviewStatus::Rejected;
      q.rejected_by = Some(reviewer.to_string());
      q.rejected_at = Some(Utc::now());
      q.rejection_reason = Some(reason.clone());
      Ok(q.clone())
    })
    .await
    .ok_or_else(|| ReviewError::NotFound(id.to_string()))??;

  info!(target: "review", %id, "question rejected");
  Ok(result)
}

/// Approve every id in the list; conflicts and unknown ids are skipped.
#[instrument(level = "info", skip(store, ids), fields(requested = ids.len(), %reviewer))]
pub async fn approve_many(
  store: &QuestionStore,
  ids: &[String],
  reviewer: &str,
) -> BulkReviewOutcome {
  let mut modified = 0usize;
  for id in ids {
    if approve(store, id, reviewer).await.is_ok() {
      modified += 1;
    }
  }
  info!(target: "review", requested = ids.len(), modified, "bulk approve done");
  BulkReviewOutcome { requested: ids.len(), modified }
}

/// Reject every id in the list; conflicts and unknown ids are skipped.
#[instrument(level = "info", skip(store, ids, reason), fields(requested = ids.len(), %reviewer))]
pub async fn reject_many(
  store: &QuestionStore,
  ids: &[String],
  reviewer: &str,
  reason: Option<String>,
) -> BulkReviewOutcome {
  let mut modified = 0usize;
  for id in ids {
    if reject(store, id, reviewer, reason.clone()).await.is_ok() {
      modified += 1;
    }
  }
  info!(target: "review", requested = ids.len(), modified, "bulk reject done");
  BulkReviewOutcome { requested: ids.len(), modified }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{QuestionType, ReviewStatus};

  async fn seeded_store(ids: &[&str]) -> QuestionStore {
    let store = QuestionStore::new();
    let rows = ids
      .iter()
      .map(|id| StoredQuestion {
        id: id.to_string(),
        question: format!("Question {id}"),
        options: vec!["1".into(), "2".into(), "3".into(), "4".into()],
        correct_answer: 0,
        final_answer: "1".into(),
        difficulty: "easy".into(),
        topic: "t".into(),
        concept: String::new(),
        tag: "TAG".into(),
        has_math: false,
        class_level: 8,
        status: ReviewStatus::Pending,
        question_type: QuestionType::SubjectScoped,
        subject_id: None,
        batch_id: "batch-test".into(),
        created_at: Utc::now(),
        approved_by: None,
        approved_at: None,
        rejected_by: None,
        rejected_at: None,
        rejection_reason: None,
      })
      .collect();
    let out = store.insert_many(rows).await;
    assert!(out.conflicted.is_empty());
    store
  }

  #[tokio::test]
  async fn double_approve_is_a_conflict_and_keeps_timestamp() {
    let store = seeded_store(&["a"]).await;
    let first = approve(&store, "a", "alice").await.expect("approve");
    let stamp = first.approved_at;

    let err = approve(&store, "a", "bob").await.unwrap_err();
    assert_eq!(err, ReviewError::AlreadyApproved("a".into()));
    let row = store.get("a").await.expect("row");
    assert_eq!(row.approved_at, stamp);
    assert_eq!(row.approved_by.as_deref(), Some("alice"));
  }

  #[tokio::test]
  async fn double_reject_is_a_conflict() {
    let store = seeded_store(&["a"]).await;
    reject(&store, "a", "alice", Some("off-syllabus".into())).await.expect("reject");
    let err = reject(&store, "a", "bob", None).await.unwrap_err();
    assert_eq!(err, ReviewError::AlreadyRejected("a".into()));
  }

  #[tokio::test]
  async fn rejected_to_approved_clears_rejection_metadata() {
    let store = seeded_store(&["a"]).await;
    reject(&store, "a", "alice", Some("too easy".into())).await.expect("reject");
    let row = approve(&store, "a", "bob").await.expect("approve");
    assert_eq!(row.status, ReviewStatus::Approved);
    assert!(row.rejected_by.is_none());
    assert!(row.rejected_at.is_none());
    assert!(row.rejection_reason.is_none());
    assert_eq!(row.approved_by.as_deref(), Some("bob"));
  }

  #[tokio::test]
  async fn approved_can_still_be_rejected() {
    let store = seeded_store(&["a"]).await;
    approve(&store, "a", "alice").await.expect("approve");
    let row = reject(&store, "a", "bob", None).await.expect("reject");
    assert_eq!(row.status, ReviewStatus::Rejected);
    assert_eq!(row.rejection_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
  }

  #[tokio::test]
  async fn missing_reason_gets_the_placeholder() {
    let store = seeded_store(&["a"]).await;
    let row = reject(&store, "a", "alice", Some("   ".into())).await.expect("reject");
    assert_eq!(row.rejection_reason.as_deref(), Some(DEFAULT_REJECTION_REASON));
  }

  #[tokio::test]
  async fn bulk_counts_skip_unknown_and_terminal_rows() {
    let store = seeded_store(&["a", "b", "c"]).await;
    approve(&store, "a", "alice").await.expect("approve");

    let ids: Vec<String> = ["a", "b", "ghost"].iter().map(|s| s.to_string()).collect();
    let out = approve_many(&store, &ids, "bob").await;
    assert_eq!(out.requested, 3);
    assert_eq!(out.modified, 1); // "a" conflicts, "ghost" is unknown

    let ids: Vec<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
    let out = reject_many(&store, &ids, "bob", None).await;
    assert_eq!(out.requested, 2);
    assert_eq!(out.modified, 2);
  }

  #[tokio::test]
  async fn unknown_id_is_not_found() {
    let store = seeded_store(&[]).await;
    assert_eq!(
      approve(&store, "nope", "alice").await.unwrap_err(),
      ReviewError::NotFound("nope".into())
    );
  }
}
