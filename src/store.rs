//! The persisted question collection, modeled as a generic store with a
//! uniqueness constraint on (normalized question text, class level, tag).
//!
//! The constraint is the authoritative duplicate arbiter: racing pipeline
//! runs may both pass the text pre-check, and `insert_many` resolves the
//! collision by partitioning the batch into inserted rows and conflicted
//! input indices. A partial conflict is an outcome, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::StoredQuestion;
use crate::normalize::normalize_question_text;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct UniqueKey {
  text: String,
  class_level: u32,
  tag: String,
}

impl UniqueKey {
  fn of(row: &StoredQuestion) -> Self {
    Self {
      text: normalize_question_text(&row.question),
      class_level: row.class_level,
      tag: row.tag.clone(),
    }
  }
}

#[derive(Default)]
struct Inner {
  by_id: HashMap<String, StoredQuestion>,
  unique: HashMap<UniqueKey, String>,
}

/// Outcome of an unordered bulk insert: which rows landed and which input
/// positions hit the uniqueness constraint.
#[derive(Debug, Default)]
pub struct BulkInsert {
  pub inserted: Vec<StoredQuestion>,
  pub conflicted: Vec<usize>,
}

#[derive(Clone, Default)]
pub struct QuestionStore {
  inner: Arc<RwLock<Inner>>,
}

impl QuestionStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Up to `limit` normalized texts of stored questions for the same
  /// (tag, class, topic); passed to the model as avoid-context.
  #[instrument(level = "debug", skip(self))]
  pub async fn sample_existing_texts(
    &self,
    tag: &str,
    class_level: u32,
    topic: &str,
    limit: usize,
  ) -> Vec<String> {
    let inner = self.inner.read().await;
    inner
      .by_id
      .values()
      .filter(|q| q.tag == tag && q.class_level == class_level && q.topic == topic)
      .take(limit)
      .map(|q| normalize_question_text(&q.question))
      .collect()
  }

  /// Fast pre-insert duplicate check: exact or normalized text match scoped
  /// to (class, tag). Advisory only — `insert_many` has the final say.
  #[instrument(level = "debug", skip(self, question))]
  pub async fn has_duplicate(&self, question: &str, class_level: u32, tag: &str) -> bool {
    let inner = self.inner.read().await;
    let key = UniqueKey {
      text: normalize_question_text(question),
      class_level,
      tag: tag.to_string(),
    };
    if inner.unique.contains_key(&key) {
      return true;
    }
    inner
      .by_id
      .values()
      .any(|q| q.class_level == class_level && q.tag == tag && q.question == question)
  }

  /// Unordered bulk insert. Rows whose uniqueness key is already taken —
  /// by a stored row or by an earlier row of the same batch — are reported
  /// by input index; everything else is inserted.
  #[instrument(level = "info", skip(self, rows), fields(requested = rows.len()))]
  pub async fn insert_many(&self, rows: Vec<StoredQuestion>) -> BulkInsert {
    let mut inner = self.inner.write().await;
    let mut out = BulkInsert::default();
    for (i, row) in rows.into_iter().enumerate() {
      let key = UniqueKey::of(&row);
      if inner.unique.contains_key(&key) {
        debug!(target: "pipeline", index = i, "bulk insert hit uniqueness constraint");
        out.conflicted.push(i);
        continue;
      }
      inner.unique.insert(key, row.id.clone());
      inner.by_id.insert(row.id.clone(), row.clone());
      out.inserted.push(row);
    }
    out
  }

  #[instrument(level = "debug", skip(self), fields(%id))]
  pub async fn get(&self, id: &str) -> Option<StoredQuestion> {
    self.inner.read().await.by_id.get(id).cloned()
  }

  pub async fn count(&self) -> usize {
    self.inner.read().await.by_id.len()
  }

  /// Atomic read-modify-write on one row under the store's write lock.
  /// Returns None when the id is unknown. The closure's decision (including
  /// conflict checks) and the mutation happen inside the same critical
  /// section, so two concurrent transitions cannot both observe `pending`.
  pub async fn modify<R>(
    &self,
    id: &str,
    f: impl FnOnce(&mut StoredQuestion) -> R,
  ) -> Option<R> {
    let mut inner = self.inner.write().await;
    inner.by_id.get_mut(id).map(f)
  }
}
