//! Domain models: candidate questions, persisted questions, review status,
//! and generation batch ids.
//!
//! `CandidateQuestion` crosses the untrusted model boundary, so every field
//! is serde-lenient (defaults + camelCase aliases). Nothing about a candidate
//! is guaranteed until the verification pipeline says so.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of options every multiple-choice question must carry.
pub const OPTION_COUNT: usize = 4;

/// A question proposal produced by the model. Transient: never persisted
/// until it survives the pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CandidateQuestion {
  #[serde(default)]
  pub question: String,
  #[serde(default)]
  pub options: Vec<String>,
  /// Zero-based index of the declared correct option. Kept wide and optional
  /// until the verifier narrows it.
  #[serde(default, alias = "correctAnswer")]
  pub correct_answer: Option<i64>,
  #[serde(default, alias = "finalAnswer")]
  pub final_answer: Option<String>,
  #[serde(default)]
  pub difficulty: String,
  #[serde(default, alias = "topicName")]
  pub topic: String,
  #[serde(default)]
  pub concept: String,
  #[serde(default)]
  pub tag: String,
  /// Whether the question text uses mathematical markup (LaTeX etc.).
  #[serde(default, alias = "hasMath")]
  pub has_math: bool,
}

/// Lifecycle status of a persisted question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
  Pending,
  Approved,
  Rejected,
}

/// Classification of a persisted question.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  /// Tied to a subject reference (the default).
  SubjectScoped,
  General,
}

impl Default for QuestionType {
  fn default() -> Self {
    QuestionType::SubjectScoped
  }
}

/// A question that survived the pipeline and lives in the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredQuestion {
  pub id: String,
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: usize,
  pub final_answer: String,
  pub difficulty: String,
  pub topic: String,
  pub concept: String,
  pub tag: String,
  pub has_math: bool,
  pub class_level: u32,

  pub status: ReviewStatus,
  pub question_type: QuestionType,
  pub subject_id: Option<String>,
  /// Identifier of the pipeline run that produced this row. Traceability
  /// only, never consulted for correctness.
  pub batch_id: String,
  pub created_at: DateTime<Utc>,

  pub approved_by: Option<String>,
  pub approved_at: Option<DateTime<Utc>>,
  pub rejected_by: Option<String>,
  pub rejected_at: Option<DateTime<Utc>>,
  pub rejection_reason: Option<String>,
}

/// Per-candidate outcome of the correction stage.
#[derive(Clone, Debug)]
pub enum Verdict {
  /// Confirmed by the model AND independently re-verified.
  Valid(CandidateQuestion),
  /// Replacement supplied by the model AND independently re-verified.
  Corrected(CandidateQuestion),
  /// Dropped, with the best available reason.
  Invalid { question: String, reason: String },
}

/// Opaque batch identifier: time plus a short random suffix.
pub fn new_batch_id() -> String {
  const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
  let mut rng = rand::thread_rng();
  let suffix: String = (0..6)
    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
    .collect();
  format!("batch-{}-{}", Utc::now().timestamp_millis(), suffix)
}
