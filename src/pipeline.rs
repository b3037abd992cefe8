//! The question generation pipeline: request the model for candidates,
//! pre-filter them structurally, send survivors back for step-by-step
//! correction, reconcile verdicts against the strict verifier
//! (trust-but-verify), and persist what remains under the store's
//! uniqueness constraint.
//!
//! Per-candidate failures never abort a run; only whole-stage failures do
//! (unreachable model on generation, zero survivors, nothing verified, all
//! duplicates). A failing *correction* call degrades the batch to
//! verifier-only classification instead of failing the run.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Prompts, EXISTING_SAMPLE_LIMIT};
use crate::domain::{new_batch_id, CandidateQuestion, QuestionType, ReviewStatus, StoredQuestion, Verdict};
use crate::error::PipelineError;
use crate::extract::{parse_items, Parsed};
use crate::llm::{build_correction_prompt, build_generation_prompt, Collaborator, CorrectionVerdict};
use crate::store::QuestionStore;
use crate::verify::verify;

const GENERATION_TEMPERATURE: f32 = 0.9;
const CORRECTION_TEMPERATURE: f32 = 0.2;

/// One inbound generation request, minus the connection parameters (those
/// are consumed when the collaborator client is built).
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub tag: String,
  pub class_level: u32,
  pub topic: String,
  pub concept: Option<String>,
  pub question_type: QuestionType,
  pub subject_id: Option<String>,
}

/// What the caller gets back from a successful run.
#[derive(Debug, Serialize)]
pub struct GenerationSummary {
  pub batch_id: String,
  pub total_candidates: usize,
  pub valid: usize,
  pub corrected: usize,
  pub invalid: usize,
  pub saved: usize,
  pub questions: Vec<StoredQuestion>,
}

/// Run the full pipeline for one request.
#[instrument(level = "info", skip(store, llm, prompts), fields(tag = %req.tag, class_level = req.class_level, topic = %req.topic))]
pub async fn run_generation(
  store: &QuestionStore,
  llm: &dyn Collaborator,
  prompts: &Prompts,
  req: &GenerationRequest,
) -> Result<GenerationSummary, PipelineError> {
  let batch_id = new_batch_id();

  // 1) Sample stored texts for the same scope as avoid-context.
  let existing = store
    .sample_existing_texts(&req.tag, req.class_level, &req.topic, EXISTING_SAMPLE_LIMIT)
    .await;

  // 2) Generation round trip. Any failure here is fatal for the run.
  let (system, user) = build_generation_prompt(prompts, req, &existing);
  let raw = llm.chat(&system, &user, GENERATION_TEMPERATURE).await?;
  let candidates = match parse_items::<CandidateQuestion>(&raw) {
    Parsed::Ok { items, recovered } => {
      if recovered {
        warn!(target: "pipeline", %batch_id, count = items.len(), "recovered candidates from malformed array");
      }
      items
    }
    Parsed::Failed(reason) => return Err(PipelineError::MalformedResponse(reason)),
  };
  let total_candidates = candidates.len();
  info!(target: "pipeline", %batch_id, total_candidates, "candidates received");

  // 3) Structural pre-filter: log and drop, never halt the batch.
  let mut survivors = Vec::new();
  for (i, c) in candidates.into_iter().enumerate() {
    match crate::verify::prefilter(&c, &existing) {
      Ok(()) => survivors.push(c),
      Err(reject) => {
        info!(target: "pipeline", %batch_id, index = i, reason = %reject, "candidate dropped by pre-filter");
      }
    }
  }
  if survivors.is_empty() {
    return Err(PipelineError::NoSurvivors);
  }
  info!(target: "pipeline", %batch_id, survivors = survivors.len(), "pre-filter done");

  // 4) Correction round trip, degrading to verifier-only on failure.
  let verdicts = match correction_call(llm, prompts, &survivors).await {
    Ok(v) => reconcile(survivors, v),
    Err(e) => {
      error!(target: "pipeline", %batch_id, error = %e, "correction call failed; degrading to verifier-only");
      classify_verifier_only(survivors)
    }
  };

  let mut valid = Vec::new();
  let mut corrected = Vec::new();
  let mut invalid = 0usize;
  for v in verdicts {
    match v {
      Verdict::Valid(c) => valid.push(c),
      Verdict::Corrected(c) => corrected.push(c),
      Verdict::Invalid { question, reason } => {
        info!(target: "pipeline", %batch_id, question = %crate::util::trunc_for_log(&question, 60), %reason, "candidate invalid");
        invalid += 1;
      }
    }
  }
  let valid_count = valid.len();
  let corrected_count = corrected.len();
  info!(target: "pipeline", %batch_id, valid = valid_count, corrected = corrected_count, invalid, "verdicts reconciled");
  if valid.is_empty() && corrected.is_empty() {
    return Err(PipelineError::NothingVerified);
  }

  // 5) Persist: re-verify, pre-check duplicates, then one unordered bulk
  // insert whose conflict partition is absorbed.
  let mut rows = Vec::new();
  let mut dropped_duplicates = 0usize;
  let mut dropped_unverified = 0usize;
  for c in valid.into_iter().chain(corrected) {
    if let Err(failure) = verify(&c) {
      warn!(target: "pipeline", %batch_id, reason = %failure, "question failed final re-verification");
      dropped_unverified += 1;
      continue;
    }
    if store.has_duplicate(&c.question, req.class_level, &req.tag).await {
      info!(target: "pipeline", %batch_id, "question dropped by pre-insert duplicate check");
      dropped_duplicates += 1;
      continue;
    }
    rows.push(to_stored(c, req, &batch_id));
  }
  if dropped_unverified > 0 {
    warn!(target: "pipeline", %batch_id, dropped_unverified, "final re-verification dropped questions");
  }
  if rows.is_empty() {
    if dropped_duplicates > 0 {
      return Err(PipelineError::AllDuplicates);
    }
    return Err(PipelineError::NothingVerified);
  }

  let outcome = store.insert_many(rows).await;
  if outcome.inserted.is_empty() {
    // The constraint rejected everything: a racing run got there first.
    return Err(PipelineError::AllDuplicates);
  }
  if !outcome.conflicted.is_empty() {
    warn!(target: "pipeline", %batch_id, conflicted = outcome.conflicted.len(), "uniqueness constraint absorbed part of the batch");
  }

  let saved = outcome.inserted.len();
  info!(target: "pipeline", %batch_id, total_candidates, valid = valid_count, corrected = corrected_count, saved, "pipeline run complete");
  Ok(GenerationSummary {
    batch_id,
    total_candidates,
    valid: valid_count,
    corrected: corrected_count,
    invalid: total_candidates - valid_count - corrected_count,
    saved,
    questions: outcome.inserted,
  })
}

async fn correction_call(
  llm: &dyn Collaborator,
  prompts: &Prompts,
  survivors: &[CandidateQuestion],
) -> Result<Vec<CorrectionVerdict>, PipelineError> {
  let (system, user) = build_correction_prompt(prompts, survivors);
  let raw = llm.chat(&system, &user, CORRECTION_TEMPERATURE).await?;
  match parse_items::<CorrectionVerdict>(&raw) {
    Parsed::Ok { items, .. } => Ok(items),
    Parsed::Failed(reason) => Err(PipelineError::MalformedResponse(reason)),
  }
}

/// Trust-but-verify reconciliation of model verdicts.
///
/// A "confirmed correct" verdict only promotes the candidate if the verifier
/// independently agrees; a corrected replacement only counts if the
/// *replacement* passes. Everything else is invalid with the best available
/// reason. A survivor with no verdict at all is decided by the verifier.
pub fn reconcile(survivors: Vec<CandidateQuestion>, verdicts: Vec<CorrectionVerdict>) -> Vec<Verdict> {
  let mut by_index: HashMap<usize, CorrectionVerdict> =
    verdicts.into_iter().map(|v| (v.index, v)).collect();

  survivors
    .into_iter()
    .enumerate()
    .map(|(i, c)| match by_index.remove(&i) {
      Some(v) if v.is_correct => match verify(&c) {
        Ok(()) => Verdict::Valid(c),
        Err(failure) => Verdict::Invalid {
          question: c.question,
          reason: format!("model confirmed but verification disagrees: {failure}"),
        },
      },
      Some(v) => match v.corrected {
        Some(replacement) => {
          let replacement = inherit_metadata(replacement, &c);
          match verify(&replacement) {
            Ok(()) => Verdict::Corrected(replacement),
            Err(failure) => Verdict::Invalid {
              question: c.question,
              reason: format!("correction failed verification: {failure}"),
            },
          }
        }
        None => Verdict::Invalid {
          question: c.question,
          reason: v.reason.unwrap_or_else(|| "model marked the question invalid".into()),
        },
      },
      None => match verify(&c) {
        Ok(()) => Verdict::Valid(c),
        Err(failure) => Verdict::Invalid {
          question: c.question,
          reason: format!("no verdict returned; verification failed: {failure}"),
        },
      },
    })
    .collect()
}

/// Degraded path when the correction call is unavailable: the verifier alone
/// decides. Nothing is ever promoted to Corrected here.
pub fn classify_verifier_only(survivors: Vec<CandidateQuestion>) -> Vec<Verdict> {
  survivors
    .into_iter()
    .map(|c| match verify(&c) {
      Ok(()) => Verdict::Valid(c),
      Err(failure) => Verdict::Invalid {
        question: c.question,
        reason: format!("verification failed: {failure}"),
      },
    })
    .collect()
}

/// A corrected replacement often comes back with only the answer fields
/// filled; classification metadata falls back to the original candidate.
fn inherit_metadata(mut replacement: CandidateQuestion, original: &CandidateQuestion) -> CandidateQuestion {
  if replacement.question.trim().is_empty() {
    replacement.question = original.question.clone();
  }
  if replacement.difficulty.trim().is_empty() {
    replacement.difficulty = original.difficulty.clone();
  }
  if replacement.topic.trim().is_empty() {
    replacement.topic = original.topic.clone();
  }
  if replacement.concept.trim().is_empty() {
    replacement.concept = original.concept.clone();
  }
  if replacement.tag.trim().is_empty() {
    replacement.tag = original.tag.clone();
  }
  replacement
}

fn to_stored(c: CandidateQuestion, req: &GenerationRequest, batch_id: &str) -> StoredQuestion {
  // Safe post-verification; defaults guard against a logic slip, not input.
  let correct_answer = c.correct_answer.unwrap_or_default().max(0) as usize;
  StoredQuestion {
    id: Uuid::new_v4().to_string(),
    question: c.question,
    options: c.options,
    correct_answer,
    final_answer: c.final_answer.unwrap_or_default(),
    difficulty: if c.difficulty.trim().is_empty() { "medium".into() } else { c.difficulty },
    topic: if c.topic.trim().is_empty() { req.topic.clone() } else { c.topic },
    concept: if c.concept.trim().is_empty() {
      req.concept.clone().unwrap_or_default()
    } else {
      c.concept
    },
    tag: req.tag.clone(),
    has_math: c.has_math,
    class_level: req.class_level,
    status: ReviewStatus::Pending,
    question_type: req.question_type,
    subject_id: req.subject_id.clone(),
    batch_id: batch_id.to_string(),
    created_at: Utc::now(),
    approved_by: None,
    approved_at: None,
    rejected_by: None,
    rejected_at: None,
    rejection_reason: None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(question: &str, options: &[&str], correct: i64, final_answer: &str) -> CandidateQuestion {
    CandidateQuestion {
      question: question.into(),
      options: options.iter().map(|s| s.to_string()).collect(),
      correct_answer: Some(correct),
      final_answer: Some(final_answer.into()),
      difficulty: "medium".into(),
      ..Default::default()
    }
  }

  fn verdict(index: usize, is_correct: bool) -> CorrectionVerdict {
    serde_json::from_value(serde_json::json!({ "index": index, "is_correct": is_correct }))
      .expect("verdict")
  }

  #[test]
  fn confirmed_verdict_is_still_verified() {
    // The model says "correct", but 42 is not option 0.
    let lying = candidate("q1", &["40", "41", "42", "43"], 0, "42");
    let out = reconcile(vec![lying], vec![verdict(0, true)]);
    assert!(matches!(&out[0], Verdict::Invalid { reason, .. } if reason.contains("disagrees")));
  }

  #[test]
  fn corrected_replacement_is_verified_too() {
    let broken = candidate("q1", &["40", "41", "42", "43"], 0, "42");
    let mut fix = verdict(0, false);
    fix.corrected = Some(candidate("q1", &["40", "41", "42", "43"], 2, "42"));
    let out = reconcile(vec![broken], vec![fix]);
    assert!(matches!(&out[0], Verdict::Corrected(c) if c.correct_answer == Some(2)));

    // A "correction" that is still wrong stays invalid.
    let broken = candidate("q1", &["40", "41", "42", "43"], 0, "42");
    let mut bad_fix = verdict(0, false);
    bad_fix.corrected = Some(candidate("q1", &["40", "41", "42", "43"], 1, "42"));
    let out = reconcile(vec![broken], vec![bad_fix]);
    assert!(matches!(&out[0], Verdict::Invalid { .. }));
  }

  #[test]
  fn missing_verdict_falls_back_to_verifier() {
    let good = candidate("q1", &["18", "19", "20", "21"], 1, "19");
    let bad = candidate("q2", &["1", "2", "3", "4"], 0, "2");
    let out = reconcile(vec![good, bad], vec![]);
    assert!(matches!(&out[0], Verdict::Valid(_)));
    assert!(matches!(&out[1], Verdict::Invalid { .. }));
  }

  #[test]
  fn verifier_only_path_never_corrects() {
    let good = candidate("q1", &["18", "19", "20", "21"], 1, "19");
    let bad = candidate("q2", &["40", "41", "42", "43"], 0, "42");
    let out = classify_verifier_only(vec![good, bad]);
    assert!(matches!(&out[0], Verdict::Valid(_)));
    assert!(matches!(&out[1], Verdict::Invalid { .. }));
    assert!(!out.iter().any(|v| matches!(v, Verdict::Corrected(_))));
  }

  #[test]
  fn replacement_inherits_blank_metadata() {
    let mut original = candidate("orig q", &["1", "2", "3", "4"], 0, "1");
    original.topic = "fractions".into();
    original.tag = "FRC-1".into();
    let replacement = candidate("", &["5", "6", "7", "8"], 1, "6");
    let merged = inherit_metadata(replacement, &original);
    assert_eq!(merged.question, "orig q");
    assert_eq!(merged.topic, "fractions");
    assert_eq!(merged.tag, "FRC-1");
  }
}
