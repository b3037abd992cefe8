//! Strict verification and structural pre-filtering of candidate questions.
//!
//! `verify` is the single source of truth for "is this question internally
//! consistent". It is deliberately invoked at three points: by the pre-filter
//! before any model round trip, by the corrector after every model verdict
//! (trust-but-verify), and by the persistence step immediately before a
//! write.

use thiserror::Error;
use tracing::debug;

use crate::domain::{CandidateQuestion, OPTION_COUNT};
use crate::normalize::{normalize_answer, normalize_question_text};

/// Why a candidate failed strict verification. The message is diagnostic
/// only; control flow never branches on the variant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyFailure {
  #[error("final answer is missing")]
  MissingFinalAnswer,

  #[error("correct option index {got} is out of range for {option_count} options")]
  IndexOutOfRange { got: i64, option_count: usize },

  #[error("expected {OPTION_COUNT} options, got {got}")]
  WrongOptionCount { got: usize },

  #[error("options {a} and {b} are equal after normalization ({value:?})")]
  DuplicateOptions { a: usize, b: usize, value: String },

  #[error("final answer {final_answer:?} does not match declared option {declared:?}")]
  AnswerMismatch { final_answer: String, declared: String },
}

/// Strict check that a candidate's declared correct option is
/// self-consistent. Returns the first violated rule.
pub fn verify(c: &CandidateQuestion) -> Result<(), VerifyFailure> {
  let final_answer = match c.final_answer.as_deref() {
    Some(s) if !s.trim().is_empty() => s,
    _ => return Err(VerifyFailure::MissingFinalAnswer),
  };

  let idx = match c.correct_answer {
    Some(i) if i >= 0 && (i as usize) < c.options.len() => i as usize,
    other => {
      return Err(VerifyFailure::IndexOutOfRange {
        got: other.unwrap_or(-1),
        option_count: c.options.len(),
      })
    }
  };

  if c.options.len() != OPTION_COUNT {
    return Err(VerifyFailure::WrongOptionCount { got: c.options.len() });
  }

  for a in 0..c.options.len() {
    for b in (a + 1)..c.options.len() {
      let na = normalize_answer(&c.options[a]);
      if na == normalize_answer(&c.options[b]) {
        return Err(VerifyFailure::DuplicateOptions { a, b, value: na });
      }
    }
  }

  if normalize_answer(final_answer) != normalize_answer(&c.options[idx]) {
    return Err(VerifyFailure::AnswerMismatch {
      final_answer: final_answer.to_string(),
      declared: c.options[idx].clone(),
    });
  }

  Ok(())
}

/// Why the structural pre-filter dropped a candidate before any model call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterReject {
  #[error("question text is missing")]
  MissingQuestion,

  #[error("options are missing")]
  MissingOptions,

  #[error("verification failed: {0}")]
  Invalid(#[from] VerifyFailure),

  #[error("question text duplicates an already stored question")]
  DuplicateOfExisting,
}

/// Structural pre-filter for one raw candidate against the pre-fetched
/// normalized texts of already-stored questions. First matching rejection
/// wins; survivors move on to the correction stage.
pub fn prefilter(c: &CandidateQuestion, existing_texts: &[String]) -> Result<(), FilterReject> {
  if c.question.trim().is_empty() {
    return Err(FilterReject::MissingQuestion);
  }
  if c.options.is_empty() {
    return Err(FilterReject::MissingOptions);
  }
  if c.options.len() != OPTION_COUNT {
    return Err(VerifyFailure::WrongOptionCount { got: c.options.len() }.into());
  }
  for a in 0..c.options.len() {
    for b in (a + 1)..c.options.len() {
      let na = normalize_answer(&c.options[a]);
      if na == normalize_answer(&c.options[b]) {
        return Err(VerifyFailure::DuplicateOptions { a, b, value: na }.into());
      }
    }
  }

  let norm = normalize_question_text(&c.question);
  if existing_texts.iter().any(|t| *t == norm) {
    debug!(target: "pipeline", question = %crate::util::trunc_for_log(&c.question, 60), "candidate duplicates stored text");
    return Err(FilterReject::DuplicateOfExisting);
  }

  match c.correct_answer {
    Some(i) if i >= 0 && (i as usize) < c.options.len() => {}
    other => {
      return Err(
        VerifyFailure::IndexOutOfRange {
          got: other.unwrap_or(-1),
          option_count: c.options.len(),
        }
        .into(),
      )
    }
  }
  if c.final_answer.as_deref().map_or(true, |s| s.trim().is_empty()) {
    return Err(VerifyFailure::MissingFinalAnswer.into());
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(options: &[&str], correct: i64, final_answer: &str) -> CandidateQuestion {
    CandidateQuestion {
      question: "What is the value?".into(),
      options: options.iter().map(|s| s.to_string()).collect(),
      correct_answer: Some(correct),
      final_answer: Some(final_answer.into()),
      difficulty: "easy".into(),
      ..Default::default()
    }
  }

  #[test]
  fn accepts_when_final_answer_matches_declared_option() {
    let c = candidate(&["18", "19", "20", "21"], 1, "19");
    assert_eq!(verify(&c), Ok(()));
  }

  #[test]
  fn rejects_wrong_option_count_regardless_of_other_fields() {
    let three = candidate(&["1", "2", "3"], 0, "1");
    assert_eq!(verify(&three), Err(VerifyFailure::WrongOptionCount { got: 3 }));
    let five = candidate(&["1", "2", "3", "4", "5"], 0, "1");
    assert_eq!(verify(&five), Err(VerifyFailure::WrongOptionCount { got: 5 }));
  }

  #[test]
  fn rejects_normalized_duplicate_options() {
    let c = candidate(&["10", "10.0", "11", "12"], 0, "10");
    assert!(matches!(
      verify(&c),
      Err(VerifyFailure::DuplicateOptions { a: 0, b: 1, .. })
    ));
  }

  #[test]
  fn rejects_answer_mismatch() {
    let c = candidate(&["40", "41", "42", "43"], 0, "42");
    assert!(matches!(verify(&c), Err(VerifyFailure::AnswerMismatch { .. })));
  }

  #[test]
  fn matches_through_normalization() {
    let c = candidate(&["$1,234.00", "2", "3", "4"], 0, "1234");
    assert_eq!(verify(&c), Ok(()));
  }

  #[test]
  fn rejects_missing_final_answer_and_bad_index() {
    let mut c = candidate(&["1", "2", "3", "4"], 0, "1");
    c.final_answer = None;
    assert_eq!(verify(&c), Err(VerifyFailure::MissingFinalAnswer));

    let c = candidate(&["1", "2", "3", "4"], 4, "1");
    assert!(matches!(verify(&c), Err(VerifyFailure::IndexOutOfRange { got: 4, .. })));

    let c = candidate(&["1", "2", "3", "4"], -1, "1");
    assert!(matches!(verify(&c), Err(VerifyFailure::IndexOutOfRange { .. })));
  }

  #[test]
  fn prefilter_drops_duplicates_of_stored_texts() {
    let c = candidate(&["1", "2", "3", "4"], 0, "1");
    let existing = vec![crate::normalize::normalize_question_text("What is the  VALUE?")];
    assert_eq!(prefilter(&c, &existing), Err(FilterReject::DuplicateOfExisting));
    assert_eq!(prefilter(&c, &[]), Ok(()));
  }

  #[test]
  fn prefilter_reports_missing_shape_first() {
    let mut c = candidate(&["1", "2", "3", "4"], 0, "1");
    c.question = "  ".into();
    assert_eq!(prefilter(&c, &[]), Err(FilterReject::MissingQuestion));

    let mut c = candidate(&[], 0, "1");
    c.options.clear();
    assert_eq!(prefilter(&c, &[]), Err(FilterReject::MissingOptions));
  }
}
