//! Error taxonomy for the pipeline and the review state machine.
//!
//! Per-candidate failures are values (a candidate is classified, logged and
//! dropped; the batch continues). Only whole-stage failures become one of the
//! variants below and abort a run.

use thiserror::Error;

/// Whole-run failures of the generation pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// Missing/blank collaborator connection parameters. Fatal, never retried.
  #[error("model connection is not configured: {0}")]
  Config(String),

  /// Network / timeout / non-2xx from the model service.
  #[error("model request failed: {0}")]
  Collaborator(String),

  /// Response that stays unparseable even after fence stripping and
  /// object-literal recovery.
  #[error("model response unusable: {0}")]
  MalformedResponse(String),

  /// Every candidate was dropped by the structural pre-filter.
  #[error("no usable candidates survived structural filtering")]
  NoSurvivors,

  /// Correction/verification emptied the batch before persistence.
  #[error("no candidates passed verification")]
  NothingVerified,

  /// Every verified question already exists for this (class, tag).
  #[error("all generated questions already exist for this class and tag")]
  AllDuplicates,
}

/// Caller-visible failures of review transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReviewError {
  #[error("question not found: {0}")]
  NotFound(String),

  #[error("question {0} is already approved")]
  AlreadyApproved(String),

  #[error("question {0} is already rejected")]
  AlreadyRejected(String),
}
