//! Parse-or-reject boundary for model responses.
//!
//! The model returns free-form text that is *supposed* to be a JSON array of
//! candidates, but in practice arrives wrapped in code fences, prefixed with
//! a language tag, or truncated mid-array. We sanitize, try a strict parse,
//! and only then fall back to scanning for individually well-formed object
//! literals. The result is a tagged outcome — callers never poke at
//! half-parsed values.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Outcome of the untrusted-response boundary.
#[derive(Debug)]
pub enum Parsed<T> {
  /// Parsed strictly, or recovered item-by-item (`recovered = true`).
  Ok { items: Vec<T>, recovered: bool },
  /// Nothing usable, with the reason for diagnostics.
  Failed(String),
}

/// Strip markdown code fencing and an optional leading language tag
/// ("json", "JSON") from a model response.
pub fn strip_code_fences(raw: &str) -> String {
  let mut s = raw.trim();

  if s.starts_with("```") {
    s = s.trim_start_matches("```").trim_start();
    // A language tag sits on the fence line: ```json\n[...]
    for tag in ["json", "JSON"] {
      if let Some(rest) = s.strip_prefix(tag) {
        s = rest.trim_start();
        break;
      }
    }
    if let Some(end) = s.rfind("```") {
      s = &s[..end];
    }
  } else if let Some(rest) = s.strip_prefix("json") {
    // Bare language tag without fencing shows up too.
    if rest.trim_start().starts_with(['[', '{']) {
      s = rest;
    }
  }

  s.trim().to_string()
}

/// Parse a model response into a list of `T`.
///
/// Strict path: the sanitized text is one JSON array (or a single object).
/// Recovery path: scan for balanced top-level `{...}` literals and keep the
/// ones that deserialize — this salvages well-formed items from a truncated
/// or comma-mangled array.
pub fn parse_items<T: DeserializeOwned>(raw: &str) -> Parsed<T> {
  let text = strip_code_fences(raw);
  if text.is_empty() {
    return Parsed::Failed("response is empty".into());
  }

  match serde_json::from_str::<Vec<T>>(&text) {
    Ok(items) if !items.is_empty() => return Parsed::Ok { items, recovered: false },
    Ok(_) => return Parsed::Failed("response array is empty".into()),
    Err(e) => {
      debug!(target: "pipeline", error = %e, "strict array parse failed, trying object recovery");
    }
  }
  if let Ok(single) = serde_json::from_str::<T>(&text) {
    return Parsed::Ok { items: vec![single], recovered: false };
  }

  let mut items = Vec::new();
  for literal in find_object_literals(&text) {
    match serde_json::from_str::<T>(literal) {
      Ok(item) => items.push(item),
      Err(e) => {
        debug!(target: "pipeline", error = %e, "skipping unparseable object literal");
      }
    }
  }
  if items.is_empty() {
    warn!(target: "pipeline", len = text.len(), "object recovery found nothing usable");
    Parsed::Failed("no parseable JSON found in response".into())
  } else {
    Parsed::Ok { items, recovered: true }
  }
}

/// Find balanced `{...}` literals at the top nesting level of `text`,
/// honoring string escapes. Byte-index based; slices are valid because
/// braces and quotes are single-byte ASCII.
fn find_object_literals(text: &str) -> Vec<&str> {
  let bytes = text.as_bytes();
  let mut out = Vec::new();
  let mut depth = 0usize;
  let mut start = 0usize;
  let mut in_string = false;
  let mut escape = false;

  for (i, &b) in bytes.iter().enumerate() {
    if in_string {
      if escape {
        escape = false;
        continue;
      }
      match b {
        b'\\' => escape = true,
        b'"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match b {
      b'"' => in_string = true,
      b'{' => {
        if depth == 0 {
          start = i;
        }
        depth += 1;
      }
      b'}' => {
        if depth > 0 {
          depth -= 1;
          if depth == 0 {
            out.push(&text[start..=i]);
          }
        }
      }
      _ => {}
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;

  #[derive(Debug, Deserialize, PartialEq)]
  struct Item {
    x: i32,
  }

  #[test]
  fn strips_fences_and_language_tag() {
    assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
    assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
    assert_eq!(strip_code_fences("json [1]"), "[1]");
    assert_eq!(strip_code_fences("[1]"), "[1]");
  }

  #[test]
  fn strict_array_parse_wins() {
    match parse_items::<Item>("```json\n[{\"x\":1},{\"x\":2}]\n```") {
      Parsed::Ok { items, recovered } => {
        assert_eq!(items, vec![Item { x: 1 }, Item { x: 2 }]);
        assert!(!recovered);
      }
      Parsed::Failed(r) => panic!("unexpected failure: {r}"),
    }
  }

  #[test]
  fn recovers_objects_from_truncated_array() {
    // Array is cut off mid-third-object; the first two are salvageable.
    let raw = r#"[{"x":1}, {"x":2}, {"x":"#;
    match parse_items::<Item>(raw) {
      Parsed::Ok { items, recovered } => {
        assert_eq!(items, vec![Item { x: 1 }, Item { x: 2 }]);
        assert!(recovered);
      }
      Parsed::Failed(r) => panic!("unexpected failure: {r}"),
    }
  }

  #[test]
  fn recovery_skips_broken_literals_and_honors_strings() {
    let raw = r#"noise {"x": 7} text {"x": "not a number"} brace-in-string {"x": 9, "s": "}"}"#;
    match parse_items::<serde_json::Value>(raw) {
      Parsed::Ok { items, recovered } => {
        assert!(recovered);
        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["s"], "}");
      }
      Parsed::Failed(r) => panic!("unexpected failure: {r}"),
    }
  }

  #[test]
  fn empty_and_hopeless_inputs_fail() {
    assert!(matches!(parse_items::<Item>(""), Parsed::Failed(_)));
    assert!(matches!(parse_items::<Item>("```json\n```"), Parsed::Failed(_)));
    assert!(matches!(parse_items::<Item>("sorry, I can't help"), Parsed::Failed(_)));
    assert!(matches!(parse_items::<Item>("[]"), Parsed::Failed(_)));
  }
}
