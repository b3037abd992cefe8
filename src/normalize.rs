//! Canonicalization of answer strings and question texts for equivalence
//! comparison.
//!
//! Answers coming back from the model are free text: "$1,234.00", "1234",
//! "1,234" and "1234.0000" must all compare equal. We never parse numbers —
//! answers may be expressions like "3x + 2" — so the comparison stays purely
//! textual.

/// Canonical form of an answer string. Empty input maps to the empty string.
///
/// Steps, in order: trim, drop backslash escape characters, strip
/// leading/trailing currency `$`, collapse whitespace runs, lowercase, remove
/// thousands-separating commas, and — only when the value carries a decimal
/// point — strip trailing zeros and a trailing bare point.
pub fn normalize_answer(raw: &str) -> String {
  let s = raw.trim();
  if s.is_empty() {
    return String::new();
  }

  // Escapes go first so "\$42" sheds its currency marker too.
  let unescaped: String = s.chars().filter(|c| *c != '\\').collect();
  let bare = unescaped.trim().trim_matches('$').trim();
  let collapsed = bare.split_whitespace().collect::<Vec<_>>().join(" ");
  let mut out = collapsed.to_lowercase().replace(',', "");

  // Trailing zeros are only meaningless after a decimal point ("1200" must
  // keep its zeros, "12.00" must not).
  if out.contains('.') {
    while out.ends_with('0') {
      out.pop();
    }
    if out.ends_with('.') {
      out.pop();
    }
  }
  out
}

/// Two answers are equivalent when their canonical forms are equal.
pub fn answers_match(a: &str, b: &str) -> bool {
  normalize_answer(a) == normalize_answer(b)
}

/// Canonical form of a question text, used for duplicate comparison and the
/// storage uniqueness key: case-, whitespace- and punctuation-insensitive.
pub fn normalize_question_text(raw: &str) -> String {
  let stripped: String = raw
    .chars()
    .filter(|c| !c.is_ascii_punctuation())
    .collect();
  stripped
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn currency_commas_and_trailing_zeros_compare_equal() {
    assert_eq!(normalize_answer("$1,234.00"), normalize_answer("1234"));
    assert_eq!(normalize_answer("1,234"), "1234");
    assert_eq!(normalize_answer("1234.00"), "1234");
    assert_eq!(normalize_answer("$1234"), "1234");
  }

  #[test]
  fn trailing_zeros_survive_without_decimal_point() {
    assert_eq!(normalize_answer("1200"), "1200");
    assert_eq!(normalize_answer("0.500"), "0.5");
    assert_eq!(normalize_answer("10.0"), "10");
  }

  #[test]
  fn normalization_is_idempotent() {
    for s in ["$1,234.00", "  42 ", "3x + 2", "\\frac{1}{2}", "", "10.10"] {
      let once = normalize_answer(s);
      assert_eq!(normalize_answer(&once), once, "input: {s:?}");
    }
  }

  #[test]
  fn expressions_stay_textual() {
    // No arithmetic: "1/2" and "0.5" are different canonical strings.
    assert_ne!(normalize_answer("1/2"), normalize_answer("0.5"));
    assert_eq!(normalize_answer("3X +  2"), "3x + 2");
  }

  #[test]
  fn markup_escapes_are_dropped() {
    assert_eq!(normalize_answer("\\$42"), "42");
    assert!(answers_match("\\frac{1}{2}", "frac{1}{2}"));
  }

  #[test]
  fn empty_input_stays_empty() {
    assert_eq!(normalize_answer(""), "");
    assert_eq!(normalize_answer("   "), "");
  }

  #[test]
  fn question_text_ignores_case_spacing_punctuation() {
    let a = normalize_question_text("What is 5 + 3?");
    let b = normalize_question_text("what  is 5 + 3");
    assert_eq!(a, b);
  }
}
