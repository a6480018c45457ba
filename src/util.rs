//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// No nesting or conditionals; unknown placeholders are left untouched.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Keep at most `max` chars of `s`, appending `...` when something was cut.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((cut, _)) => format!("{}...", &s[..cut]),
    None => s.to_string(),
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((cut, _)) => format!("{}… ({} bytes total)", &s[..cut], s.len()),
    None => s.to_string(),
  }
}

/// Models sometimes wrap JSON in a Markdown fence even when asked not to.
/// Returns the inner body when `s` is a single fenced block, otherwise `s` trimmed.
pub fn strip_code_fence(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  let Some(body) = rest.strip_suffix("```") else { return t };
  // Drop the info string ("json", "JSON", ...) on the opening line.
  match body.find('\n') {
    Some(nl) => body[nl + 1..].trim(),
    None => {
      let body = body.trim();
      let info_len = body.find(|c: char| !c.is_ascii_alphanumeric()).unwrap_or(0);
      if body[..info_len].starts_with(|c: char| c.is_ascii_alphabetic()) {
        body[info_len..].trim()
      } else {
        body
      }
    }
  }
}

/// JS-style truthiness for optional text: `None` and blank strings are both "absent".
pub fn non_blank(s: Option<&str>) -> Option<&str> {
  s.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fills_known_placeholders_only() {
    let out = fill_template("{a} and {b} but not {c}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and y but not {c}");
  }

  #[test]
  fn truncates_long_text_with_ellipsis() {
    let long = "a".repeat(310);
    let out = truncate_with_ellipsis(&long, 300);
    assert_eq!(out.len(), 303);
    assert!(out.ends_with("..."));
    assert_eq!(&out[..300], &long[..300]);
  }

  #[test]
  fn keeps_text_at_or_below_limit() {
    let exact = "b".repeat(300);
    assert_eq!(truncate_with_ellipsis(&exact, 300), exact);
    assert_eq!(truncate_with_ellipsis("short", 300), "short");
  }

  #[test]
  fn truncation_counts_chars_not_bytes() {
    let s = "é".repeat(5);
    assert_eq!(truncate_with_ellipsis(&s, 3), "ééé...");
  }

  #[test]
  fn strips_json_fence() {
    assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
    assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
    assert_eq!(strip_code_fence("```JSON[1, 2]```"), "[1, 2]");
  }

  #[test]
  fn blank_is_absent() {
    assert_eq!(non_blank(Some("  ")), None);
    assert_eq!(non_blank(None), None);
    assert_eq!(non_blank(Some("x")), Some("x"));
  }
}
