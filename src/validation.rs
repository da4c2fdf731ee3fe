//! Pure validation helpers: phone normalization, text sanitization,
//! and whole-record checks.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Parent, Student};

/// Canonical Algerian mobile number: `+213` then a 9-digit subscriber
/// number starting with 5, 6, or 7.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+213[567]\d{8}$").expect("phone regex"));

static NINE_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{9}$").expect("digits regex"));

/// Validation failures. Handled inside the flows; never escapes to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid Algerian phone number")]
    InvalidPhone,

    #[error("name must be between {min} and {max} characters")]
    NameLength { min: usize, max: usize },

    #[error("at least one {field} must be selected")]
    EmptySelection { field: &'static str },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Rewrite any accepted national/international dialing-prefix spelling into
/// the canonical `+213XXXXXXXXX` form. Total: unparseable input comes back
/// stripped but otherwise untouched.
pub fn normalize_phone(raw: &str) -> String {
    let s: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = s.strip_prefix("00213") {
        return format!("+213{rest}");
    }
    if let Some(rest) = s.strip_prefix("0213") {
        return format!("+213{rest}");
    }
    if s.starts_with("+213") {
        return s;
    }
    if s.starts_with("213") {
        return format!("+{s}");
    }
    if let Some(rest) = s.strip_prefix('0') {
        return format!("+213{rest}");
    }
    if NINE_DIGITS_RE.is_match(&s) {
        return format!("+213{s}");
    }
    s
}

/// Normalize, then accept only canonical Algerian mobile numbers.
pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let normalized = normalize_phone(raw);
    if PHONE_RE.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidPhone)
    }
}

/// Truncate free text to `max_len` characters and trim surrounding
/// whitespace. Bounds storage and keeps outbound messages well-formed.
pub fn sanitize_text(raw: &str, max_len: usize) -> String {
    raw.chars().take(max_len).collect::<String>().trim().to_string()
}

/// Escape every character that Telegram's Markdown treats as markup, so
/// admin-authored broadcast text renders literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 100;

fn check_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len < NAME_MIN || len > NAME_MAX {
        return Err(ValidationError::NameLength {
            min: NAME_MIN,
            max: NAME_MAX,
        });
    }
    Ok(())
}

/// Validate a fully assembled student record before it is persisted.
/// Signals the first violated constraint.
pub fn validate_student(student: &Student) -> Result<(), ValidationError> {
    check_name(&student.name)?;
    validate_phone(&student.phone)?;
    if student.year.is_empty() {
        return Err(ValidationError::MissingField("year"));
    }
    if student.subjects.is_empty() {
        return Err(ValidationError::EmptySelection { field: "subject" });
    }
    if student.teachers.is_empty() {
        return Err(ValidationError::EmptySelection { field: "teacher" });
    }
    Ok(())
}

/// Validate a fully assembled parent record before it is persisted.
pub fn validate_parent(parent: &Parent) -> Result<(), ValidationError> {
    check_name(&parent.name)?;
    validate_phone(&parent.phone)?;
    if parent.child_ref.is_empty() {
        return Err(ValidationError::MissingField("child reference"));
    }
    Ok(())
}
