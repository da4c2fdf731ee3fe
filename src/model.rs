//! Record models and the fixed option catalogs used by registration.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Academic years offered for selection (single-select).
pub const YEARS: [&str; 4] = ["1 متوسط", "2 متوسط", "3 متوسط", "4 متوسط"];

/// Subjects a student can follow (multi-select).
pub const SUBJECTS: [&str; 7] = [
    "رياضيات",
    "علوم",
    "لغة عربية",
    "إنجليزية",
    "فرنسية",
    "تاريخ",
    "تربية إسلامية",
];

/// Teachers a student can follow (multi-select).
pub const TEACHERS: [&str; 4] = [
    "الأستاذ قادري",
    "الأستاذة فاطمة",
    "الأستاذ بن عمارة",
    "الأستاذة شافية",
];

/// The two kinds of persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Student,
    Parent,
}

impl RecordKind {
    /// Prefix used in generated record IDs.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Student => "STU",
            Self::Parent => "PAR",
        }
    }
}

/// A registered student.
///
/// `phone` is unique per kind; `student_id` is immutable once assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    /// Canonical `+213XXXXXXXXX` form.
    pub phone: String,
    pub year: String,
    pub subjects: Vec<String>,
    pub teachers: Vec<String>,
    /// Telegram chat/user ID used as the outbound recipient identifier.
    pub telegram_id: String,
    pub student_id: String,
    pub registered_at: DateTime<Utc>,
}

/// Whether a parent record was associated with an existing student at
/// registration time. Set once at creation, never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    Unlinked,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::Unlinked => write!(f, "unlinked"),
        }
    }
}

/// A registered parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parent {
    pub name: String,
    /// Canonical `+213XXXXXXXXX` form.
    pub phone: String,
    /// The linked child's phone when `Linked`, otherwise the raw reference
    /// the parent typed, stored verbatim.
    pub child_ref: String,
    pub link_status: LinkStatus,
    pub telegram_id: String,
    pub parent_id: String,
    pub registered_at: DateTime<Utc>,
}

/// Generate a human-readable record ID: `<PREFIX>-<millis>-<random>`.
pub fn generate_record_id(kind: RecordKind) -> String {
    let millis = Utc::now().timestamp_millis();
    let random: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}-{}-{}", kind.id_prefix(), millis, random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn student_id_format() {
        let id = generate_record_id(RecordKind::Student);
        let re = Regex::new(r"^STU-\d+-\d+$").unwrap();
        assert!(re.is_match(&id), "unexpected ID: {id}");
    }

    #[test]
    fn parent_id_format() {
        let id = generate_record_id(RecordKind::Parent);
        let re = Regex::new(r"^PAR-\d+-\d+$").unwrap();
        assert!(re.is_match(&id), "unexpected ID: {id}");
    }

    #[test]
    fn link_status_display() {
        assert_eq!(LinkStatus::Linked.to_string(), "linked");
        assert_eq!(LinkStatus::Unlinked.to_string(), "unlinked");
    }

    #[test]
    fn link_status_serde_roundtrip() {
        let json = serde_json::to_string(&LinkStatus::Unlinked).unwrap();
        assert_eq!(json, "\"unlinked\"");
        let parsed: LinkStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LinkStatus::Unlinked);
    }
}
