//! PersonKey - identifies the same real-world person across events
//!
//! Two independently created events refer to the same person when their
//! normalized (name, record-number) pairs match. Events without a record
//! number never form a key.

use serde::{Deserialize, Serialize};

use crate::domain::Event;

/// Normalized (name, record-number) identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonKey {
    pub name_key: String,
    pub record_key: String,
}

impl PersonKey {
    /// Build a key from raw fields; `None` when the record number is empty
    pub fn new(name: &str, record_number: &str) -> Option<Self> {
        let record_key = normalize(record_number);
        if record_key.is_empty() {
            return None;
        }
        Some(Self {
            name_key: normalize(name),
            record_key,
        })
    }

    pub fn for_event(event: &Event) -> Option<Self> {
        event
            .record_number()
            .and_then(|record| Self::new(&event.title, record))
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases() {
        let key = PersonKey::new("  Jane Doe ", " REC1 ").unwrap();
        assert_eq!(key.name_key, "jane doe");
        assert_eq!(key.record_key, "rec1");
    }

    #[test]
    fn empty_record_number_has_no_key() {
        assert!(PersonKey::new("Jane Doe", "").is_none());
        assert!(PersonKey::new("Jane Doe", "   ").is_none());
    }

    #[test]
    fn keys_match_across_case_and_whitespace() {
        let a = PersonKey::new("Jane Doe", "REC1").unwrap();
        let b = PersonKey::new("jane doe", "rec1  ").unwrap();
        assert_eq!(a, b);
    }
}
