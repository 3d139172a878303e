//! The small structured record carried inside every version.

use serde_derive::{Deserialize, Serialize};

/// Kind of change a version represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Feat,
    Fix,
    Refactor,
    Style,
    Doc,
    Auto,
    Revert,
}

/// A version's commit message: a required summary plus optional structured
/// fields. Serialized as part of the canonical JSON that feeds the version
/// hash, so field order here must stay alphabetical under serde's default
/// struct-field serialization to match `message_json` round-trips.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub summary: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<MessageType>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub related: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reverted_commit: Option<String>,
}

impl Message {
    pub fn new(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), kind: None, related: None, reverted_commit: None }
    }

    pub fn auto(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), kind: Some(MessageType::Auto), related: None, reverted_commit: None }
    }

    pub fn revert(summary: impl Into<String>, reverted_commit: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            kind: Some(MessageType::Revert),
            related: None,
            reverted_commit: Some(reverted_commit.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_optional_fields() {
        let m = Message::new("Add note 1");
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"summary":"Add note 1"}"#);
    }

    #[test]
    fn revert_carries_reverted_commit_and_kind() {
        let m = Message::revert("Revert v1", "abc123");
        assert_eq!(m.kind, Some(MessageType::Revert));
        assert_eq!(m.reverted_commit.as_deref(), Some("abc123"));
    }
}
