//! Notification payloads pushed over the channel.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::source::token_string;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id", deserialize_with = "token_string")]
    pub id: String,

    /// `like`, `comment`, `connection`, ..., free-form, shown as-is.
    #[serde(default, alias = "type")]
    pub kind: String,

    /// Who triggered it.
    #[serde(default, alias = "sender", alias = "from")]
    pub actor: Option<String>,

    #[serde(default, alias = "text", alias = "content")]
    pub message: String,

    #[serde(default, alias = "isRead")]
    pub read: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Decode a pushed payload.  Some servers wrap it as
    /// `{"notification": {...}}`.
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        let inner = payload.get("notification").unwrap_or(payload);
        Notification::deserialize(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_flat_payload() {
        let n = Notification::from_payload(&json!({
            "id": 5,
            "type": "like",
            "sender": "Grace",
            "text": "Grace liked your post",
            "isRead": false
        }))
        .unwrap();
        assert_eq!(n.id, "5");
        assert_eq!(n.kind, "like");
        assert_eq!(n.actor.as_deref(), Some("Grace"));
        assert_eq!(n.message, "Grace liked your post");
        assert!(!n.read);
    }

    #[test]
    fn decodes_wrapped_payload() {
        let n = Notification::from_payload(&json!({
            "notification": {"id": "n1", "message": "hi", "read": true}
        }))
        .unwrap();
        assert_eq!(n.id, "n1");
        assert!(n.read);
    }

    #[test]
    fn rejects_payload_without_id() {
        assert!(Notification::from_payload(&json!({"message": "?"})).is_err());
    }
}
