//! Task wire format — one JSON object per queue message.

use serde::{Deserialize, Serialize};

use crate::extract::{ExtractedItem, ItemKind};

/// Chat addressing carried alongside every task so the worker can deliver
/// the verdict reply without another platform lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskChat {
    #[serde(default)]
    pub chat_id: Option<i64>,
    /// `dialog` for one-to-one conversations, `chat` for groups.
    #[serde(default)]
    pub chat_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// A single check task, published per extracted item. Ephemeral: exists only
/// on the wire between publish and ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTask {
    /// Originating message id, used to thread the verdict reply.
    #[serde(default)]
    pub message_id: Option<String>,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub chat: TaskChat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_token: Option<String>,
}

impl CheckTask {
    /// Build a task for one extracted item of a message.
    pub fn for_item(item: &ExtractedItem, message_id: Option<String>, chat: TaskChat) -> Self {
        Self {
            message_id,
            url: item.url.clone(),
            kind: item.kind,
            chat,
            file_id: item.file_id,
            file_token: item.file_token.clone(),
        }
    }

    /// Shape validation for consumed payloads. A malformed task cannot become
    /// valid by retrying, so the worker acks and drops it.
    pub fn validate(&self) -> Result<(), String> {
        if self.message_id.as_deref().unwrap_or("").is_empty() {
            return Err("missing message_id".to_string());
        }
        if self.url.is_empty() {
            return Err("missing url".to_string());
        }
        if self.chat.chat_id.is_none() {
            return Err("missing chat.chat_id".to_string());
        }
        if self.kind == ItemKind::File && self.file_token.as_deref().unwrap_or("").is_empty() {
            return Err("file task missing file_token".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_task() -> CheckTask {
        CheckTask {
            message_id: Some("mid.1".to_string()),
            url: "http://a.example".to_string(),
            kind: ItemKind::Link,
            chat: TaskChat {
                chat_id: Some(42),
                chat_type: Some("chat".to_string()),
                user_id: Some(7),
            },
            file_id: None,
            file_token: None,
        }
    }

    #[test]
    fn wire_field_names_match_the_contract() {
        let json = serde_json::to_value(link_task()).unwrap();
        assert_eq!(json["message_id"], "mid.1");
        assert_eq!(json["url"], "http://a.example");
        assert_eq!(json["type"], "link");
        assert_eq!(json["chat"]["chat_id"], 42);
        assert_eq!(json["chat"]["chat_type"], "chat");
        // Optional fields are omitted, not null.
        assert!(json.get("file_id").is_none());
        assert!(json.get("file_token").is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let task = CheckTask {
            kind: ItemKind::File,
            url: "file:9".to_string(),
            file_id: Some(9),
            file_token: Some("tok".to_string()),
            ..link_task()
        };
        let bytes = serde_json::to_vec(&task).unwrap();
        let back: CheckTask = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn validate_accepts_complete_link_task() {
        assert!(link_task().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut t = link_task();
        t.message_id = None;
        assert!(t.validate().is_err());

        let mut t = link_task();
        t.chat.chat_id = None;
        assert!(t.validate().is_err());

        let mut t = link_task();
        t.kind = ItemKind::File;
        assert_eq!(t.validate().unwrap_err(), "file task missing file_token");
    }
}
