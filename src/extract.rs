//! Item Extractor — message to checkable items, no I/O.
//!
//! Order of emission: file attachments of the host message, then text links
//! in first-seen order, then (for forwards) the linked message's items. The
//! list is de-duplicated by url across all sources. The common case — plain
//! text, no links, no attachments — returns an empty vec without allocating
//! anything beyond it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bot::types::{Message, MessageBody};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid url pattern"));

/// What kind of checkable item this is. Persisted and sent over the wire as
/// `link` / `file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Link,
    File,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Link => "link",
            ItemKind::File => "file",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "file" => ItemKind::File,
            _ => ItemKind::Link,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One checkable item pulled out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedItem {
    /// Identity: the raw url for links, `file:<fileId>` for files.
    pub url: String,
    pub kind: ItemKind,
    pub file_id: Option<i64>,
    /// Retrieval token for downloading the file's bytes.
    pub file_token: Option<String>,
}

/// Extract all checkable items from a message, forwarded payload included.
pub fn extract_items(message: &Message) -> Vec<ExtractedItem> {
    let mut items = Vec::new();
    extract_from_body(&message.body, &mut items);

    if let Some(link) = &message.link
        && link.kind == "forward"
        && let Some(body) = &link.message
    {
        extract_from_body(body, &mut items);
    }

    items
}

fn extract_from_body(body: &MessageBody, items: &mut Vec<ExtractedItem>) {
    for att in &body.attachments {
        let Some(payload) = &att.payload else {
            continue;
        };

        match att.kind.as_str() {
            "file" => {
                if let Some(file_id) = payload.resolved_file_id() {
                    push_unique(
                        items,
                        ExtractedItem {
                            url: format!("file:{file_id}"),
                            kind: ItemKind::File,
                            file_id: Some(file_id),
                            file_token: payload.token.clone(),
                        },
                    );
                }
            }
            "link" => {
                if let Some(url) = &payload.url {
                    push_unique(
                        items,
                        ExtractedItem {
                            url: url.clone(),
                            kind: ItemKind::Link,
                            file_id: None,
                            file_token: None,
                        },
                    );
                }
            }
            _ => {}
        }
    }

    let text = body.text.as_deref().unwrap_or("");
    if !text.is_empty() {
        for m in URL_PATTERN.find_iter(text) {
            push_unique(
                items,
                ExtractedItem {
                    url: m.as_str().to_string(),
                    kind: ItemKind::Link,
                    file_id: None,
                    file_token: None,
                },
            );
        }
    }
}

fn push_unique(items: &mut Vec<ExtractedItem>, item: ExtractedItem) {
    if !items.iter().any(|i| i.url == item.url) {
        items.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::types::{Attachment, AttachmentPayload, LinkedMessage};

    fn message_with_text(text: &str) -> Message {
        Message {
            body: MessageBody {
                text: Some(text.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn file_attachment(id: i64, token: &str) -> Attachment {
        Attachment {
            kind: "file".to_string(),
            payload: Some(AttachmentPayload {
                id: Some(id),
                token: Some(token.to_string()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn plain_text_yields_nothing() {
        let items = extract_items(&message_with_text("hello there, no links here"));
        assert!(items.is_empty());
    }

    #[test]
    fn empty_message_yields_nothing() {
        assert!(extract_items(&Message::default()).is_empty());
    }

    #[test]
    fn text_links_in_left_to_right_order() {
        let items = extract_items(&message_with_text(
            "see http://a.example/1 and also https://b.example/2 thanks",
        ));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "http://a.example/1");
        assert_eq!(items[1].url, "https://b.example/2");
        assert!(items.iter().all(|i| i.kind == ItemKind::Link));
    }

    #[test]
    fn repeated_url_emitted_once() {
        let items =
            extract_items(&message_with_text("http://dup.example http://dup.example again"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "http://dup.example");
    }

    #[test]
    fn file_attachment_becomes_synthetic_url() {
        let msg = Message {
            body: MessageBody {
                attachments: vec![file_attachment(42, "tok-42")],
                ..Default::default()
            },
            ..Default::default()
        };
        let items = extract_items(&msg);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "file:42");
        assert_eq!(items[0].kind, ItemKind::File);
        assert_eq!(items[0].file_id, Some(42));
        assert_eq!(items[0].file_token.as_deref(), Some("tok-42"));
    }

    #[test]
    fn files_come_before_text_links() {
        let msg = Message {
            body: MessageBody {
                text: Some("grab http://late.example".to_string()),
                attachments: vec![file_attachment(7, "t")],
                ..Default::default()
            },
            ..Default::default()
        };
        let items = extract_items(&msg);
        assert_eq!(items[0].url, "file:7");
        assert_eq!(items[1].url, "http://late.example");
    }

    #[test]
    fn attachment_without_file_id_is_skipped() {
        let msg = Message {
            body: MessageBody {
                attachments: vec![Attachment {
                    kind: "file".to_string(),
                    payload: Some(AttachmentPayload::default()),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(extract_items(&msg).is_empty());
    }

    #[test]
    fn forwarded_items_appended_after_host_items() {
        let msg = Message {
            body: MessageBody {
                text: Some("mine: http://host.example".to_string()),
                ..Default::default()
            },
            link: Some(LinkedMessage {
                kind: "forward".to_string(),
                message: Some(MessageBody {
                    text: Some("theirs: http://fwd.example".to_string()),
                    attachments: vec![file_attachment(9, "t9")],
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        let items = extract_items(&msg);
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["http://host.example", "file:9", "http://fwd.example"]);
    }

    #[test]
    fn reply_link_is_not_extracted() {
        let msg = Message {
            link: Some(LinkedMessage {
                kind: "reply".to_string(),
                message: Some(MessageBody {
                    text: Some("http://replied.example".to_string()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        assert!(extract_items(&msg).is_empty());
    }

    #[test]
    fn dedup_spans_attachment_and_text() {
        let msg = Message {
            body: MessageBody {
                text: Some("http://x.example".to_string()),
                attachments: vec![Attachment {
                    kind: "link".to_string(),
                    payload: Some(AttachmentPayload {
                        url: Some("http://x.example".to_string()),
                        ..Default::default()
                    }),
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(extract_items(&msg).len(), 1);
    }

    #[test]
    fn malformed_update_json_still_extracts() {
        // Fields the extractor does not need are absent entirely.
        let msg: Message =
            serde_json::from_str(r#"{"body": {"text": "go http://ok.example"}}"#).unwrap();
        let items = extract_items(&msg);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "http://ok.example");
    }
}
