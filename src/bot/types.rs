//! Wire types for the Max Bot API update stream.
//!
//! Every field is optional or defaulted: the platform omits fields freely and
//! a partially-populated update must never fail deserialization.

use serde::Deserialize;

/// One entry from `GET /updates`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "update_type", rename_all = "snake_case")]
pub enum Update {
    MessageCreated {
        message: Message,
    },
    /// The bot was added to a group chat.
    BotAdded {
        chat_id: i64,
        #[serde(default)]
        user: Option<ChatMember>,
    },
    /// A user joined a chat the bot is in.
    UserAdded {
        chat_id: i64,
        #[serde(default)]
        user: Option<ChatMember>,
    },
    #[serde(other)]
    Unknown,
}

/// An inbound chat message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub recipient: Recipient,
    #[serde(default)]
    pub body: MessageBody,
    /// Forward/reply link carrying the linked message's payload.
    #[serde(default)]
    pub link: Option<LinkedMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recipient {
    #[serde(default)]
    pub chat_id: Option<i64>,
    /// `dialog` for one-to-one conversations, `chat` for groups.
    #[serde(default)]
    pub chat_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageBody {
    /// Platform message id, used to thread replies.
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A forwarded or replied-to message attached to the host message.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub file_id: Option<i64>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl AttachmentPayload {
    /// The platform is inconsistent about the file-id field name.
    pub fn resolved_file_id(&self) -> Option<i64> {
        self.id.or(self.file_id)
    }
}

/// A chat member as reported by membership events and the member list.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub user_id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl ChatMember {
    /// Best-effort display name for roster lines.
    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("user {}", self.user_id))
    }
}
