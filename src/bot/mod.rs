//! Chat-platform surface: the Max Bot API client, ingestion of inbound
//! messages, and membership-event handling.

pub mod client;
pub mod handler;
pub mod membership;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ChannelError;
use types::{ChatMember, Update};

pub use client::MaxClient;
pub use handler::IngestHandler;
pub use membership::MembershipHandler;

/// Backoff after a failed update poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Outbound message delivery, optionally threaded as a reply.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_reply(
        &self,
        chat_id: i64,
        reply_to: Option<&str>,
        text: &str,
    ) -> Result<(), ChannelError>;
}

/// Retrieval of an attachment's bytes by its platform token.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    async fn fetch_file(&self, token: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Group-chat member listing for roster scans.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn chat_members(&self, chat_id: i64) -> Result<Vec<ChatMember>, ChannelError>;
}

/// Long-poll loop: fetch updates and dispatch them. Per-event errors are
/// logged and never tear the loop down.
pub async fn run(
    client: Arc<MaxClient>,
    ingest: IngestHandler,
    membership: MembershipHandler,
) -> ! {
    let mut marker: Option<i64> = None;
    info!("Bot started; polling for updates");

    loop {
        let (updates, next_marker) = match client.poll_updates(marker).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Update poll failed");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };
        marker = next_marker.or(marker);

        for update in updates {
            match update {
                Update::MessageCreated { message } => {
                    if let Err(e) = ingest.handle_message(&message).await {
                        warn!(error = %e, "Message handling failed");
                    }
                }
                Update::BotAdded { chat_id, .. } => {
                    if let Err(e) = membership.on_bot_added(chat_id).await {
                        warn!(chat_id, error = %e, "bot_added handling failed");
                    }
                }
                Update::UserAdded { chat_id, user } => {
                    let Some(user) = user else { continue };
                    if let Err(e) = membership.on_user_added(chat_id, &user).await {
                        warn!(chat_id, error = %e, "user_added handling failed");
                    }
                }
                Update::Unknown => {}
            }
        }
    }
}
