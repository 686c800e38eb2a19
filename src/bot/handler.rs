//! Ingestion — inbound messages to persisted items and queued tasks.
//!
//! The handler acknowledges receipt immediately (pre-analysis), records the
//! sighting, and publishes one task per item; the verdict itself arrives
//! later from the worker. Handler errors are logged by the poll loop and
//! never tear it down.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bot::ReplySink;
use crate::bot::types::Message;
use crate::error::Result;
use crate::extract::{self, ExtractedItem, ItemKind};
use crate::queue::{CheckTask, TaskChat, TaskPublisher};
use crate::store::ItemStore;

const GREETING: &str = "Hi! I help you avoid dangerous links and files.\n\n\
    Send me a link or a file and I will check it, or add me to a group \
    for automatic checking of everything shared there.";

pub struct IngestHandler {
    store: Arc<dyn ItemStore>,
    queue: Arc<dyn TaskPublisher>,
    replies: Arc<dyn ReplySink>,
}

impl IngestHandler {
    pub fn new(
        store: Arc<dyn ItemStore>,
        queue: Arc<dyn TaskPublisher>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            store,
            queue,
            replies,
        }
    }

    pub async fn handle_message(&self, message: &Message) -> Result<()> {
        let Some(chat_id) = message.recipient.chat_id else {
            warn!("Message without chat_id; ignoring");
            return Ok(());
        };
        let mid = message.body.mid.as_deref();

        let text = message.body.text.as_deref().unwrap_or("");
        if text.trim_start().starts_with("/start") {
            self.replies.send_reply(chat_id, None, GREETING).await?;
            return Ok(());
        }

        let items = extract::extract_items(message);
        if items.is_empty() {
            return Ok(());
        }

        self.send_receipt(chat_id, mid, &items).await;

        let chat_type = message.recipient.chat_type.as_deref().unwrap_or("dialog");
        let sender_id = message.sender.user_id;
        let chat = TaskChat {
            chat_id: Some(chat_id),
            chat_type: Some(chat_type.to_string()),
            user_id: message.recipient.user_id.or(sender_id),
        };

        for item in &items {
            let row = self.store.ensure_item(&item.url, item.kind).await?;

            // Counters are tracked for group chats only, never for dialogs.
            if chat_type != "dialog"
                && let Some(sender_id) = sender_id
            {
                let count = self.store.record_user_sighting(sender_id, row.url_id).await?;
                debug!(user_id = sender_id, url = %item.url, count, "Sighting recorded");
            }

            let task = CheckTask::for_item(item, mid.map(str::to_string), chat.clone());
            self.queue.publish(&task).await?;
            info!(url = %item.url, kind = %item.kind, "Task queued");
        }

        Ok(())
    }

    /// Immediate "working on it" reply, sent before any analysis happens.
    async fn send_receipt(&self, chat_id: i64, mid: Option<&str>, items: &[ExtractedItem]) {
        let text = match items {
            [single] if single.kind == ItemKind::File => {
                "📁 File received, starting the check...".to_string()
            }
            [single] => format!("🔍 Checking link:\n{}", single.url),
            many => format!(
                "🔍 Found {} items (links/files), starting checks...",
                many.len()
            ),
        };

        // Receipt failures are not fatal; the verdict reply may still go out.
        if let Err(e) = self.replies.send_reply(chat_id, mid, &text).await {
            warn!(chat_id, error = %e, "Failed to send receipt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::bot::types::{MessageBody, Recipient, Sender};
    use crate::error::{ChannelError, QueueError};
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct FakePublisher {
        tasks: Mutex<Vec<CheckTask>>,
    }

    #[async_trait]
    impl TaskPublisher for FakePublisher {
        async fn publish(&self, task: &CheckTask) -> std::result::Result<(), QueueError> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        sent: Mutex<Vec<(i64, Option<String>, String)>>,
    }

    #[async_trait]
    impl ReplySink for FakeSink {
        async fn send_reply(
            &self,
            chat_id: i64,
            reply_to: Option<&str>,
            text: &str,
        ) -> std::result::Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id, reply_to.map(str::to_string), text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<LibSqlBackend>,
        publisher: Arc<FakePublisher>,
        sink: Arc<FakeSink>,
        handler: IngestHandler,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let publisher = Arc::new(FakePublisher::default());
        let sink = Arc::new(FakeSink::default());
        let handler = IngestHandler::new(
            Arc::clone(&store) as Arc<dyn ItemStore>,
            Arc::clone(&publisher) as Arc<dyn TaskPublisher>,
            Arc::clone(&sink) as Arc<dyn ReplySink>,
        );
        Fixture {
            store,
            publisher,
            sink,
            handler,
        }
    }

    fn group_message(text: &str, sender_id: i64) -> Message {
        Message {
            sender: Sender {
                user_id: Some(sender_id),
                first_name: None,
            },
            recipient: Recipient {
                chat_id: Some(500),
                chat_type: Some("chat".to_string()),
                user_id: None,
            },
            body: MessageBody {
                mid: Some("mid.42".to_string()),
                text: Some(text.to_string()),
                attachments: vec![],
            },
            link: None,
        }
    }

    fn dialog_message(text: &str, sender_id: i64) -> Message {
        let mut msg = group_message(text, sender_id);
        msg.recipient.chat_type = Some("dialog".to_string());
        msg.recipient.user_id = Some(sender_id);
        msg
    }

    #[tokio::test]
    async fn plain_text_publishes_nothing() {
        let fx = fixture().await;
        fx.handler
            .handle_message(&group_message("just chatting", 7))
            .await
            .unwrap();
        assert!(fx.publisher.tasks.lock().unwrap().is_empty());
        assert!(fx.sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_command_greets_without_extraction() {
        let fx = fixture().await;
        fx.handler
            .handle_message(&dialog_message("/start", 7))
            .await
            .unwrap();
        let sent = fx.sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("dangerous links"));
        assert!(fx.publisher.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_group_sighting_creates_row_counter_and_task() {
        let fx = fixture().await;
        fx.handler
            .handle_message(&group_message("check this http://evil.example/x", 7))
            .await
            .unwrap();

        let row = fx
            .store
            .find_item("http://evil.example/x")
            .await
            .unwrap()
            .expect("row created");
        assert_eq!(row.kind, ItemKind::Link);
        assert!(row.result.is_none());

        // Counter was written once for the sender.
        assert_eq!(fx.store.record_user_sighting(7, row.url_id).await.unwrap(), 2);

        let tasks = fx.publisher.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "http://evil.example/x");
        assert_eq!(tasks[0].message_id.as_deref(), Some("mid.42"));
        assert_eq!(tasks[0].chat.chat_id, Some(500));

        // Receipt went out, threaded to the original message.
        let sent = fx.sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.as_deref(), Some("mid.42"));
        assert!(sent[0].2.contains("http://evil.example/x"));
    }

    #[tokio::test]
    async fn repeat_sighting_increments_counter_and_requeues() {
        let fx = fixture().await;
        let msg = group_message("again http://evil.example/x", 7);
        fx.handler.handle_message(&msg).await.unwrap();
        fx.handler.handle_message(&msg).await.unwrap();

        let row = fx.store.find_item("http://evil.example/x").await.unwrap().unwrap();
        assert_eq!(fx.store.record_user_sighting(7, row.url_id).await.unwrap(), 3);
        assert_eq!(fx.publisher.tasks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dialogs_never_write_counters() {
        let fx = fixture().await;
        for _ in 0..3 {
            fx.handler
                .handle_message(&dialog_message("http://a.example http://b.example", 7))
                .await
                .unwrap();
        }

        let row = fx.store.find_item("http://a.example").await.unwrap().unwrap();
        // First write for this pair starts at 1: nothing was recorded before.
        assert_eq!(fx.store.record_user_sighting(7, row.url_id).await.unwrap(), 1);
        // Tasks still flow in dialogs.
        assert_eq!(fx.publisher.tasks.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn multi_item_receipt_reports_count() {
        let fx = fixture().await;
        fx.handler
            .handle_message(&group_message("http://a.example and http://b.example", 7))
            .await
            .unwrap();
        let sent = fx.sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.contains("2 items"));
    }
}
