//! Membership events — roster scans when the bot joins a group, danger
//! notices when a user does.
//!
//! The platform may deliver the same membership callback more than once
//! within a few seconds; the dedup guard collapses those before any store
//! or platform work happens.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bot::types::ChatMember;
use crate::bot::{MemberDirectory, ReplySink};
use crate::danger::DangerAggregator;
use crate::dedup::DedupGuard;
use crate::error::Result;

pub struct MembershipHandler {
    danger: DangerAggregator,
    dedup: DedupGuard,
    members: Arc<dyn MemberDirectory>,
    replies: Arc<dyn ReplySink>,
}

impl MembershipHandler {
    pub fn new(
        danger: DangerAggregator,
        dedup: DedupGuard,
        members: Arc<dyn MemberDirectory>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            danger,
            dedup,
            members,
            replies,
        }
    }

    /// The bot was added to a group: greet and post a danger roster for the
    /// current member list.
    pub async fn on_bot_added(&self, chat_id: i64) -> Result<()> {
        if !self.dedup.should_process(&DedupGuard::chat_key(chat_id)) {
            debug!(chat_id, "Duplicate bot_added event suppressed");
            return Ok(());
        }
        info!(chat_id, "Added to chat; running member scan");

        let members = match self.members.chat_members(chat_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(chat_id, error = %e, "Member listing failed; skipping roster");
                return Ok(());
            }
        };

        let roster = self.danger.group_roster(&members).await?;
        let text = format!(
            "Hi! I will check links and files shared in this chat.\n\n{roster}"
        );
        self.replies.send_reply(chat_id, None, &text).await?;
        Ok(())
    }

    /// A user joined a chat: post a notice if they have a dangerous history.
    pub async fn on_user_added(&self, chat_id: i64, member: &ChatMember) -> Result<()> {
        if member.is_bot {
            return Ok(());
        }
        let key = DedupGuard::member_key(chat_id, member.user_id);
        if !self.dedup.should_process(&key) {
            debug!(chat_id, user_id = member.user_id, "Duplicate user_added event suppressed");
            return Ok(());
        }

        if let Some(notice) = self.danger.join_notice(member).await? {
            self.replies.send_reply(chat_id, None, &notice).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::ChannelError;
    use crate::extract::ItemKind;
    use crate::scanner::Verdict;
    use crate::store::{ItemStore, LibSqlBackend};

    #[derive(Default)]
    struct FakeSink {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl ReplySink for FakeSink {
        async fn send_reply(
            &self,
            chat_id: i64,
            _reply_to: Option<&str>,
            text: &str,
        ) -> std::result::Result<(), ChannelError> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct FakeDirectory {
        members: Vec<ChatMember>,
        fail: bool,
    }

    #[async_trait]
    impl MemberDirectory for FakeDirectory {
        async fn chat_members(
            &self,
            chat_id: i64,
        ) -> std::result::Result<Vec<ChatMember>, ChannelError> {
            if self.fail {
                return Err(ChannelError::MembersFailed {
                    chat_id,
                    reason: "boom".to_string(),
                });
            }
            Ok(self.members.clone())
        }
    }

    fn member(user_id: i64, name: &str) -> ChatMember {
        ChatMember {
            user_id,
            first_name: Some(name.to_string()),
            name: None,
            is_bot: false,
        }
    }

    async fn store_with_dangerous_user(user_id: i64, times: u32) -> Arc<dyn ItemStore> {
        let store = LibSqlBackend::new_memory().await.unwrap();
        let bad = store.ensure_item("http://evil.example", ItemKind::Link).await.unwrap();
        store.save_verdict(bad.url_id, Verdict::Malicious).await.unwrap();
        for _ in 0..times {
            store.record_user_sighting(user_id, bad.url_id).await.unwrap();
        }
        Arc::new(store)
    }

    fn handler(
        store: Arc<dyn ItemStore>,
        members: Vec<ChatMember>,
        fail_members: bool,
    ) -> (MembershipHandler, Arc<FakeSink>) {
        let sink = Arc::new(FakeSink::default());
        let handler = MembershipHandler::new(
            DangerAggregator::new(store),
            DedupGuard::new(Duration::from_secs(10)),
            Arc::new(FakeDirectory {
                members,
                fail: fail_members,
            }),
            Arc::clone(&sink) as Arc<dyn ReplySink>,
        );
        (handler, sink)
    }

    #[tokio::test]
    async fn bot_added_posts_roster() {
        let store = store_with_dangerous_user(1, 7).await;
        let (h, sink) = handler(store, vec![member(1, "Alice"), member(2, "Bob")], false);

        h.on_bot_added(99).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 99);
        assert!(sent[0].1.contains("Alice — dangerous (score 7)"));
        assert!(!sent[0].1.contains("Bob —"));
    }

    #[tokio::test]
    async fn duplicate_bot_added_is_suppressed() {
        let store = store_with_dangerous_user(1, 1).await;
        let (h, sink) = handler(store, vec![member(1, "Alice")], false);

        h.on_bot_added(99).await.unwrap();
        h.on_bot_added(99).await.unwrap();

        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn member_listing_failure_is_not_fatal() {
        let store = store_with_dangerous_user(1, 1).await;
        let (h, sink) = handler(store, vec![], true);

        h.on_bot_added(99).await.unwrap();
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clean_joiner_gets_no_notice() {
        let store = store_with_dangerous_user(1, 3).await;
        let (h, sink) = handler(store, vec![], false);

        h.on_user_added(99, &member(2, "Bob")).await.unwrap();
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dangerous_joiner_gets_a_notice_once() {
        let store = store_with_dangerous_user(1, 6).await;
        let (h, sink) = handler(store, vec![], false);

        h.on_user_added(99, &member(1, "Alice")).await.unwrap();
        h.on_user_added(99, &member(1, "Alice")).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Alice"));
        assert!(sent[0].1.contains("dangerous"));
    }

    #[tokio::test]
    async fn joining_bots_are_ignored() {
        let store = store_with_dangerous_user(1, 6).await;
        let (h, sink) = handler(store, vec![], false);

        let bot = ChatMember {
            user_id: 1,
            first_name: Some("Botty".to_string()),
            name: None,
            is_bot: true,
        };
        h.on_user_added(99, &bot).await.unwrap();
        assert!(sink.sent.lock().unwrap().is_empty());
    }
}
