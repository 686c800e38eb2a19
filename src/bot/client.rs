//! Max Bot API client — long-polls `GET /updates` and sends messages back.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::warn;

use crate::bot::types::{ChatMember, Update};
use crate::bot::{FileFetcher, MemberDirectory, ReplySink};
use crate::config::BotConfig;
use crate::error::ChannelError;

/// Long-poll timeout passed to the platform, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    updates: Vec<serde_json::Value>,
    #[serde(default)]
    marker: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<ChatMember>,
}

pub struct MaxClient {
    api_url: String,
    token: secrecy::SecretString,
    client: reqwest::Client,
}

impl MaxClient {
    pub fn new(config: BotConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    fn token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Fetch the next batch of updates, resuming from `marker`.
    ///
    /// Each update is decoded individually so one malformed entry does not
    /// drop the whole batch; unrecognized update types decode to
    /// [`Update::Unknown`] and are skipped by the caller.
    pub async fn poll_updates(
        &self,
        marker: Option<i64>,
    ) -> Result<(Vec<Update>, Option<i64>), ChannelError> {
        let mut req = self
            .client
            .get(self.endpoint("updates"))
            .query(&[("access_token", self.token())])
            .query(&[("timeout", POLL_TIMEOUT_SECS)]);
        if let Some(marker) = marker {
            req = req.query(&[("marker", marker)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ChannelError::PollFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ChannelError::PollFailed(format!(
                "status {}",
                resp.status()
            )));
        }

        let body: UpdatesResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::PollFailed(format!("unparsable body: {e}")))?;

        let mut updates = Vec::with_capacity(body.updates.len());
        for raw in body.updates {
            match serde_json::from_value::<Update>(raw) {
                Ok(update) => updates.push(update),
                Err(e) => warn!(error = %e, "Skipping malformed update"),
            }
        }

        Ok((updates, body.marker))
    }

    async fn send_message(
        &self,
        chat_id: i64,
        reply_to: Option<&str>,
        text: &str,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "text": text });
        if let Some(mid) = reply_to {
            body["link"] = serde_json::json!({ "type": "reply", "mid": mid });
        }

        let resp = self
            .client
            .post(self.endpoint("messages"))
            .query(&[("access_token", self.token())])
            .query(&[("chat_id", chat_id)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                chat_id,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                chat_id,
                reason: format!("status {status}: {detail}"),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ReplySink for MaxClient {
    async fn send_reply(
        &self,
        chat_id: i64,
        reply_to: Option<&str>,
        text: &str,
    ) -> Result<(), ChannelError> {
        self.send_message(chat_id, reply_to, text).await
    }
}

#[async_trait]
impl MemberDirectory for MaxClient {
    async fn chat_members(&self, chat_id: i64) -> Result<Vec<ChatMember>, ChannelError> {
        let resp = self
            .client
            .get(self.endpoint(&format!("chats/{chat_id}/members")))
            .query(&[("access_token", self.token())])
            .send()
            .await
            .map_err(|e| ChannelError::MembersFailed {
                chat_id,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::MembersFailed {
                chat_id,
                reason: format!("status {}", resp.status()),
            });
        }

        let body: MembersResponse = resp.json().await.map_err(|e| ChannelError::MembersFailed {
            chat_id,
            reason: format!("unparsable body: {e}"),
        })?;

        Ok(body.members)
    }
}

#[async_trait]
impl FileFetcher for MaxClient {
    async fn fetch_file(&self, token: &str) -> Result<Vec<u8>, ChannelError> {
        let resp = self
            .client
            .get(self.endpoint("download"))
            .query(&[("access_token", self.token()), ("token", token)])
            .send()
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                token: token.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(ChannelError::DownloadFailed {
                token: token.to_string(),
                reason: format!("status {}", resp.status()),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| ChannelError::DownloadFailed {
            token: token.to_string(),
            reason: e.to_string(),
        })?;

        Ok(bytes.to_vec())
    }
}
