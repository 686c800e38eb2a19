//! Per-task verdict resolution.
//!
//! State machine per task: received → verdict-resolved → replied →
//! acknowledged, or received → failed → rejected. A malformed payload is
//! acknowledged immediately — it cannot become valid by retrying.
//!
//! Steps 2–4 (ensure row, cache check, scan) run without a per-url lock: two
//! workers racing on a never-before-seen url may both scan it. The scan is
//! idempotent and the cached verdict converges either way; the cost is one
//! duplicated external call, not a correctness violation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bot::{FileFetcher, ReplySink};
use crate::error::Result;
use crate::extract::ItemKind;
use crate::queue::CheckTask;
use crate::scanner::{ScanResult, Scanner, Verdict};
use crate::store::ItemStore;

/// Shared dependencies for task processing.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub store: Arc<dyn ItemStore>,
    pub scanner: Arc<dyn Scanner>,
    pub replies: Arc<dyn ReplySink>,
    pub files: Arc<dyn FileFetcher>,
}

/// Handle one raw queue payload. `Ok` means the message should be acked
/// (including the malformed case); `Err` means reject without requeue.
pub async fn process_payload(deps: &ProcessorDeps, payload: &[u8]) -> Result<()> {
    let task: CheckTask = match serde_json::from_slice(payload) {
        Ok(task) => task,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable task payload");
            return Ok(());
        }
    };

    if let Err(reason) = task.validate() {
        warn!(url = %task.url, reason, "Skipping malformed task");
        return Ok(());
    }

    process_task(deps, &task).await
}

async fn process_task(deps: &ProcessorDeps, task: &CheckTask) -> Result<()> {
    let item = deps.store.ensure_item(&task.url, task.kind).await?;

    let verdict = match item.result {
        Some(verdict) => {
            // Cache hit: repeated shares of the same url never re-check.
            debug!(url = %task.url, verdict = %verdict, "Verdict served from cache");
            verdict
        }
        None => {
            let result = resolve_verdict(deps, task).await;
            deps.store.save_verdict(item.url_id, result.verdict).await?;
            info!(url = %task.url, verdict = %result.verdict, zone = %result.zone, "Verdict saved");
            result.verdict
        }
    };

    let text = reply_text(task, verdict);
    // `validate` guarantees chat_id; still avoid panicking on the wire type.
    let chat_id = task.chat.chat_id.unwrap_or_default();

    // Reply failures are logged, not fatal: the verdict is already cached and
    // redelivering the task would not help.
    if let Err(e) = deps
        .replies
        .send_reply(chat_id, task.message_id.as_deref(), &text)
        .await
    {
        warn!(chat_id, error = %e, "Failed to deliver verdict reply");
    }

    info!(url = %task.url, "Task processed");
    Ok(())
}

/// Invoke the external check appropriate for the task's kind. Never fails:
/// unretrievable file bytes degrade to an unknown verdict like any other
/// external-service failure.
async fn resolve_verdict(deps: &ProcessorDeps, task: &CheckTask) -> ScanResult {
    match task.kind {
        ItemKind::Link => deps.scanner.check_link(&task.url).await,
        ItemKind::File => {
            let token = task.file_token.as_deref().unwrap_or_default();
            let bytes = match deps.files.fetch_file(token).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(url = %task.url, error = %e, "File download failed");
                    return ScanResult::unknown();
                }
            };
            let filename = task
                .file_id
                .map(|id| format!("file-{id}"))
                .unwrap_or_else(|| "file".to_string());
            deps.scanner.check_file(&bytes, &filename).await
        }
    }
}

fn reply_text(task: &CheckTask, verdict: Verdict) -> String {
    match task.kind {
        ItemKind::File => format!("File checked.\nStatus: {verdict}"),
        ItemKind::Link => format!("Link checked: {}\nStatus: {verdict}", task.url),
    }
}
