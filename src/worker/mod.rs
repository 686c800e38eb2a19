//! Worker Pool — consumes check tasks and resolves verdicts.

pub mod processor;

use std::sync::Arc;

use futures::FutureExt;

use crate::error::Result;
use crate::queue::TaskQueue;

pub use processor::ProcessorDeps;

/// Run the consumer loop with at most `prefetch` tasks in flight. Returns
/// only when the queue connection is lost.
pub async fn run(queue: Arc<TaskQueue>, deps: ProcessorDeps, prefetch: u16) -> Result<()> {
    let deps = Arc::new(deps);
    queue
        .consume(prefetch, move |payload| {
            let deps = Arc::clone(&deps);
            async move { processor::process_payload(&deps, &payload).await }.boxed()
        })
        .await?;
    Ok(())
}
