//! Task Queue — durable, at-least-once dispatch over AMQP.
//!
//! One durable queue carries one JSON task per message. Publishes are
//! persistent so tasks survive a broker or consumer restart; a successful
//! handler acks, a failed handler rejects **without requeue** (the task is
//! dropped, not retried — a poison task cannot loop forever, at the cost of
//! losing tasks on transient failures).

pub mod task;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::BoxFuture;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
pub use task::{CheckTask, TaskChat};

/// Fixed backoff between broker connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// AMQP delivery mode 2: the broker persists the message to disk.
const PERSISTENT: u8 = 2;

/// Publish side of the queue, kept behind a trait so ingestion can be tested
/// without a broker.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    async fn publish(&self, task: &CheckTask) -> Result<(), QueueError>;
}

pub struct TaskQueue {
    channel: Channel,
    queue_name: String,
}

impl TaskQueue {
    /// Connect to the broker and declare the durable task queue, retrying
    /// with a fixed backoff until the broker is reachable.
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let conn = loop {
            match Connection::connect(&config.amqp_url, ConnectionProperties::default()).await {
                Ok(conn) => break conn,
                Err(e) => {
                    warn!(error = %e, "Broker not ready, retrying");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        };
        info!("Connected to broker");

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to open channel: {e}")))?;

        channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Declare(e.to_string()))?;

        Ok(Self {
            channel,
            queue_name: config.queue_name.clone(),
        })
    }

    /// Consume raw payloads with at most `prefetch` tasks in flight.
    ///
    /// `Ok` from the handler acks the message; `Err` rejects it without
    /// requeue. Runs until the consumer stream ends (broker connection lost).
    pub async fn consume<H>(&self, prefetch: u16, handler: H) -> Result<(), QueueError>
    where
        H: Fn(Vec<u8>) -> BoxFuture<'static, crate::error::Result<()>> + Send + Sync + 'static,
    {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Consume(format!("basic_qos failed: {e}")))?;

        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "linkguard-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Consume(e.to_string()))?;

        info!(queue = %self.queue_name, prefetch, "Waiting for tasks");

        let handler = Arc::new(handler);
        let limit = Arc::new(Semaphore::new(prefetch.max(1) as usize));

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "Consumer delivery error");
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                break;
            };
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                let _in_flight = permit;
                let payload = delivery.data.clone();

                match handler(payload).await {
                    Ok(()) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            warn!(error = %e, "Failed to ack task");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Task failed; rejecting without requeue");
                        let nack = BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        };
                        if let Err(e) = delivery.nack(nack).await {
                            warn!(error = %e, "Failed to nack task");
                        }
                    }
                }
            });
        }

        Err(QueueError::Consume("consumer stream ended".to_string()))
    }
}

#[async_trait]
impl TaskPublisher for TaskQueue {
    /// Publish one task as a persistent JSON message.
    async fn publish(&self, task: &CheckTask) -> Result<(), QueueError> {
        let payload =
            serde_json::to_vec(task).map_err(|e| QueueError::Payload(e.to_string()))?;

        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;

        debug!(url = %task.url, "Task queued");
        Ok(())
    }
}
