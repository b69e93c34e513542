//! Kafka intake loop for security alerts
//!
//! Offsets are acknowledged with `store_offset_from_message` after each alert
//! has been attempted, whether or not it succeeded, and committed by the
//! background auto-commit (plus a final synchronous commit on shutdown).

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::AlertHandler;
use crate::config::KafkaConfig;
use crate::error::Result;

const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 30_000;

pub struct AlertConsumer {
    consumer: StreamConsumer,
    handler: AlertHandler,
    shutdown_rx: watch::Receiver<bool>,
    worker_id: usize,
}

impl AlertConsumer {
    pub fn new(
        config: &KafkaConfig,
        handler: AlertHandler,
        shutdown_rx: watch::Receiver<bool>,
        worker_id: usize,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("client.id", format!("{}-{}", config.group_id, worker_id))
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.commit.interval.ms", "5000")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("partition.assignment.strategy", "roundrobin")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[&config.topic])?;

        info!(
            worker_id,
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Alert consumer initialized"
        );

        Ok(Self {
            consumer,
            handler,
            shutdown_rx,
            worker_id,
        })
    }

    /// Consume until the shutdown signal flips to `true`.
    ///
    /// A message already taken off the stream is processed and acknowledged
    /// before the shutdown signal is looked at again.
    pub async fn run(&mut self) -> Result<()> {
        info!(worker_id = self.worker_id, "Starting alert consumer loop");

        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!(worker_id = self.worker_id, "Shutdown signal received, stopping consumer");
                        break;
                    }
                }

                message = self.consumer.recv() => {
                    match message {
                        Ok(msg) => {
                            backoff_ms = INITIAL_BACKOFF_MS;
                            self.process_message(&msg).await;
                        }
                        Err(e) => {
                            error!(worker_id = self.worker_id, error = %e, "Kafka consumer error");
                            let delay = Duration::from_millis(backoff_ms);
                            if wait_or_shutdown(&mut self.shutdown_rx, delay).await {
                                info!(
                                    worker_id = self.worker_id,
                                    "Shutdown signal received during back-off"
                                );
                                break;
                            }
                            backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                        }
                    }
                }
            }
        }

        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => debug!(worker_id = self.worker_id, "Final offset commit completed"),
            Err(e) => debug!(worker_id = self.worker_id, error = %e, "Final offset commit skipped"),
        }

        info!(worker_id = self.worker_id, "Alert consumer stopped");
        Ok(())
    }

    async fn process_message(&self, msg: &BorrowedMessage<'_>) {
        let outcome = self.handler.handle_payload(msg.payload()).await;

        debug!(
            worker_id = self.worker_id,
            partition = msg.partition(),
            offset = msg.offset(),
            outcome = outcome.label(),
            "Alert message handled"
        );

        // Acknowledge regardless of outcome: "attempted", not "succeeded".
        if let Err(e) = self.consumer.store_offset_from_message(msg) {
            warn!(
                worker_id = self.worker_id,
                partition = msg.partition(),
                offset = msg.offset(),
                error = %e,
                "Failed to store Kafka offset"
            );
        }
    }
}

/// Sleep for `delay` unless shutdown is signalled first. Returns `true` on shutdown.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return true;
                }
            }
        }
    }
}
