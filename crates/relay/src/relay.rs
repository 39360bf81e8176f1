//! The periodic claim-publish-mark worker.

use std::time::Duration;

use stock_store::StockStore;
use tokio::sync::watch;

use crate::error::Result;
use crate::publisher::EventPublisher;

/// Relay tuning, read from the environment with defaults.
///
/// - `OUTBOX_POLL_INTERVAL_MS`: delay between cycles (default: `1000`)
/// - `OUTBOX_BATCH_SIZE`: max rows claimed per cycle (default: `100`)
/// - `OUTBOX_PUBLISH_TIMEOUT_MS`: per-event publish bound (default: `5000`)
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub publish_timeout: Duration,
}

impl RelayConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_ms("OUTBOX_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            publish_timeout: env_ms("OUTBOX_PUBLISH_TIMEOUT_MS")
                .unwrap_or(defaults.publish_timeout),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            publish_timeout: Duration::from_millis(5000),
        }
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

/// Publishes pending outbox rows and marks them sent.
///
/// Delivery is at-least-once: publish acknowledgment and the sent-mark are
/// separate writes, so a crash between them republishes the event on the
/// next cycle. Consumers must tolerate duplicates.
///
/// Exactly one relay instance may run against a store. The pending/sent
/// status model carries no claim token, so two instances would
/// double-publish the same batch.
pub struct OutboxRelay<S, P>
where
    S: StockStore,
    P: EventPublisher,
{
    store: S,
    publisher: P,
    config: RelayConfig,
}

impl<S, P> OutboxRelay<S, P>
where
    S: StockStore,
    P: EventPublisher,
{
    /// Creates a new relay.
    pub fn new(store: S, publisher: P, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Runs the relay until the shutdown signal flips to `true` (or its
    /// sender is dropped).
    ///
    /// Cycles never overlap: a cycle runs to completion, including its
    /// publish waits, before the next delay starts.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox relay started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(0) => {}
                Ok(sent) => tracing::info!(sent, "published outbox events"),
                Err(err) => tracing::error!(%err, "outbox relay cycle failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("outbox relay stopped");
    }

    /// One claim-publish-mark cycle.
    ///
    /// Returns how many events were marked sent. Events whose publish
    /// fails or times out stay pending and are retried next cycle.
    pub async fn run_once(&self) -> Result<usize> {
        let batch = self.store.claim_pending(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }

        tracing::debug!(pending = batch.len(), "publishing pending outbox events");

        let mut sent = Vec::with_capacity(batch.len());
        for event in &batch {
            let value = serde_json::to_string(&event.to_envelope())?;
            let publish = self
                .publisher
                .publish(&event.aggregate_type, &event.aggregate_id, &value);

            match tokio::time::timeout(self.config.publish_timeout, publish).await {
                Ok(Ok(())) => {
                    metrics::counter!("outbox_events_published_total").increment(1);
                    sent.push(event.event_id);
                }
                Ok(Err(err)) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::error!(
                        event_id = %event.event_id,
                        %err,
                        "failed to publish outbox event; left pending"
                    );
                }
                Err(_) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::error!(
                        event_id = %event.event_id,
                        timeout_ms = self.config.publish_timeout.as_millis() as u64,
                        "publish timed out; event left pending"
                    );
                }
            }
        }

        if !sent.is_empty() {
            self.store.mark_sent(&sent).await?;
        }

        Ok(sent.len())
    }
}
