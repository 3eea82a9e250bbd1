// =============================================================================
// publisher.rs — THE REDIS TOWN CRIER
// =============================================================================
//
// This module takes case updates from the crossbeam channel and screams
// them into Redis via pub/sub. The dashboard listens on the other end,
// presumably refreshing a map of Wake County with increasing urgency.
//
// Architecture:
// 1. Consumer loop reads from the lock-free crossbeam channel
// 2. Updates are serialized to JSON (serde does the heavy lifting)
// 3. Updates are published to a Redis pub/sub channel
// 4. Updates are ALSO stored in a Redis sorted set (scored by timestamp)
//    for persistence, because pub/sub is fire-and-forget
// 5. Batch publishing to minimize Redis round trips
//
// The Redis sorted set acts as a durable update log. Even if the dashboard
// is down when a deadline resets, the update will be waiting in Redis when
// it comes back. Like a patient process server.
// =============================================================================

use anyhow::Result;
use crossbeam_channel::Receiver;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::CaseUpdate;

/// The Redis Publisher. Consumes updates from the crossbeam channel and
/// publishes them with the urgency of a bidder who just found out the
/// deadline is tomorrow.
pub struct RedisPublisher {
    config: Arc<Config>,
    receiver: Receiver<CaseUpdate>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<PublisherStats>,
}

/// Publisher statistics for metrics.
pub struct PublisherStats {
    pub updates_published: portable_atomic::AtomicU64,
    pub updates_persisted: portable_atomic::AtomicU64,
    pub publish_errors: portable_atomic::AtomicU64,
    pub batches_sent: portable_atomic::AtomicU64,
}

impl PublisherStats {
    pub fn new() -> Self {
        Self {
            updates_published: portable_atomic::AtomicU64::new(0),
            updates_persisted: portable_atomic::AtomicU64::new(0),
            publish_errors: portable_atomic::AtomicU64::new(0),
            batches_sent: portable_atomic::AtomicU64::new(0),
        }
    }
}

/// A serializable snapshot of publisher stats.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublisherSnapshot {
    pub updates_published: u64,
    pub updates_persisted: u64,
    pub publish_errors: u64,
    pub batches_sent: u64,
}

impl RedisPublisher {
    /// Create a new RedisPublisher.
    ///
    /// # Arguments
    /// * `config` - The global configuration
    /// * `receiver` - The receiving end of the crossbeam channel
    /// * `shutdown` - Watch channel for graceful shutdown signaling
    pub fn new(
        config: Arc<Config>,
        receiver: Receiver<CaseUpdate>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, Arc<PublisherStats>) {
        let stats = Arc::new(PublisherStats::new());
        let stats_clone = Arc::clone(&stats);
        (
            Self {
                config,
                receiver,
                shutdown,
                stats,
            },
            stats_clone,
        )
    }

    /// Run the publisher loop until the shutdown signal arrives.
    ///
    /// The loop:
    /// 1. Drains up to BATCH_SIZE updates from the channel
    /// 2. Publishes them all to Redis pub/sub
    /// 3. Stores them in the sorted set
    /// 4. Sleeps briefly if no updates were available
    /// 5. Repeats until shutdown
    ///
    /// Batch publishing keeps Redis round-trips down: ten updates in one
    /// pipeline beats ten individual PUBLISH commands every time.
    pub async fn run(self) -> Result<()> {
        info!(
            channel = %self.config.redis_channel,
            sorted_set = %self.config.redis_sorted_set,
            "Redis Publisher starting — ready to broadcast courthouse news"
        );

        // Connect to Redis with retry logic
        let client = redis::Client::open(self.config.redis_url.as_str())?;
        let mut con = loop {
            match client.get_multiplexed_async_connection().await {
                Ok(con) => {
                    info!("Redis connection established — the void is listening");
                    break con;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis — retrying in 5 seconds");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    if *self.shutdown.borrow() {
                        info!("Shutdown received during Redis connection retry — exiting");
                        return Ok(());
                    }
                }
            }
        };

        const BATCH_SIZE: usize = 50;
        let mut batch: Vec<CaseUpdate> = Vec::with_capacity(BATCH_SIZE);

        loop {
            // Check for shutdown signal
            if *self.shutdown.borrow() {
                // Drain remaining updates before shutting down
                info!("Shutdown signal received — draining remaining updates");
                while let Ok(update) = self.receiver.try_recv() {
                    batch.push(update);
                }
                if !batch.is_empty() {
                    if let Err(e) = self.publish_batch(&mut con, &batch).await {
                        error!(error = %e, "Failed to publish final batch during shutdown");
                    }
                }
                info!("Redis Publisher shutting down — no more news to cry");
                return Ok(());
            }

            // Drain updates from the channel into a batch
            batch.clear();
            while batch.len() < BATCH_SIZE {
                match self.receiver.try_recv() {
                    Ok(update) => batch.push(update),
                    Err(crossbeam_channel::TryRecvError::Empty) => break,
                    Err(crossbeam_channel::TryRecvError::Disconnected) => {
                        info!("Channel disconnected — publisher shutting down");
                        return Ok(());
                    }
                }
            }

            if batch.is_empty() {
                // No updates to publish. Sleep briefly and check again.
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            // Publish the batch!
            if let Err(e) = self.publish_batch(&mut con, &batch).await {
                error!(
                    error = %e,
                    batch_size = batch.len(),
                    "Failed to publish batch to Redis — updates may be lost!"
                );
                self.stats
                    .publish_errors
                    .fetch_add(batch.len() as u64, portable_atomic::Ordering::Relaxed);
            }
        }
    }

    /// Publish a batch of updates to Redis.
    ///
    /// For each update:
    /// 1. PUBLISH to the pub/sub channel (for real-time consumers)
    /// 2. ZADD to the sorted set (for persistence/catch-up)
    async fn publish_batch(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
        batch: &[CaseUpdate],
    ) -> Result<()> {
        use portable_atomic::Ordering;

        for update in batch {
            let json = serde_json::to_string(update)?;

            // Publish to pub/sub channel for real-time consumers
            let _: () = con
                .publish(&self.config.redis_channel, &json)
                .await
                .map_err(|e| {
                    error!(
                        error = %e,
                        update_id = %update.id,
                        case_number = %update.case_number,
                        "Failed to PUBLISH update"
                    );
                    e
                })?;

            self.stats.updates_published.fetch_add(1, Ordering::Relaxed);

            // Store in sorted set for persistence
            // Score is the Unix timestamp so updates are ordered chronologically
            let score = update.emitted_at.timestamp() as f64;
            let _: () = con
                .zadd(&self.config.redis_sorted_set, &json, score)
                .await
                .map_err(|e| {
                    error!(
                        error = %e,
                        update_id = %update.id,
                        "Failed to ZADD update to sorted set"
                    );
                    e
                })?;

            self.stats.updates_persisted.fetch_add(1, Ordering::Relaxed);

            info!(
                update_id = %update.id,
                case_number = %update.case_number,
                classification = %update.classification,
                "Update published to Redis — the dashboard has been notified"
            );
        }

        self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);

        debug!(
            batch_size = batch.len(),
            total_published = self.stats.updates_published.load(Ordering::Relaxed),
            "Batch published successfully"
        );

        Ok(())
    }

    /// Get a snapshot of publisher statistics.
    pub fn snapshot(stats: &PublisherStats) -> PublisherSnapshot {
        use portable_atomic::Ordering;
        PublisherSnapshot {
            updates_published: stats.updates_published.load(Ordering::Relaxed),
            updates_persisted: stats.updates_persisted.load(Ordering::Relaxed),
            publish_errors: stats.publish_errors.load(Ordering::Relaxed),
            batches_sent: stats.batches_sent.load(Ordering::Relaxed),
        }
    }
}
