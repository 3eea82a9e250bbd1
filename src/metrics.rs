// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - Because if you can't measure it, it didn't happen
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for everything. Lock-free because we're THAT paranoid
// about contention. Exposes a tiny HTTP server so the dashboard can check
// engine health without asking anyone's permission.
//
// This is massive overkill for a metrics system. We have:
// - Atomic counters (no locks, no mutexes, PURE ATOMICS)
// - Per-classification breakdowns
// - Per-healer-tier breakdowns
// - A full HTTP server just for metrics
// - JSON serialization of every metric

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info};
use serde::Serialize;

use crate::models::Classification;

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub cases_processed: u64,
    pub classified_unclassified: u64,
    pub classified_upcoming: u64,
    pub classified_upset_bid: u64,
    pub classified_closed_sold: u64,
    pub classified_closed_dismissed: u64,
    pub classified_blocked: u64,
    pub extraction_hits: u64,
    pub extraction_gaps: u64,
    pub bids_applied: u64,
    pub bids_rejected: u64,
    pub misfilings_flagged: u64,
    pub heals_tier1: u64,
    pub heals_tier2: u64,
    pub heals_tier3: u64,
    pub heals_unresolved: u64,
    pub store_conflicts: u64,
    pub collaborator_errors: u64,
    pub updates_published: u64,
    pub uptime_seconds: u64,
    pub cases_per_minute: f64,
    pub status: String,
}

/// Thread-safe atomic metrics collector
/// Every counter is atomic because mutexes are for the weak
pub struct MetricsCollector {
    cases_processed: AtomicU64,
    classified_unclassified: AtomicU64,
    classified_upcoming: AtomicU64,
    classified_upset_bid: AtomicU64,
    classified_closed_sold: AtomicU64,
    classified_closed_dismissed: AtomicU64,
    classified_blocked: AtomicU64,
    extraction_hits: AtomicU64,
    extraction_gaps: AtomicU64,
    bids_applied: AtomicU64,
    bids_rejected: AtomicU64,
    misfilings_flagged: AtomicU64,
    heals_tier1: AtomicU64,
    heals_tier2: AtomicU64,
    heals_tier3: AtomicU64,
    heals_unresolved: AtomicU64,
    store_conflicts: AtomicU64,
    collaborator_errors: AtomicU64,
    updates_published: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            cases_processed: AtomicU64::new(0),
            classified_unclassified: AtomicU64::new(0),
            classified_upcoming: AtomicU64::new(0),
            classified_upset_bid: AtomicU64::new(0),
            classified_closed_sold: AtomicU64::new(0),
            classified_closed_dismissed: AtomicU64::new(0),
            classified_blocked: AtomicU64::new(0),
            extraction_hits: AtomicU64::new(0),
            extraction_gaps: AtomicU64::new(0),
            bids_applied: AtomicU64::new(0),
            bids_rejected: AtomicU64::new(0),
            misfilings_flagged: AtomicU64::new(0),
            heals_tier1: AtomicU64::new(0),
            heals_tier2: AtomicU64::new(0),
            heals_tier3: AtomicU64::new(0),
            heals_unresolved: AtomicU64::new(0),
            store_conflicts: AtomicU64::new(0),
            collaborator_errors: AtomicU64::new(0),
            updates_published: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_processed(&self) {
        self.cases_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_classification(&self, classification: Classification) {
        let counter = match classification {
            Classification::Unclassified => &self.classified_unclassified,
            Classification::Upcoming => &self.classified_upcoming,
            Classification::UpsetBid => &self.classified_upset_bid,
            Classification::ClosedSold => &self.classified_closed_sold,
            Classification::ClosedDismissed => &self.classified_closed_dismissed,
            Classification::Blocked => &self.classified_blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_extraction_hit(&self) {
        self.extraction_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_extraction_gap(&self) {
        self.extraction_gaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bid_applied(&self) {
        self.bids_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bid_rejected(&self) {
        self.bids_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_misfiling(&self) {
        self.misfilings_flagged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_heal(&self, tier: u8) {
        let counter = match tier {
            1 => &self.heals_tier1,
            2 => &self.heals_tier2,
            _ => &self.heals_tier3,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_heal_unresolved(&self) {
        self.heals_unresolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_conflict(&self) {
        self.store_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_collaborator_error(&self) {
        self.collaborator_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_published(&self) {
        self.updates_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let processed = self.cases_processed.load(Ordering::Relaxed);
        let cases_per_minute = if uptime > 0 {
            (processed as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            cases_processed: processed,
            classified_unclassified: self.classified_unclassified.load(Ordering::Relaxed),
            classified_upcoming: self.classified_upcoming.load(Ordering::Relaxed),
            classified_upset_bid: self.classified_upset_bid.load(Ordering::Relaxed),
            classified_closed_sold: self.classified_closed_sold.load(Ordering::Relaxed),
            classified_closed_dismissed: self.classified_closed_dismissed.load(Ordering::Relaxed),
            classified_blocked: self.classified_blocked.load(Ordering::Relaxed),
            extraction_hits: self.extraction_hits.load(Ordering::Relaxed),
            extraction_gaps: self.extraction_gaps.load(Ordering::Relaxed),
            bids_applied: self.bids_applied.load(Ordering::Relaxed),
            bids_rejected: self.bids_rejected.load(Ordering::Relaxed),
            misfilings_flagged: self.misfilings_flagged.load(Ordering::Relaxed),
            heals_tier1: self.heals_tier1.load(Ordering::Relaxed),
            heals_tier2: self.heals_tier2.load(Ordering::Relaxed),
            heals_tier3: self.heals_tier3.load(Ordering::Relaxed),
            heals_unresolved: self.heals_unresolved.load(Ordering::Relaxed),
            store_conflicts: self.store_conflicts.load(Ordering::Relaxed),
            collaborator_errors: self.collaborator_errors.load(Ordering::Relaxed),
            updates_published: self.updates_published.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            cases_per_minute,
            status: "operational".to_string(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a tiny HTTP server that serves metrics as JSON.
/// This is the Rust equivalent of mounting a turret on a skateboard.
pub async fn run_metrics_server(
    metrics: Arc<MetricsCollector>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    info!("📊 Metrics server listening on http://{}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let snapshot = metrics.snapshot();
                        let json = serde_json::to_string_pretty(&snapshot)
                            .unwrap_or_else(|_| "{}".to_string());

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
                            json.len(),
                            json,
                        );

                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Metrics server: shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_counters() {
        let metrics = MetricsCollector::new();
        metrics.increment_classification(Classification::UpsetBid);
        metrics.increment_classification(Classification::UpsetBid);
        metrics.increment_classification(Classification::Blocked);
        let snap = metrics.snapshot();
        assert_eq!(snap.classified_upset_bid, 2);
        assert_eq!(snap.classified_blocked, 1);
        assert_eq!(snap.classified_upcoming, 0);
    }

    #[test]
    fn test_heal_tier_counters() {
        let metrics = MetricsCollector::new();
        metrics.increment_heal(1);
        metrics.increment_heal(2);
        metrics.increment_heal(3);
        metrics.increment_heal(3);
        let snap = metrics.snapshot();
        assert_eq!(snap.heals_tier1, 1);
        assert_eq!(snap.heals_tier2, 1);
        assert_eq!(snap.heals_tier3, 2);
    }
}
