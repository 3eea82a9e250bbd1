// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every system needs configuration, but not every system needs THIS MUCH
// configuration. We have knobs for knobs. Dials for dials. Thresholds for
// thresholds that control other thresholds.
//
// All values can be overridden via environment variables prefixed with
// UPSET_ENGINE_, because hardcoding configuration is how you end up on the
// front page of Hacker News for the wrong reasons.
//
// Default values have been carefully chosen through a rigorous process of
// "that seems about right" and "the county portal will probably rate-limit
// us if we go faster than this."
// =============================================================================

use chrono::NaiveDate;
use std::env;
use std::time::Duration;

/// The Grand Configuration Struct. Every tunable parameter in the entire
/// engine lives here. Think of it as the cockpit of a fighter jet, except
/// instead of controlling weapons systems, you're controlling how
/// aggressively we recompute statutory deadlines for rural courthouses.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // REDIS CONFIGURATION
    // =========================================================================

    /// Redis connection URL. This is where we scream case updates into
    /// the void. The dashboard listens on the other end.
    /// Default: redis://127.0.0.1:6379
    pub redis_url: String,

    /// The Redis channel we publish case updates to.
    pub redis_channel: String,

    /// The Redis sorted set where updates persist with timestamps.
    /// Because pub/sub is fire-and-forget, and we don't want to forget.
    pub redis_sorted_set: String,

    // =========================================================================
    // COLLABORATOR ENDPOINTS
    // The sidecars that do the actual dirty work.
    // =========================================================================

    /// The scraper sidecar's base URL. It owns the browser, the CAPTCHA
    /// solver, and the VPN tunnel. We just ask it nicely.
    pub scraper_base_url: String,

    /// The OCR sidecar's base URL.
    pub ocr_base_url: String,

    /// The persistence service's base URL.
    pub store_base_url: String,

    // =========================================================================
    // BATCH PIPELINE
    // =========================================================================

    /// How often the classification pass sweeps all active cases.
    /// Default: 3600 seconds. The courthouse updates once a day; we check
    /// hourly because patience is a virtue we monitor, not practice.
    pub pipeline_interval: Duration,

    /// Maximum concurrently processed cases. Classification is CPU-cheap,
    /// but the store and sidecars have rate limits and feelings.
    pub concurrency_limit: usize,

    /// Attempts at the versioned upsert before giving the case up to the
    /// next pass. Conflicts mean another run is ALSO improving the row,
    /// so losing is not a tragedy.
    pub upsert_retry_limit: u32,

    // =========================================================================
    // HEALER
    // =========================================================================

    /// How often the self-diagnosis pass runs. Default: 21600 (6 hours).
    pub healer_interval: Duration,

    /// Max heal attempts per case before we stop escalating and leave the
    /// flag up for a human. Futility, bounded.
    pub healer_max_attempts: u32,

    /// Base of the exponential backoff between heal attempts on the same
    /// case. Attempt n waits base * 2^n.
    pub healer_backoff_base: Duration,

    /// How long to wait on a collaborator (re-OCR, re-scrape) before
    /// calling the field "still missing" and moving on.
    pub collaborator_timeout: Duration,

    // =========================================================================
    // COLLABORATOR RETRY / CIRCUIT BREAKER PARAMETERS
    // Because county infrastructure goes down more often than you'd think.
    // =========================================================================

    /// Retry attempts per collaborator request.
    pub collaborator_max_attempts: u32,

    /// Base backoff between collaborator retries.
    pub collaborator_backoff_base: Duration,

    /// Number of consecutive failures before a circuit breaker trips.
    /// Default: 5, because everyone deserves five chances.
    pub circuit_breaker_failure_threshold: u32,

    /// How long a breaker stays open before allowing a test request.
    /// Default: 60 seconds. Long enough for the VPN to catch its breath.
    pub circuit_breaker_reset_timeout: Duration,

    /// Successes in half-open state before the circuit closes again.
    /// Default: 2, because fool me once, shame on you...
    pub circuit_breaker_success_threshold: u32,

    // =========================================================================
    // INGEST DEDUP (BLOOM FILTER) PARAMETERS
    // For when "probably not a duplicate" is good enough for government work.
    // =========================================================================

    /// Expected items in the bloom filter before rotation.
    pub bloom_expected_items: u64,

    /// Target false positive rate. 0.01 = 1% of new docket entries take
    /// the slow path through the LRU. Nobody notices.
    pub bloom_false_positive_rate: f64,

    /// How often to rotate the bloom filter. Default: 86400 (daily),
    /// matching the scraper's natural rhythm.
    pub bloom_rotation_interval: Duration,

    /// Maximum number of items in the LRU cache backup.
    pub lru_cache_size: usize,

    // =========================================================================
    // CLASSIFIER / CALENDAR
    // =========================================================================

    /// Extra confirmation-event labels beyond the built-in vocabulary,
    /// comma-separated in the env var. Clerks are creative; enums are not.
    pub extra_confirmation_labels: Vec<String>,

    /// Ad-hoc court closure dates (YYYY-MM-DD, comma-separated): ice
    /// storms, hurricanes, the courthouse HVAC incident of '22.
    pub extra_court_closures: Vec<NaiveDate>,

    // =========================================================================
    // METRICS SERVER
    // =========================================================================

    /// Port for the metrics HTTP server.
    /// Default: 9090, because Prometheus conventions are conventions.
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    /// "Sensible" here meaning "will work out of the box without any env
    /// vars but will also respect your wishes if you set them."
    pub fn from_env() -> Self {
        // Try to load .env if it exists. Fail silently if it doesn't,
        // because not everyone has their life together enough to create
        // a .env file.
        let _ = dotenvy::dotenv();

        Config {
            // Redis
            redis_url: env_or_default("UPSET_ENGINE_REDIS_URL", "redis://127.0.0.1:6379"),
            redis_channel: env_or_default("UPSET_ENGINE_REDIS_CHANNEL", "foreclosure:updates"),
            redis_sorted_set: env_or_default(
                "UPSET_ENGINE_REDIS_SORTED_SET",
                "foreclosure:updates:history",
            ),

            // Collaborators
            scraper_base_url: env_or_default(
                "UPSET_ENGINE_SCRAPER_URL",
                "http://127.0.0.1:8701",
            ),
            ocr_base_url: env_or_default("UPSET_ENGINE_OCR_URL", "http://127.0.0.1:8702"),
            store_base_url: env_or_default("UPSET_ENGINE_STORE_URL", "http://127.0.0.1:8703"),

            // Pipeline
            pipeline_interval: secs("UPSET_ENGINE_PIPELINE_INTERVAL_SECS", 3600),
            concurrency_limit: env_or_default("UPSET_ENGINE_CONCURRENCY", "8")
                .parse()
                .unwrap_or(8),
            upsert_retry_limit: env_or_default("UPSET_ENGINE_UPSERT_RETRIES", "3")
                .parse()
                .unwrap_or(3),

            // Healer
            healer_interval: secs("UPSET_ENGINE_HEALER_INTERVAL_SECS", 21_600),
            healer_max_attempts: env_or_default("UPSET_ENGINE_HEALER_MAX_ATTEMPTS", "5")
                .parse()
                .unwrap_or(5),
            healer_backoff_base: secs("UPSET_ENGINE_HEALER_BACKOFF_SECS", 3600),
            collaborator_timeout: secs("UPSET_ENGINE_COLLABORATOR_TIMEOUT_SECS", 120),

            // Collaborator retry / circuit breaker
            collaborator_max_attempts: env_or_default("UPSET_ENGINE_COLLAB_ATTEMPTS", "3")
                .parse()
                .unwrap_or(3),
            collaborator_backoff_base: secs("UPSET_ENGINE_COLLAB_BACKOFF_SECS", 2),
            circuit_breaker_failure_threshold: env_or_default(
                "UPSET_ENGINE_CB_FAILURE_THRESHOLD",
                "5",
            )
            .parse()
            .unwrap_or(5),
            circuit_breaker_reset_timeout: secs("UPSET_ENGINE_CB_RESET_TIMEOUT_SECS", 60),
            circuit_breaker_success_threshold: env_or_default(
                "UPSET_ENGINE_CB_SUCCESS_THRESHOLD",
                "2",
            )
            .parse()
            .unwrap_or(2),

            // Bloom filter
            bloom_expected_items: env_or_default("UPSET_ENGINE_BLOOM_ITEMS", "100000")
                .parse()
                .unwrap_or(100_000),
            bloom_false_positive_rate: env_or_default("UPSET_ENGINE_BLOOM_FP_RATE", "0.01")
                .parse()
                .unwrap_or(0.01),
            bloom_rotation_interval: secs("UPSET_ENGINE_BLOOM_ROTATION_SECS", 86_400),
            lru_cache_size: env_or_default("UPSET_ENGINE_LRU_CACHE_SIZE", "10000")
                .parse()
                .unwrap_or(10_000),

            // Classifier / calendar
            extra_confirmation_labels: csv(&env_or_default(
                "UPSET_ENGINE_CONFIRMATION_LABELS",
                "",
            )),
            extra_court_closures: csv(&env_or_default("UPSET_ENGINE_COURT_CLOSURES", ""))
                .iter()
                .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .collect(),

            // Metrics
            metrics_port: env_or_default("UPSET_ENGINE_METRICS_PORT", "9090")
                .parse()
                .unwrap_or(9090),
        }
    }
}

/// Helper to read an environment variable with a default fallback.
/// Because unwrap_or on env::var is ugly and we have standards.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        env_or_default(key, &default.to_string())
            .parse()
            .unwrap_or(default),
    )
}

fn csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_parsing() {
        assert_eq!(
            csv("certificate of finality, order of final settlement"),
            vec![
                "certificate of finality".to_string(),
                "order of final settlement".to_string()
            ]
        );
        assert!(csv("").is_empty());
        assert!(csv(" , ,").is_empty());
    }

    #[test]
    fn test_defaults_load_without_env() {
        let config = Config::from_env();
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.healer_max_attempts, 5);
        assert!(config.redis_channel.contains("foreclosure"));
    }
}
