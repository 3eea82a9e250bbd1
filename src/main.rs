// ██╗   ██╗██████╗ ███████╗███████╗████████╗
// ██║   ██║██╔══██╗██╔════╝██╔════╝╚══██╔══╝
// ██║   ██║██████╔╝███████╗█████╗     ██║
// ██║   ██║██╔═══╝ ╚════██║██╔══╝     ██║
// ╚██████╔╝██║     ███████║███████╗   ██║
//  ╚═════╝ ╚═╝     ╚══════╝╚══════╝   ╚═╝
//
// ██████╗ ██╗██████╗
// ██╔══██╗██║██╔══██╗
// ██████╔╝██║██║  ██║
// ██╔══██╗██║██║  ██║
// ██████╔╝██║██████╔╝
// ╚═════╝ ╚═╝╚═════╝
//
// E N G I N E
//
// The most overkill foreclosure tracking engine ever conceived.
// Rust + Tokio + Bloom Filters + SIMD + Circuit Breakers + Computus.
// All to know, ten days early, who's about to own a house in Durham.

mod bid;
mod circuit_breaker;
mod classifier;
mod collaborators;
mod config;
mod deadline;
mod dedup;
mod errors;
mod events;
mod extract;
mod healer;
mod linker;
mod metrics;
mod models;
mod pipeline;
mod publisher;
mod store;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{self, fmt, EnvFilter};

use crate::circuit_breaker::CircuitBreaker;
use crate::classifier::ClassifierConfig;
use crate::collaborators::{HttpOcr, HttpScraper};
use crate::config::Config;
use crate::deadline::CourtCalendar;
use crate::dedup::DedupEngine;
use crate::extract::Extractor;
use crate::healer::{Healer, HealerConfig};
use crate::metrics::MetricsCollector;
use crate::models::CaseUpdate;
use crate::pipeline::Pipeline;
use crate::publisher::RedisPublisher;
use crate::store::HttpCaseStore;

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║      ██╗   ██╗██████╗ ███████╗███████╗████████╗                  ║
    ║      ██║   ██║██╔══██╗██╔════╝██╔════╝╚══██╔══╝                  ║
    ║      ██║   ██║██████╔╝███████╗█████╗     ██║                     ║
    ║      ██║   ██║██╔═══╝ ╚════██║██╔══╝     ██║                     ║
    ║      ╚██████╔╝██║     ███████║███████╗   ██║                     ║
    ║       ╚═════╝ ╚═╝     ╚══════╝╚══════╝   ╚═╝                     ║
    ║                                                                  ║
    ║           ██████╗ ██╗██████╗                                     ║
    ║           ██╔══██╗██║██╔══██╗                                    ║
    ║           ██████╔╝██║██║  ██║                                    ║
    ║           ██╔══██╗██║██║  ██║                                    ║
    ║           ██████╔╝██║██████╔╝                                    ║
    ║           ╚═════╝ ╚═╝╚═════╝                                     ║
    ║                                                                  ║
    ║        ⚖️  NC FORECLOSURE UPSET-BID TRACKING ENGINE ⚖️            ║
    ║                                                                  ║
    ║   Pipeline:  normalize | extract | classify | persist            ║
    ║   Healing:   re-extract -> re-OCR -> re-scrape                   ║
    ║   Deadlines: § 45-21.27, holidays included, monks consulted      ║
    ║   Dedup:     Bloom Filter + LRU Cache Hybrid                     ║
    ║   Speed:     SIMD-Accelerated Aho-Corasick Text Scanning         ║
    ║                                                                  ║
    ║   "When the gavel falls, we already knew."                       ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

#[tokio::main(flavor = "multi_thread", worker_threads = 8)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    print_banner();

    info!("⚖️ UPSET BID ENGINE initializing...");

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("✅ Configuration loaded: store_url={}", config.store_base_url);

    // Lock-free crossbeam channel for case updates (capacity: 10,000)
    let (update_tx, update_rx) = crossbeam_channel::bounded::<CaseUpdate>(10_000);
    info!("✅ Lock-free crossbeam channel created (capacity: 10,000)");

    // Ingest dedup engine: Bloom filter + LRU cache
    let dedup_engine = Arc::new(DedupEngine::new(
        config.bloom_expected_items,
        config.bloom_false_positive_rate,
        config.lru_cache_size,
        config.bloom_rotation_interval.as_secs(),
    ));
    info!("✅ Ingest dedup engine online");

    // Metrics collector
    let metrics_collector = Arc::new(MetricsCollector::new());
    info!("✅ Metrics collector initialized");

    // One HTTP client, shared. We identify ourselves honestly because the
    // sidecar operators are us, and we'd like to stay on speaking terms.
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("UpsetBidEngine/1.0 (foreclosure-pipeline; internal)")
        .build()
        .expect("Failed to build HTTP client — this is genuinely embarrassing");

    // Circuit breakers for the two moody collaborators.
    let scraper_breaker = Arc::new(CircuitBreaker::new(
        "scraper",
        config.circuit_breaker_failure_threshold,
        config.circuit_breaker_reset_timeout,
        config.circuit_breaker_success_threshold,
    ));
    let ocr_breaker = Arc::new(CircuitBreaker::new(
        "ocr",
        config.circuit_breaker_failure_threshold,
        config.circuit_breaker_reset_timeout,
        config.circuit_breaker_success_threshold,
    ));

    // Collaborator clients
    let store = HttpCaseStore::new(config.store_base_url.clone(), http_client.clone());
    let scraper = HttpScraper::new(
        config.scraper_base_url.clone(),
        http_client.clone(),
        scraper_breaker,
        config.collaborator_max_attempts,
        config.collaborator_backoff_base,
    );
    let ocr = HttpOcr::new(
        config.ocr_base_url.clone(),
        http_client,
        ocr_breaker,
        config.collaborator_max_attempts,
        config.collaborator_backoff_base,
    );
    info!("✅ Collaborator clients armed (scraper, OCR, store)");

    // The pure-core machinery: pattern config, calendar, classifier knobs.
    let extractor = Arc::new(Extractor::with_defaults());
    let calendar = CourtCalendar::with_extra_closures(config.extra_court_closures.clone());
    let classifier_config = ClassifierConfig {
        extra_confirmation_labels: config.extra_confirmation_labels.clone(),
    };

    let pipeline = Pipeline::new(
        store,
        extractor,
        calendar,
        classifier_config,
        dedup_engine,
        update_tx.clone(),
        metrics_collector.clone(),
        config.concurrency_limit,
        config.upsert_retry_limit,
    );
    info!("✅ Pipeline assembled");

    let healer = Healer::new(
        pipeline.clone(),
        scraper,
        ocr,
        HealerConfig {
            max_attempts: config.healer_max_attempts,
            backoff_base: config.healer_backoff_base,
            collaborator_timeout: config.collaborator_timeout,
            concurrency_limit: config.concurrency_limit,
        },
        metrics_collector.clone(),
    );
    info!("✅ Healer on call");

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ═══════════════════════════════════════════
    // SPAWN THE LOOPS
    // ═══════════════════════════════════════════

    let sweep_pipeline = pipeline.clone();
    let sweep_interval = config.pipeline_interval;
    let mut sweep_shutdown = shutdown_rx.clone();
    let sweep_handle = tokio::spawn(async move {
        info!("🏛️ Pipeline sweep: ONLINE");
        sweep_pipeline.run(sweep_interval, &mut sweep_shutdown).await;
        info!("🏛️ Pipeline sweep: OFFLINE");
    });

    let healer_interval = config.healer_interval;
    let mut healer_shutdown = shutdown_rx.clone();
    let healer_handle = tokio::spawn(async move {
        info!("🩺 Healer: ONLINE");
        healer.run(healer_interval, &mut healer_shutdown).await;
        info!("🩺 Healer: OFFLINE");
    });

    // Drop our copy of update_tx so the publisher knows when all senders
    // are gone.
    drop(update_tx);
    drop(pipeline);

    // ═══════════════════════════════════════════
    // SPAWN REDIS PUBLISHER
    // ═══════════════════════════════════════════
    let pub_config = config.clone();
    let pub_shutdown = shutdown_rx.clone();
    let (redis_publisher, _pub_stats) = RedisPublisher::new(pub_config, update_rx, pub_shutdown);
    let publisher_handle = tokio::spawn(async move {
        info!("📤 Redis Publisher: ONLINE");
        if let Err(e) = redis_publisher.run().await {
            error!("📤 Redis Publisher error: {}", e);
        }
        info!("📤 Redis Publisher: OFFLINE");
    });

    // ═══════════════════════════════════════════
    // SPAWN METRICS HTTP SERVER
    // ═══════════════════════════════════════════
    let metrics_for_server = metrics_collector.clone();
    let metrics_port = config.metrics_port;
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        info!("📊 Metrics server starting on port {}...", metrics_port);
        metrics::run_metrics_server(metrics_for_server, metrics_port, &mut metrics_shutdown).await;
        info!("📊 Metrics server: OFFLINE");
    });

    info!("═══════════════════════════════════════════════════════");
    info!("  🟢 ALL SYSTEMS ONLINE - UPSET BID ENGINE ACTIVE");
    info!("  🏛️ Sweeping the docket every {}s", config.pipeline_interval.as_secs());
    info!("  🩺 Healing pass every {}s", config.healer_interval.as_secs());
    info!("  📤 Publishing to Redis at {}", config.redis_url);
    info!("  📊 Metrics at http://0.0.0.0:{}/metrics", config.metrics_port);
    info!("  ⚡ Press Ctrl+C for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("🛑 Shutdown signal received!");
            let _ = shutdown_tx.send(true);
        }
        Err(err) => {
            error!("❌ Signal listener error: {}", err);
            let _ = shutdown_tx.send(true);
        }
    }

    info!("⏳ Waiting for tasks to complete (timeout: 10s)...");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = tokio::join!(sweep_handle, healer_handle, publisher_handle, metrics_handle);
    })
    .await;

    info!("🔨 UPSET BID ENGINE: ADJOURNED");
    Ok(())
}
