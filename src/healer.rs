// =============================================================================
// healer.rs — THE SELF-DIAGNOSIS WARD
// =============================================================================
//
// Thousands of cases, scraped nightly, OCR'd hopefully, classified
// automatically. Some of them are going to come out of that pipeline with
// holes: no sale date, no bid, no address, no deadline. The Healer's job
// is to find those holes and fix them WITHOUT a human, escalating through
// three tiers of increasing expense and stopping at the first one that
// works:
//
//   Tier 1 — RE-EXTRACT. Re-run extraction/classification over text we
//            already hold. Pure CPU. Free. Fixes the embarrassing cases
//            where the data was sitting in a document the whole time.
//   Tier 2 — RE-OCR. Ask the OCR sidecar to take another run at the
//            case's existing files. Handles the "scanned at an angle
//            during a thunderstorm" cohort. Then tier 1 again.
//   Tier 3 — RE-SCRAPE. Ask the scraper to refetch the case: new events,
//            new documents, new hope. Then tier 1 again.
//
// A case that survives all three tiers stays FLAGGED, not retried forever:
// attempts are capped and exponentially backed off, because re-OCRing the
// same water-damaged exhibit every six hours is how you turn a data gap
// into a cloud bill. Collaborator timeouts read as "still missing," not as
// errors — the sidecars are allowed to have bad days.
//
// Dry-run mode reports what WOULD happen without mutating anything or
// bothering any collaborator. Auditors love it. So do we.
// =============================================================================

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{OcrService, RefetchStatus, Scraper};
use crate::errors::EngineError;
use crate::metrics::MetricsCollector;
use crate::models::{Case, CaseUpdate, Classification, UpdateKind};
use crate::pipeline::{missing_critical_fields, recompute_case, CriticalField, Pipeline};
use crate::store::CaseStore;

/// Healer tunables. See Config for the env-var spellings.
#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// Max escalation attempts per case before we stop and leave the flag.
    pub max_attempts: u32,
    /// Base of the exponential backoff between attempts on one case.
    pub backoff_base: Duration,
    /// How long to wait on a collaborator before reading "still missing."
    pub collaborator_timeout: Duration,
    /// Concurrent cases per healing sweep.
    pub concurrency_limit: usize,
}

/// What happened to one case in one healing run. Every record is logged;
/// auditability is the whole point of writing any of this down.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealRecord {
    pub run_id: String,
    pub case_number: String,
    pub missing_before: Vec<CriticalField>,
    pub tiers_attempted: Vec<u8>,
    pub outcome: HealOutcome,
    pub dry_run: bool,
    pub ran_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealOutcome {
    /// Nothing was missing. The best kind of diagnosis.
    AlreadyComplete,
    Healed { tier: u8 },
    /// Dry-run verdict: tier 1 alone would fix it.
    WouldHeal { tier: u8 },
    /// Escalation exhausted (or dry-run couldn't simulate further);
    /// the listed fields are still open.
    StillMissing { remaining: Vec<CriticalField> },
    /// Backoff or attempt cap said "not today."
    Skipped { reason: String },
    Error { detail: String },
}

struct AttemptState {
    attempts: u32,
    last_attempt: Instant,
}

/// The Healer. Wraps a Pipeline (for tier 1 and persistence) plus the two
/// expensive collaborators (for tiers 2 and 3).
pub struct Healer<S: CaseStore + Clone, C: Scraper, O: OcrService> {
    pipeline: Pipeline<S>,
    scraper: C,
    ocr: O,
    config: HealerConfig,
    metrics: Arc<MetricsCollector>,
    attempts: Mutex<HashMap<String, AttemptState>>,
}

impl<S: CaseStore + Clone, C: Scraper, O: OcrService> Healer<S, C, O> {
    pub fn new(
        pipeline: Pipeline<S>,
        scraper: C,
        ocr: O,
        config: HealerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            pipeline,
            scraper,
            ocr,
            config,
            metrics,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Sweep every case expected to have complete data — primarily the
    /// upset-bid cohort, where a missing deadline is money walking away.
    pub async fn heal_batch(&self, dry_run: bool) -> Vec<HealRecord> {
        let case_numbers = match self
            .pipeline
            .store()
            .list_case_numbers(Some(Classification::UpsetBid))
            .await
        {
            Ok(numbers) => numbers,
            Err(e) => {
                warn!(error = %e, "Healer could not list cases — skipping sweep");
                return Vec::new();
            }
        };

        info!(
            cases = case_numbers.len(),
            dry_run = dry_run,
            "Healing sweep starting — checking the upset-bid cohort for holes"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit.max(1)));
        let futures = case_numbers.iter().map(|case_number| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => {
                        return self.record(
                            case_number,
                            Vec::new(),
                            Vec::new(),
                            HealOutcome::Error {
                                detail: "semaphore closed".into(),
                            },
                            dry_run,
                        )
                    }
                };
                match self.heal_case(case_number, dry_run).await {
                    Ok((_, record)) => record,
                    Err(e) => self.record(
                        case_number,
                        Vec::new(),
                        Vec::new(),
                        HealOutcome::Error { detail: e.to_string() },
                        dry_run,
                    ),
                }
            }
        });

        let records = futures::future::join_all(futures).await;

        let healed = records
            .iter()
            .filter(|r| matches!(r.outcome, HealOutcome::Healed { .. }))
            .count();
        info!(
            total = records.len(),
            healed = healed,
            "Healing sweep complete"
        );
        records
    }

    /// Heal one case: the `healCase` operation. Returns the (possibly
    /// updated) case and the audit record.
    pub async fn heal_case(
        &self,
        case_number: &str,
        dry_run: bool,
    ) -> Result<(Case, HealRecord), EngineError> {
        let case = self.pipeline.store().load_case(case_number).await?;
        let missing = missing_critical_fields(&case);

        if missing.is_empty() {
            return Ok((
                case,
                self.record(case_number, missing, Vec::new(), HealOutcome::AlreadyComplete, dry_run),
            ));
        }

        // Futility guard — dry runs are exempt, they cost nothing and
        // mutate nothing.
        if !dry_run {
            if let Some(reason) = self.backoff_reason(case_number) {
                debug!(case_number = case_number, reason = reason.as_str(), "Heal skipped");
                return Ok((
                    case,
                    self.record(
                        case_number,
                        missing,
                        Vec::new(),
                        HealOutcome::Skipped { reason },
                        dry_run,
                    ),
                ));
            }
            self.note_attempt(case_number);
        }

        if dry_run {
            return self.dry_run_tier1(case, missing).await;
        }

        let mut tiers = Vec::new();

        // ── Tier 1: re-extract from what we already hold. Free. ──
        tiers.push(1);
        let case = self.pipeline.classify_case(case_number).await?;
        if missing_critical_fields(&case).is_empty() {
            return Ok(self.healed(case, case_number, missing, tiers, 1));
        }

        // ── Tier 2: re-OCR the existing documents, then tier 1 again. ──
        tiers.push(2);
        if self.reocr_documents(case_number).await? > 0 {
            let case = self.pipeline.classify_case(case_number).await?;
            if missing_critical_fields(&case).is_empty() {
                return Ok(self.healed(case, case_number, missing, tiers, 2));
            }
        }

        // ── Tier 3: ask the scraper for fresh material, then tier 1. ──
        tiers.push(3);
        self.rescrape(case_number).await?;
        let mut case = self.pipeline.classify_case(case_number).await?;
        let remaining = missing_critical_fields(&case);
        if remaining.is_empty() {
            return Ok(self.healed(case, case_number, missing, tiers, 3));
        }

        // All three tiers came up short. Flag it, count it, stop burning
        // money on it until the backoff clock says otherwise.
        self.metrics.increment_heal_unresolved();
        let reason = format!(
            "healer exhausted all tiers; still missing: {}",
            remaining
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if !case.review_reasons.contains(&reason) {
            case.needs_review = true;
            case.review_reasons.push(reason);
            let version = case.version;
            case = self.pipeline.store().upsert_case(&case, version).await?;
            self.pipeline
                .publish(CaseUpdate::from_case(&case, UpdateKind::FlaggedForReview));
        }
        for gap in &remaining {
            let err = EngineError::FieldMissing {
                case_number: case_number.to_string(),
                field: gap.as_str(),
            };
            warn!(error = %err, "Unresolved critical field after full escalation");
        }
        warn!(
            case_number = case_number,
            remaining = ?remaining.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "Case remains incomplete after full escalation — flagged for manual review"
        );
        let record = self.record(
            case_number,
            missing,
            tiers,
            HealOutcome::StillMissing { remaining },
            dry_run,
        );
        Ok((case, record))
    }

    /// Tier 1 in a sandbox: recompute in memory, report, touch nothing.
    async fn dry_run_tier1(
        &self,
        case: Case,
        missing: Vec<CriticalField>,
    ) -> Result<(Case, HealRecord), EngineError> {
        let events = self.pipeline.store().load_events(&case.case_number).await?;
        let docs = self.pipeline.store().load_documents(&case.case_number).await?;
        let rc = recompute_case(
            &case,
            events,
            docs,
            self.pipeline.extractor(),
            self.pipeline.calendar(),
            self.pipeline.classifier_config(),
            Utc::now().date_naive(),
        );
        let outcome = if rc.gaps.is_empty() {
            HealOutcome::WouldHeal { tier: 1 }
        } else {
            // Tiers 2 and 3 involve collaborators a dry run must not
            // touch, so the simulation stops here.
            HealOutcome::StillMissing { remaining: rc.gaps }
        };
        let record = self.record(&case.case_number, missing, vec![1], outcome, true);
        Ok((case, record))
    }

    /// Re-OCR every document on the case, replacing text in place.
    /// Returns how many documents came back with NEW text.
    async fn reocr_documents(&self, case_number: &str) -> Result<usize, EngineError> {
        let docs = self.pipeline.store().load_documents(case_number).await?;
        let mut refreshed = 0usize;

        for mut doc in docs {
            let result = self
                .with_timeout("ocr", self.ocr.reprocess(doc.id))
                .await;
            match result {
                Ok(new_text) => {
                    if !new_text.trim().is_empty() && new_text != doc.ocr_text {
                        doc.ocr_text = new_text;
                        self.pipeline.store().update_document(&doc).await?;
                        refreshed += 1;
                    }
                }
                Err(e) if e.is_transient() => {
                    // A sulking OCR sidecar is a tier outcome, not a crash.
                    debug!(document_id = %doc.id, error = %e, "Re-OCR unavailable for document");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(case_number = case_number, refreshed = refreshed, "Re-OCR pass finished");
        Ok(refreshed)
    }

    /// Tier 3 field work: refetch the timeline, ingest what's new, and
    /// pull + OCR documents for events that never got one.
    async fn rescrape(&self, case_number: &str) -> Result<(), EngineError> {
        let status = match self
            .with_timeout("scraper", self.scraper.request_refetch(case_number))
            .await
        {
            Ok(s) => s,
            Err(e) if e.is_transient() => {
                debug!(case_number = case_number, error = %e, "Refetch request unavailable");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if status == RefetchStatus::Rejected {
            debug!(case_number = case_number, "Scraper rejected the refetch request");
            return Ok(());
        }

        let raw = match self
            .with_timeout("scraper", self.scraper.fetch_case_timeline(case_number))
            .await
        {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => {
                debug!(case_number = case_number, error = %e, "Timeline refetch timed out — still missing");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let seq_base = self
            .pipeline
            .store()
            .load_events(case_number)
            .await?
            .iter()
            .map(|e| e.ingest_seq + 1)
            .max()
            .unwrap_or(0);
        let inserted = self
            .pipeline
            .ingest_timeline(case_number, raw, seq_base)
            .await?;

        // Chase documents for events that have none. Each one is bytes
        // from the scraper plus text from the OCR sidecar.
        let events = self.pipeline.store().load_events(case_number).await?;
        for event in events.iter().filter(|e| e.document_id.is_none()) {
            let bytes = match self
                .with_timeout("scraper", self.scraper.fetch_document(event.id))
                .await
            {
                Ok(b) if !b.is_empty() => b,
                _ => continue,
            };
            let text = match self.with_timeout("ocr", self.ocr.extract_text(&bytes)).await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let mut doc = crate::models::Document::new(
                case_number,
                event.event_type.clone(),
                text,
            );
            doc.document_date = event.event_date;
            doc.event_id = Some(event.id);
            self.pipeline.store().insert_document(doc).await?;
        }

        debug!(
            case_number = case_number,
            new_events = inserted,
            "Re-scrape pass finished"
        );
        Ok(())
    }

    /// The periodic healing loop. Runs until the shutdown flag flips.
    pub async fn run(&self, interval: Duration, shutdown: &mut watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            "Healer online — the ward is accepting patients"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let _ = self.heal_batch(false).await;
                }
                _ = shutdown.changed() => {
                    info!("Healer received shutdown signal — closing the ward");
                    break;
                }
            }
        }
    }

    fn healed(
        &self,
        case: Case,
        case_number: &str,
        missing: Vec<CriticalField>,
        tiers: Vec<u8>,
        tier: u8,
    ) -> (Case, HealRecord) {
        self.metrics.increment_heal(tier);
        self.attempts.lock().remove(case_number);
        self.pipeline
            .publish(CaseUpdate::from_case(&case, UpdateKind::Healed { tier }));
        info!(
            case_number = case_number,
            tier = tier,
            "Case HEALED — gaps closed at tier {}",
            tier
        );
        let record = self.record(case_number, missing, tiers, HealOutcome::Healed { tier }, false);
        (case, record)
    }

    fn record(
        &self,
        case_number: &str,
        missing_before: Vec<CriticalField>,
        tiers_attempted: Vec<u8>,
        outcome: HealOutcome,
        dry_run: bool,
    ) -> HealRecord {
        let record = HealRecord {
            run_id: Uuid::new_v4().to_string(),
            case_number: case_number.to_string(),
            missing_before,
            tiers_attempted,
            outcome,
            dry_run,
            ran_at: Utc::now(),
        };
        debug!(
            case_number = %record.case_number,
            outcome = ?record.outcome,
            dry_run = record.dry_run,
            "Heal record written"
        );
        record
    }

    fn backoff_reason(&self, case_number: &str) -> Option<String> {
        let attempts = self.attempts.lock();
        let state = attempts.get(case_number)?;
        if state.attempts >= self.config.max_attempts {
            return Some(format!(
                "attempt cap reached ({}/{})",
                state.attempts, self.config.max_attempts
            ));
        }
        let wait = self.config.backoff_base * 2u32.saturating_pow(state.attempts.saturating_sub(1));
        if state.last_attempt.elapsed() < wait {
            return Some(format!(
                "in backoff for another {}s",
                (wait - state.last_attempt.elapsed()).as_secs()
            ));
        }
        None
    }

    fn note_attempt(&self, case_number: &str) {
        let mut attempts = self.attempts.lock();
        let state = attempts.entry(case_number.to_string()).or_insert(AttemptState {
            attempts: 0,
            last_attempt: Instant::now(),
        });
        state.attempts += 1;
        state.last_attempt = Instant::now();
    }

    async fn with_timeout<T>(
        &self,
        name: &'static str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.config.collaborator_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                name,
                seconds: self.config.collaborator_timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierConfig;
    use crate::deadline::CourtCalendar;
    use crate::dedup::DedupEngine;
    use crate::extract::Extractor;
    use crate::models::{CaseEvent, Document, RawEvent};
    use crate::store::MemoryStore;
    use portable_atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MockScraper {
        refetches: AtomicU32,
        timeline: Vec<RawEvent>,
    }

    impl Scraper for &MockScraper {
        async fn fetch_case_timeline(&self, _case: &str) -> Result<Vec<RawEvent>, EngineError> {
            Ok(self.timeline.clone())
        }
        async fn fetch_document(&self, _event_id: Uuid) -> Result<Vec<u8>, EngineError> {
            Ok(Vec::new())
        }
        async fn request_refetch(&self, _case: &str) -> Result<RefetchStatus, EngineError> {
            self.refetches.fetch_add(1, Ordering::SeqCst);
            Ok(RefetchStatus::Accepted)
        }
    }

    #[derive(Default)]
    struct MockOcr {
        reprocesses: AtomicU32,
        better_text: String,
    }

    impl OcrService for &MockOcr {
        async fn extract_text(&self, _bytes: &[u8]) -> Result<String, EngineError> {
            Ok(String::new())
        }
        async fn reprocess(&self, _document_id: Uuid) -> Result<String, EngineError> {
            self.reprocesses.fetch_add(1, Ordering::SeqCst);
            Ok(self.better_text.clone())
        }
    }

    fn build_healer<'a>(
        store: MemoryStore,
        scraper: &'a MockScraper,
        ocr: &'a MockOcr,
        max_attempts: u32,
    ) -> Healer<MemoryStore, &'a MockScraper, &'a MockOcr> {
        let (tx, _rx) = crossbeam_channel::bounded(100);
        let metrics = Arc::new(MetricsCollector::new());
        let pipeline = Pipeline::new(
            store,
            Arc::new(Extractor::with_defaults()),
            CourtCalendar::new(),
            ClassifierConfig::default(),
            Arc::new(DedupEngine::new(1000, 0.01, 100, 3600)),
            tx,
            metrics.clone(),
            2,
            3,
        );
        Healer::new(
            pipeline,
            scraper,
            ocr,
            HealerConfig {
                max_attempts,
                backoff_base: Duration::from_secs(3600),
                collaborator_timeout: Duration::from_secs(5),
                concurrency_limit: 2,
            },
            metrics,
        )
    }

    fn upset_case(case_number: &str) -> Case {
        let mut case = Case::new(case_number);
        case.classification = Classification::UpsetBid;
        case
    }

    fn sale_event(case_number: &str) -> CaseEvent {
        CaseEvent {
            id: Uuid::new_v4(),
            case_number: case_number.into(),
            event_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 4),
            event_type: "Report Of Foreclosure Sale".into(),
            description: String::new(),
            document_id: None,
            ingest_seq: 0,
        }
    }

    const GOOD_DOC: &str = "REPORT OF FORECLOSURE SALE in re 24SP001234-910\n\
The sale was held on March 4, 2024.\n\
The address of the real property is: 412 Honeysuckle Lane, Durham, NC 27701\n\
Amount of Bid: $95,000.00\n";

    #[tokio::test]
    async fn test_tier1_heals_without_collaborators() {
        // The address was in the stored OCR text all along. Tier 1 must
        // close the gap with ZERO collaborator calls.
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        store.seed_case(upset_case(case_number));
        store.insert_events(vec![sale_event(case_number)]).await.unwrap();
        let mut doc = Document::new(case_number, "Report Of Foreclosure Sale", GOOD_DOC);
        doc.document_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 4);
        store.seed_document(doc);

        let scraper = MockScraper::default();
        let ocr = MockOcr::default();
        let healer = build_healer(store, &scraper, &ocr, 5);

        let (healed_case, record) = healer.heal_case(case_number, false).await.unwrap();
        assert_eq!(record.outcome, HealOutcome::Healed { tier: 1 });
        assert!(healed_case.property_address.is_some());
        assert!(healed_case.next_bid_deadline.is_some());
        assert_eq!(scraper.refetches.load(Ordering::SeqCst), 0);
        assert_eq!(ocr.reprocesses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tier2_reocr_rescues_garbage_text() {
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        store.seed_case(upset_case(case_number));
        store.insert_events(vec![sale_event(case_number)]).await.unwrap();
        // The stored text is OCR soup; the mock's second pass is clean.
        store.seed_document(Document::new(
            case_number,
            "Report Of Foreclosure Sale",
            "~~%% jfkd ;;; unreadable",
        ));

        let scraper = MockScraper::default();
        let ocr = MockOcr {
            reprocesses: AtomicU32::new(0),
            better_text: GOOD_DOC.to_string(),
        };
        let healer = build_healer(store, &scraper, &ocr, 5);

        let (healed_case, record) = healer.heal_case(case_number, false).await.unwrap();
        assert_eq!(record.outcome, HealOutcome::Healed { tier: 2 });
        assert!(healed_case.property_address.is_some());
        assert!(ocr.reprocesses.load(Ordering::SeqCst) >= 1);
        assert_eq!(scraper.refetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tier3_rescrape_supplies_missing_events() {
        // No events at all: the deadline cannot exist until the scraper
        // hands over the report-of-sale filing.
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        let mut case = upset_case(case_number);
        case.sale_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 4);
        case.property_address = Some("412 Honeysuckle Lane, Durham, NC 27701".into());
        case.current_bid_amount = Some(95_000.0);
        case.minimum_next_bid = Some(99_750.0);
        store.seed_case(case);

        let scraper = MockScraper {
            refetches: AtomicU32::new(0),
            timeline: vec![RawEvent {
                event_date: Some("03/04/2024".into()),
                event_type: "Report Of Foreclosure Sale".into(),
                description: "sold at the courthouse door".into(),
            }],
        };
        let ocr = MockOcr::default();
        let healer = build_healer(store, &scraper, &ocr, 5);

        let (healed_case, record) = healer.heal_case(case_number, false).await.unwrap();
        assert_eq!(record.outcome, HealOutcome::Healed { tier: 3 });
        assert!(healed_case.next_bid_deadline.is_some());
        assert_eq!(scraper.refetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_touching_anything() {
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        store.seed_case(upset_case(case_number));
        store.insert_events(vec![sale_event(case_number)]).await.unwrap();
        store.seed_document(Document::new(case_number, "Report Of Foreclosure Sale", GOOD_DOC));

        let scraper = MockScraper::default();
        let ocr = MockOcr::default();
        let healer = build_healer(store.clone(), &scraper, &ocr, 5);

        let (_, record) = healer.heal_case(case_number, true).await.unwrap();
        assert_eq!(record.outcome, HealOutcome::WouldHeal { tier: 1 });
        assert!(record.dry_run);

        // Nothing mutated, nobody called.
        let untouched = store.load_case(case_number).await.unwrap();
        assert!(untouched.property_address.is_none());
        assert_eq!(untouched.version, 0);
        assert_eq!(scraper.refetches.load(Ordering::SeqCst), 0);
        assert_eq!(ocr.reprocesses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_case_is_flagged_then_skipped() {
        // Nothing anywhere can fill the gaps: all tiers fail, the case is
        // flagged, and the SECOND attempt is skipped by the backoff guard.
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        store.seed_case(upset_case(case_number));

        let scraper = MockScraper::default(); // empty timeline
        let ocr = MockOcr::default();
        let healer = build_healer(store.clone(), &scraper, &ocr, 5);

        let (flagged, record) = healer.heal_case(case_number, false).await.unwrap();
        assert!(matches!(record.outcome, HealOutcome::StillMissing { .. }));
        assert!(flagged.needs_review);
        assert!(flagged
            .review_reasons
            .iter()
            .any(|r| r.contains("healer exhausted")));

        let (_, second) = healer.heal_case(case_number, false).await.unwrap();
        assert!(matches!(second.outcome, HealOutcome::Skipped { .. }));
        // Backoff means no new collaborator traffic either.
        assert_eq!(scraper.refetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_case_is_left_alone() {
        let case_number = "24SP001234-910";
        let store = MemoryStore::new();
        let mut case = upset_case(case_number);
        case.sale_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 4);
        case.next_bid_deadline = chrono::NaiveDate::from_ymd_opt(2024, 3, 14);
        case.property_address = Some("412 Honeysuckle Lane".into());
        case.current_bid_amount = Some(95_000.0);
        case.minimum_next_bid = Some(99_750.0);
        store.seed_case(case);

        let scraper = MockScraper::default();
        let ocr = MockOcr::default();
        let healer = build_healer(store, &scraper, &ocr, 5);

        let (_, record) = healer.heal_case(case_number, false).await.unwrap();
        assert_eq!(record.outcome, HealOutcome::AlreadyComplete);
    }
}
