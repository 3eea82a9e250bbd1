// =============================================================================
// events.rs — THE DOCKET WHISPERER
// =============================================================================
//
// Two jobs live here:
//
// 1. The open event vocabulary. Court systems emit free-text event labels,
//    not a closed enum, because every clerk's office in every county gets to
//    invent its own phrasing ("Upset Bid Filed", "Notice Of Upset Bid",
//    "UPSET BID", and one memorable "Upst Bid Fld"). We map those strings to
//    a small set of semantic tags using per-tag Aho-Corasick automatons —
//    the same finite-automaton technology antivirus scanners use, pointed
//    at docket entries. Adding a new label is a one-line edit, not a schema
//    migration.
//
// 2. The timeline normalizer. Repeated scraping passes hand us the same
//    events over and over, in whatever order the portal felt like. We
//    collapse exact duplicates (same date + type + description) and produce
//    a stable date-then-insertion-order sort. Undated events are preserved
//    and sorted last, because a filing without a date is still a filing —
//    dropping it would be editorializing.
// =============================================================================

use aho_corasick::AhoCorasick;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::{CaseEvent, RawEvent};

/// The semantic meaning of an event label. THIS set is closed; the strings
/// that map into it are not. New clerk vocabulary lands in the label lists
/// below without anyone touching a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    /// The special proceeding was opened. The clock of doom starts here.
    ForeclosureInitiated,
    /// A sale (or resale) has been noticed/advertised.
    SaleScheduled,
    /// The sale actually happened — a Report of Sale was filed.
    /// This is what opens the 10-day upset-bid window.
    SaleHeld,
    /// Someone upset the bid. The window resets. Greed springs eternal.
    UpsetBidFiled,
    /// The clerk confirmed the sale. The explicit, high-confidence signal.
    SaleConfirmed,
    /// The case was dismissed.
    Dismissed,
    /// A bankruptcy stay (or similar) froze the proceeding.
    StayImposed,
    /// The stay was lifted/dismissed and the proceeding may resume.
    StayLifted,
    /// We have no idea what this is. Preserved, never dropped.
    Unrecognized,
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventTag::ForeclosureInitiated => "foreclosure_initiated",
            EventTag::SaleScheduled => "sale_scheduled",
            EventTag::SaleHeld => "sale_held",
            EventTag::UpsetBidFiled => "upset_bid_filed",
            EventTag::SaleConfirmed => "sale_confirmed",
            EventTag::Dismissed => "dismissed",
            EventTag::StayImposed => "stay_imposed",
            EventTag::StayLifted => "stay_lifted",
            EventTag::Unrecognized => "unrecognized",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Label lists — compiled from reading way too many county dockets.
// Order within a list doesn't matter; the automaton finds them all at once.
// Order BETWEEN tags matters for the few labels that contain each other
// ("dismissal of stay" contains "dismissal"), which is why tag_event checks
// the more specific tags first.
// =============================================================================

static INITIATED_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "foreclosure case initiated",
        "special proceeding filed",
        "foreclosure filed",
        "notice of hearing",
        "notice of hearing on foreclosure",
        "appointment of substitute trustee",
        "order allowing foreclosure",
    ]
});

static SALE_SCHEDULED_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "notice of sale",
        "notice of resale",
        "notice of foreclosure sale",
        "amended notice of sale",
        "sale scheduled",
    ]
});

static SALE_HELD_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "report of sale",
        "report of foreclosure sale",
        "report of resale",
        "preliminary report of sale",
    ]
});

static UPSET_BID_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "upset bid filed",
        "upset bid",
        "notice of upset bid",
        "raised bid",
        "increased bid filed",
    ]
});

static CONFIRMED_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "order confirming sale",
        "confirmation of sale",
        "order of confirmation",
        "final report and account of foreclosure",
        "trustee's final report",
    ]
});

static DISMISSED_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "case dismissed",
        "dismissal",
        "voluntary dismissal",
        "order of dismissal",
        "notice of withdrawal",
        "foreclosure withdrawn",
    ]
});

static STAY_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "bankruptcy filed",
        "notice of bankruptcy",
        "suggestion of bankruptcy",
        "automatic stay",
        "stay order",
        "case stayed",
    ]
});

static STAY_LIFTED_LABELS: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "stay lifted",
        "relief from stay",
        "order lifting stay",
        "dismissal of stay",
        "bankruptcy dismissed",
        "bankruptcy discharged",
        "stay terminated",
    ]
});

fn automaton(labels: &[&str]) -> AhoCorasick {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(labels)
        .expect("Failed to build event-label automaton — the labels are invalid somehow")
}

static INITIATED: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&INITIATED_LABELS));
static SALE_SCHEDULED: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&SALE_SCHEDULED_LABELS));
static SALE_HELD: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&SALE_HELD_LABELS));
static UPSET_BID: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&UPSET_BID_LABELS));
static CONFIRMED: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&CONFIRMED_LABELS));
static DISMISSED: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&DISMISSED_LABELS));
static STAY: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&STAY_LABELS));
static STAY_LIFTED: LazyLock<AhoCorasick> = LazyLock::new(|| automaton(&STAY_LIFTED_LABELS));

/// Map a free-text event label (plus optionally its description) onto a
/// semantic tag.
///
/// Check order is specificity-driven: "dismissal of stay" must hit
/// StayLifted before the bare "dismissal" automaton gets a chance to call
/// the whole case dead, and "notice of upset bid" must not be swallowed by
/// "notice of sale". Confirmation outranks sale-held for the same reason
/// ("final report and account of foreclosure sale" contains "report of...").
pub fn tag_event(label: &str) -> EventTag {
    // Cheap gate first: if the label has none of the bytes our vocabulary
    // starts with, skip all eight automatons. Most docket noise ("Filing
    // Fee Paid", "Certificate of Service") exits here.
    if !quick_vocab_check(label) {
        return EventTag::Unrecognized;
    }

    if STAY_LIFTED.is_match(label) {
        EventTag::StayLifted
    } else if STAY.is_match(label) {
        EventTag::StayImposed
    } else if CONFIRMED.is_match(label) {
        EventTag::SaleConfirmed
    } else if UPSET_BID.is_match(label) {
        EventTag::UpsetBidFiled
    } else if SALE_HELD.is_match(label) {
        EventTag::SaleHeld
    } else if SALE_SCHEDULED.is_match(label) {
        EventTag::SaleScheduled
    } else if DISMISSED.is_match(label) {
        EventTag::Dismissed
    } else if INITIATED.is_match(label) {
        EventTag::ForeclosureInitiated
    } else {
        EventTag::Unrecognized
    }
}

/// SIMD-accelerated "is this label even worth tagging?" check.
/// memchr scans for substrings our vocabulary is built around.
pub fn quick_vocab_check(label: &str) -> bool {
    let lowered = label.to_ascii_lowercase();
    let lowered_bytes = lowered.as_bytes();
    memchr::memmem::find(lowered_bytes, b"sale").is_some()
        || memchr::memmem::find(lowered_bytes, b"bid").is_some()
        || memchr::memmem::find(lowered_bytes, b"foreclos").is_some()
        || memchr::memmem::find(lowered_bytes, b"dismiss").is_some()
        || memchr::memmem::find(lowered_bytes, b"stay").is_some()
        || memchr::memmem::find(lowered_bytes, b"bankrupt").is_some()
        || memchr::memmem::find(lowered_bytes, b"hearing").is_some()
        || memchr::memmem::find(lowered_bytes, b"trustee").is_some()
        || memchr::memmem::find(lowered_bytes, b"withdraw").is_some()
        || memchr::memmem::find(lowered_bytes, b"special proceeding").is_some()
        || memchr::memmem::find(lowered_bytes, b"confirm").is_some()
}

// =============================================================================
// Date parsing — the portal renders dates in whichever format the vendor
// shipped in 2009, and OCR'd filings add their own creative variants.
// =============================================================================

/// Try to parse a scraped date string. Returns None for garbage — a
/// malformed date makes the event UNDATED, never dropped.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let formats = ["%m/%d/%Y", "%m-%d-%Y", "%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%y"];
    for fmt in formats {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d);
        }
    }
    None
}

/// Convert a scraper's raw records into CaseEvents, assigning insertion
/// sequence numbers starting from `seq_base`. Pure; no dedup yet.
pub fn from_raw(case_number: &str, raw: Vec<RawEvent>, seq_base: u64) -> Vec<CaseEvent> {
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| CaseEvent {
            id: uuid::Uuid::new_v4(),
            case_number: case_number.to_string(),
            event_date: r.event_date.as_deref().and_then(parse_event_date),
            event_type: r.event_type,
            description: r.description,
            document_id: None,
            ingest_seq: seq_base + i as u64,
        })
        .collect()
}

/// Normalize a case's timeline: collapse exact duplicates, then sort by
/// date with insertion order breaking ties, undated events last.
///
/// Pure function, no side effects, no failure modes. Feed it the same mess
/// twice and you get the same tidy sequence twice — the classifier's
/// idempotence depends on exactly that.
pub fn normalize_timeline(mut events: Vec<CaseEvent>) -> Vec<CaseEvent> {
    let before = events.len();

    // First-seen-wins dedup. Keys are cheap strings; a HashSet is fine here
    // because this is per-case (dozens of events), unlike the cross-scrape
    // ingest path which goes through the bloom-filter engine.
    let mut seen: HashSet<String> = HashSet::with_capacity(events.len());
    events.retain(|e| seen.insert(e.dedup_key()));

    // Stable sort: dated events chronologically, undated at the end,
    // insertion sequence breaking every tie.
    events.sort_by(|a, b| match (a.event_date, b.event_date) {
        (Some(da), Some(db)) => da.cmp(&db).then(a.ingest_seq.cmp(&b.ingest_seq)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.ingest_seq.cmp(&b.ingest_seq),
    });

    if before != events.len() {
        debug!(
            collapsed = before - events.len(),
            remaining = events.len(),
            "Timeline normalized — duplicate docket entries collapsed"
        );
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ev(date: Option<(i32, u32, u32)>, event_type: &str, desc: &str, seq: u64) -> CaseEvent {
        CaseEvent {
            id: Uuid::new_v4(),
            case_number: "24SP001234-910".into(),
            event_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            event_type: event_type.into(),
            description: desc.into(),
            document_id: None,
            ingest_seq: seq,
        }
    }

    #[test]
    fn test_tagging_core_vocabulary() {
        assert_eq!(tag_event("Foreclosure Case Initiated"), EventTag::ForeclosureInitiated);
        assert_eq!(tag_event("Report Of Foreclosure Sale"), EventTag::SaleHeld);
        assert_eq!(tag_event("NOTICE OF RESALE"), EventTag::SaleScheduled);
        assert_eq!(tag_event("Upset Bid Filed"), EventTag::UpsetBidFiled);
        assert_eq!(tag_event("Order Confirming Sale"), EventTag::SaleConfirmed);
        assert_eq!(tag_event("Voluntary Dismissal"), EventTag::Dismissed);
        assert_eq!(tag_event("Suggestion of Bankruptcy"), EventTag::StayImposed);
        assert_eq!(tag_event("Order Lifting Stay"), EventTag::StayLifted);
        assert_eq!(tag_event("Filing Fee Paid"), EventTag::Unrecognized);
    }

    #[test]
    fn test_specificity_ordering() {
        // "dismissal of stay" must not read as a case dismissal
        assert_eq!(tag_event("Dismissal Of Stay"), EventTag::StayLifted);
        // "notice of upset bid" must not read as a sale notice
        assert_eq!(tag_event("Notice Of Upset Bid"), EventTag::UpsetBidFiled);
    }

    #[test]
    fn test_parse_event_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_event_date("03/05/2024"), Some(expected));
        assert_eq!(parse_event_date("2024-03-05"), Some(expected));
        assert_eq!(parse_event_date("March 5, 2024"), Some(expected));
        assert_eq!(parse_event_date("not a date"), None);
        assert_eq!(parse_event_date(""), None);
    }

    #[test]
    fn test_normalize_collapses_exact_duplicates() {
        let events = vec![
            ev(Some((2024, 3, 1)), "Upset Bid Filed", "bid of $105,000", 0),
            ev(Some((2024, 3, 1)), "Upset Bid Filed", "bid of $105,000", 1),
            ev(Some((2024, 3, 1)), "Upset Bid Filed", "bid of $110,250", 2),
        ];
        let normalized = normalize_timeline(events);
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_normalize_sorts_dates_then_insertion_order() {
        let events = vec![
            ev(Some((2024, 3, 10)), "Report Of Sale", "sold", 0),
            ev(None, "Mystery Filing", "no date on this one", 1),
            ev(Some((2024, 2, 1)), "Notice Of Sale", "scheduled", 2),
            ev(Some((2024, 3, 10)), "Upset Bid Filed", "same-day upset", 3),
        ];
        let normalized = normalize_timeline(events);
        assert_eq!(normalized[0].event_type, "Notice Of Sale");
        assert_eq!(normalized[1].event_type, "Report Of Sale");
        // Same date: insertion order breaks the tie.
        assert_eq!(normalized[2].event_type, "Upset Bid Filed");
        // Undated always last.
        assert_eq!(normalized[3].event_type, "Mystery Filing");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let events = vec![
            ev(Some((2024, 3, 10)), "Report Of Sale", "sold", 0),
            ev(None, "Mystery Filing", "???", 1),
            ev(Some((2024, 2, 1)), "Notice Of Sale", "scheduled", 2),
        ];
        let once = normalize_timeline(events);
        let twice = normalize_timeline(once.clone());
        let keys_once: Vec<String> = once.iter().map(|e| e.dedup_key()).collect();
        let keys_twice: Vec<String> = twice.iter().map(|e| e.dedup_key()).collect();
        assert_eq!(keys_once, keys_twice);
    }
}
