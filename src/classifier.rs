// =============================================================================
// classifier.rs — THE LIFECYCLE ORACLE
// =============================================================================
//
// Given a normalized timeline, decide what STATE a foreclosure case is in.
// The machine:
//
//   unclassified -> upcoming -> upset_bid -> { closed_sold, closed_dismissed }
//                       \________blocked________/
//
// with `blocked` reachable from upcoming/upset_bid and cleared when the
// stay lifts. Rules are evaluated in priority order; the whole thing is a
// PURE FUNCTION of (timeline snapshot, calendar, config, as-of date).
// No hidden state, no incremental patching — every new event triggers a
// full recompute from the full timeline, which is how replaying the same
// timeline twice yields the same answer twice. Determinism is not a
// feature here; it's the warranty.
//
// Confidence: `closed_sold` is HIGH only on a dual signal — the upset
// window lapsed AND the clerk entered an explicit confirmation order.
// Calendar-only closures are still classified, but LOW, flagged, and
// logged, because inferring finality from the absence of paperwork is
// exactly the kind of thing that ends up in a deposition.
// =============================================================================

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::deadline::{upset_bid_deadline, CourtCalendar};
use crate::events::{tag_event, EventTag};
use crate::models::{CaseEvent, Classification, Confidence};

/// Tunables the classifier takes from the outside world. The confirmation
/// label list rides in config because the set of phrases clerks use for
/// "this sale is final" is inferred from operational notes, not statute —
/// when a new county invents one, it's an env var, not a deploy.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Extra confirmation-event labels beyond the built-in vocabulary,
    /// matched case-insensitively as substrings of the event type.
    pub extra_confirmation_labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            extra_confirmation_labels: Vec::new(),
        }
    }
}

/// The classifier's complete answer for one case.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub classification: Classification,
    pub confidence: Option<Confidence>,
    /// The statutory deadline, when a qualifying event exists. Derived
    /// from EVENT dates only — document text never reaches this field.
    pub deadline: Option<NaiveDate>,
    pub needs_review: bool,
    pub review_reasons: Vec<String>,
}

impl Verdict {
    fn flagged(classification: Classification, reason: &str) -> Self {
        Self {
            classification,
            confidence: None,
            deadline: None,
            needs_review: true,
            review_reasons: vec![reason.to_string()],
        }
    }
}

/// Classify a case from its normalized timeline. `as_of` is "today" for
/// deadline-passage checks — injected so tests (and replays) can pin time.
pub fn classify(
    events: &[CaseEvent],
    calendar: &CourtCalendar,
    config: &ClassifierConfig,
    as_of: NaiveDate,
) -> Verdict {
    // Tag the whole timeline once. Position in this vec IS timeline order
    // (the normalizer already sorted date-then-insertion, undated last).
    let tagged: Vec<(usize, EventTag, &CaseEvent)> = events
        .iter()
        .enumerate()
        .map(|(i, e)| (i, effective_tag(e, config), e))
        .collect();

    let last_pos = |tag: EventTag| -> Option<usize> {
        tagged.iter().rev().find(|(_, t, _)| *t == tag).map(|(i, _, _)| *i)
    };
    let has = |tag: EventTag| -> bool { last_pos(tag).is_some() };

    // Rule 1: an unlifted bankruptcy/stay freezes everything. A lift that
    // appears LATER in the timeline clears it; this is the "returns to the
    // prior state" behavior, obtained for free by full recompute.
    if let Some(stay_at) = last_pos(EventTag::StayImposed) {
        let lifted_after = last_pos(EventTag::StayLifted).is_some_and(|lift| lift > stay_at);
        if !lifted_after {
            // Blocked is a normal resting state, not a review case — unless
            // a dismissal landed during the stay, which is legally odd
            // enough to deserve a second pair of eyes.
            let mut verdict = Verdict {
                classification: Classification::Blocked,
                confidence: None,
                deadline: None,
                needs_review: false,
                review_reasons: Vec::new(),
            };
            if has(EventTag::Dismissed) {
                verdict.needs_review = true;
                verdict
                    .review_reasons
                    .push("dismissal entered during active stay".to_string());
            }
            debug!(classification = %verdict.classification, "Case blocked by active stay");
            return verdict;
        }
    }

    // Rule 2: dismissal is terminal.
    if has(EventTag::Dismissed) {
        return Verdict {
            classification: Classification::ClosedDismissed,
            confidence: None,
            deadline: None,
            needs_review: false,
            review_reasons: Vec::new(),
        };
    }

    // The deadline ladder: latest qualifying event (report of sale or the
    // most recent upset bid) sets the window; each new one REPLACES the
    // last. Undated qualifying events can't anchor a deadline.
    let qualifying = tagged
        .iter()
        .rev()
        .find(|(_, t, e)| {
            matches!(t, EventTag::SaleHeld | EventTag::UpsetBidFiled) && e.event_date.is_some()
        })
        .map(|(i, t, e)| (*i, *t, e.event_date.unwrap_or(as_of)));

    let deadline = qualifying.map(|(_, _, date)| upset_bid_deadline(date, calendar));

    let confirmed = has(EventTag::SaleConfirmed);
    let deadline_passed = deadline.is_some_and(|d| d < as_of);
    let sale_activity = has(EventTag::SaleHeld)
        || has(EventTag::SaleScheduled)
        || has(EventTag::UpsetBidFiled);

    // Rule 3: sold. Either the clerk said so, or the window lapsed with
    // nobody upsetting.
    if confirmed || deadline_passed {
        let confidence = if confirmed && deadline_passed {
            Confidence::High
        } else {
            Confidence::Low
        };
        let needs_review = confidence == Confidence::Low;
        let mut review_reasons = Vec::new();
        if needs_review {
            let reason = if confirmed {
                "confirmation order present but upset window still open"
            } else {
                "upset window lapsed without an explicit confirmation order"
            };
            review_reasons.push(reason.to_string());
            warn!(
                deadline = ?deadline,
                confirmed = confirmed,
                "closed_sold at LOW confidence — flagged for human audit"
            );
        }
        return Verdict {
            classification: Classification::ClosedSold,
            confidence: Some(confidence),
            deadline,
            needs_review,
            review_reasons,
        };
    }

    // Rule 4: sale activity with a live (or not-yet-computable) window.
    if sale_activity {
        return Verdict {
            classification: Classification::UpsetBid,
            confidence: None,
            deadline,
            needs_review: false,
            review_reasons: Vec::new(),
        };
    }

    // Rule 5: initiated, no sale yet.
    if has(EventTag::ForeclosureInitiated) {
        return Verdict {
            classification: Classification::Upcoming,
            confidence: None,
            deadline: None,
            needs_review: false,
            review_reasons: Vec::new(),
        };
    }

    // Rule 6: nothing we recognize. Flagged, never guessed, never dropped.
    debug!(events = events.len(), "No recognized indicator events — case left unclassified");
    Verdict::flagged(
        Classification::Unclassified,
        "no recognized indicator events in timeline",
    )
}

/// The built-in vocabulary plus any configured confirmation labels.
fn effective_tag(event: &CaseEvent, config: &ClassifierConfig) -> EventTag {
    let tag = tag_event(&event.event_type);
    if tag == EventTag::Unrecognized {
        let lowered = event.event_type.to_ascii_lowercase();
        if config
            .extra_confirmation_labels
            .iter()
            .any(|l| !l.is_empty() && lowered.contains(&l.to_ascii_lowercase()))
        {
            return EventTag::SaleConfirmed;
        }
    }
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::normalize_timeline;
    use uuid::Uuid;

    fn ev(date: (i32, u32, u32), event_type: &str, seq: u64) -> CaseEvent {
        CaseEvent {
            id: Uuid::new_v4(),
            case_number: "24SP001234-910".into(),
            event_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            event_type: event_type.into(),
            description: String::new(),
            document_id: None,
            ingest_seq: seq,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(events: Vec<CaseEvent>, as_of: NaiveDate) -> Verdict {
        classify(
            &normalize_timeline(events),
            &CourtCalendar::new(),
            &ClassifierConfig::default(),
            as_of,
        )
    }

    #[test]
    fn test_scenario_ladder_from_the_spec_of_life() {
        // Initiated only -> upcoming.
        let mut events = vec![ev((2024, 2, 1), "Foreclosure Case Initiated", 0)];
        let v = run(events.clone(), date(2024, 2, 15));
        assert_eq!(v.classification, Classification::Upcoming);

        // Report of sale on 3/4 -> upset_bid with deadline 3/14.
        events.push(ev((2024, 3, 4), "Report Of Foreclosure Sale", 1));
        let v = run(events.clone(), date(2024, 3, 8));
        assert_eq!(v.classification, Classification::UpsetBid);
        assert_eq!(v.deadline, Some(date(2024, 3, 14)));

        // Upset bid on 3/12 -> window RESETS to 3/22.
        events.push(ev((2024, 3, 12), "Upset Bid Filed", 2));
        let v = run(events.clone(), date(2024, 3, 15));
        assert_eq!(v.classification, Classification::UpsetBid);
        assert_eq!(v.deadline, Some(date(2024, 3, 22)));

        // Time passes the deadline, no confirmation -> closed_sold, LOW.
        let v = run(events.clone(), date(2024, 4, 1));
        assert_eq!(v.classification, Classification::ClosedSold);
        assert_eq!(v.confidence, Some(Confidence::Low));
        assert!(v.needs_review);

        // Confirmation order lands -> HIGH confidence, review flag drops.
        events.push(ev((2024, 3, 25), "Order Confirming Sale", 3));
        let v = run(events.clone(), date(2024, 4, 1));
        assert_eq!(v.classification, Classification::ClosedSold);
        assert_eq!(v.confidence, Some(Confidence::High));
        assert!(!v.needs_review);
    }

    #[test]
    fn test_unlifted_stay_blocks() {
        let events = vec![
            ev((2024, 2, 1), "Foreclosure Case Initiated", 0),
            ev((2024, 3, 4), "Report Of Foreclosure Sale", 1),
            ev((2024, 3, 6), "Suggestion of Bankruptcy", 2),
        ];
        let v = run(events, date(2024, 3, 20));
        assert_eq!(v.classification, Classification::Blocked);
        assert!(!v.needs_review);
    }

    #[test]
    fn test_lifted_stay_returns_to_underlying_state() {
        let events = vec![
            ev((2024, 2, 1), "Foreclosure Case Initiated", 0),
            ev((2024, 3, 4), "Report Of Foreclosure Sale", 1),
            ev((2024, 3, 6), "Suggestion of Bankruptcy", 2),
            ev((2024, 3, 9), "Order Lifting Stay", 3),
        ];
        let v = run(events, date(2024, 3, 10));
        assert_eq!(v.classification, Classification::UpsetBid);
        assert_eq!(v.deadline, Some(date(2024, 3, 14)));
    }

    #[test]
    fn test_dismissal_is_terminal() {
        let events = vec![
            ev((2024, 2, 1), "Foreclosure Case Initiated", 0),
            ev((2024, 2, 20), "Voluntary Dismissal", 1),
        ];
        let v = run(events, date(2024, 3, 1));
        assert_eq!(v.classification, Classification::ClosedDismissed);
        assert!(!v.needs_review);
    }

    #[test]
    fn test_confirmation_before_window_close_is_low_confidence() {
        // Clerk confirmed early (it happens); dual signal incomplete.
        let events = vec![
            ev((2024, 3, 4), "Report Of Foreclosure Sale", 0),
            ev((2024, 3, 8), "Order Confirming Sale", 1),
        ];
        let v = run(events, date(2024, 3, 10));
        assert_eq!(v.classification, Classification::ClosedSold);
        assert_eq!(v.confidence, Some(Confidence::Low));
        assert!(v.needs_review);
    }

    #[test]
    fn test_empty_timeline_stays_unclassified_and_flagged() {
        let v = run(vec![ev((2024, 1, 5), "Filing Fee Paid", 0)], date(2024, 2, 1));
        assert_eq!(v.classification, Classification::Unclassified);
        assert!(v.needs_review);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let events = vec![
            ev((2024, 2, 1), "Foreclosure Case Initiated", 0),
            ev((2024, 3, 4), "Report Of Foreclosure Sale", 1),
            ev((2024, 3, 12), "Upset Bid Filed", 2),
        ];
        let as_of = date(2024, 3, 15);
        let first = run(events.clone(), as_of);
        let second = run(events, as_of);
        assert_eq!(first, second);
    }

    #[test]
    fn test_configured_confirmation_label() {
        let events = normalize_timeline(vec![
            ev((2024, 3, 4), "Report Of Foreclosure Sale", 0),
            ev((2024, 3, 25), "Clerk's Certificate Of Finality", 1),
        ]);
        let config = ClassifierConfig {
            extra_confirmation_labels: vec!["certificate of finality".into()],
        };
        let v = classify(&events, &CourtCalendar::new(), &config, date(2024, 4, 2));
        assert_eq!(v.classification, Classification::ClosedSold);
        assert_eq!(v.confidence, Some(Confidence::High));
    }
}
