// =============================================================================
// bid.rs — THE HANDWRITING FORGIVENESS DEPARTMENT
// =============================================================================
//
// The "Amount Of Bid" box on an upset bid form is filled in BY HAND, at a
// counter, by a person holding a cashier's check and a pen that's running
// out of ink. OCR reads these figures about as well as a pharmacist reads
// a doctor's note. The "Minimum Amount Of Next Upset Bid" box, by contrast,
// is TYPED by the clerk, because the clerk has to compute the statutory 5%
// and clerks do not freehand arithmetic.
//
// So when the handwritten figure is illegible or implausible, we read the
// typed minimum and divide by 1.05. The statute is a ratio; ratios run
// backwards. It's the single most reliable trick in this entire engine.
//
// The other law of this module: bids only go UP. An upset bid that's lower
// than the recorded one isn't a market event, it's a misread or a misfiled
// document, and it gets rejected, logged, and never applied. The recorded
// value survives. Houses have been lost to less.
// =============================================================================

use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::extract::Extractor;
use crate::models::{round_to_cents, Case, ExtractionVerdict, FieldKind, UPSET_BID_RATIO};

/// Where a resolved bid figure came from, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidSource {
    /// Read straight out of the "Amount Of Bid" field. Lucky day.
    Direct,
    /// Back-calculated from the typed minimum-next-upset figure.
    BackCalculated,
    /// Neither field legible in any document. The Healer's problem now.
    NotFound,
}

/// The resolver's output: maybe an amount, definitely a story.
#[derive(Debug, Clone)]
pub struct BidResolution {
    pub amount: Option<f64>,
    pub source: BidSource,
}

/// Derive a usable current-bid figure from a case's document texts, newest
/// first. `prior` is the currently recorded bid, used as a plausibility
/// floor: upset bids are strictly increasing, so a direct read that comes
/// in BELOW the recorded value is treated as an OCR misread and we fall
/// through to the back-calculation.
pub fn resolve_bid(extractor: &Extractor, texts: &[&str], prior: Option<f64>) -> BidResolution {
    // Attempt 1: the handwritten "Amount Of Bid" field, as typed... sorry,
    // as scrawled.
    for text in texts {
        let direct = extractor.extract(text, FieldKind::BidAmount);
        if direct.verdict == ExtractionVerdict::Accepted {
            if let Some(amount) = direct.value.as_deref().and_then(|v| v.parse::<f64>().ok()) {
                if plausible(amount, prior) {
                    debug!(amount = amount, "Bid resolved from direct extraction");
                    return BidResolution {
                        amount: Some(round_to_cents(amount)),
                        source: BidSource::Direct,
                    };
                }
                debug!(
                    amount = amount,
                    prior = ?prior,
                    "Direct bid read is implausible — trying statutory back-calculation"
                );
            }
        }
    }

    // Attempt 2: the typed minimum, divided by the statutory ratio.
    for text in texts {
        let minimum = extractor.extract(text, FieldKind::MinimumNextBid);
        if minimum.verdict == ExtractionVerdict::Accepted {
            if let Some(min_next) = minimum.value.as_deref().and_then(|v| v.parse::<f64>().ok()) {
                let derived = round_to_cents(min_next / UPSET_BID_RATIO);
                if plausible(derived, prior) {
                    debug!(
                        minimum_next = min_next,
                        derived = derived,
                        "Bid back-calculated from typed minimum upset figure"
                    );
                    return BidResolution {
                        amount: Some(derived),
                        source: BidSource::BackCalculated,
                    };
                }
            }
        }
    }

    // Neither field found anywhere. This is a data GAP — surfaced, flagged,
    // healed later. It is never, ever a zero.
    BidResolution {
        amount: None,
        source: BidSource::NotFound,
    }
}

/// Positive, and not below the recorded floor (within a cent of slack for
/// rounding drift between the clerk's arithmetic and ours).
fn plausible(amount: f64, prior: Option<f64>) -> bool {
    if amount <= 0.0 {
        return false;
    }
    match prior {
        Some(p) => amount + 0.01 >= p,
        None => true,
    }
}

/// Apply a resolved bid to a case, enforcing the monotonic invariant and
/// keeping `minimum_next_bid` locked to the statutory ratio.
///
/// Returns Ok(true) if the case changed, Ok(false) if the bid matched what
/// we already had, and Err(BidDecrease) — logged, not applied — when the
/// proposed figure is lower than the recorded one.
pub fn apply_bid_update(case: &mut Case, proposed: f64) -> Result<bool, EngineError> {
    let proposed = round_to_cents(proposed);

    if let Some(prior) = case.current_bid_amount {
        if proposed + 0.01 < prior {
            warn!(
                case_number = %case.case_number,
                prior = prior,
                proposed = proposed,
                "Bid DECREASE rejected — upset bids only go up; treating as misread"
            );
            return Err(EngineError::BidDecrease {
                case_number: case.case_number.clone(),
                prior,
                proposed,
            });
        }
        if (proposed - prior).abs() < 0.01 {
            // Same figure re-observed. The ratio partner may still need
            // repair if an earlier writer skipped it.
            if case.minimum_next_bid.is_none() {
                case.minimum_next_bid = Some(round_to_cents(prior * UPSET_BID_RATIO));
                return Ok(true);
            }
            return Ok(false);
        }
    }

    case.current_bid_amount = Some(proposed);
    case.minimum_next_bid = Some(round_to_cents(proposed * UPSET_BID_RATIO));
    debug!(
        case_number = %case.case_number,
        bid = proposed,
        minimum_next = case.minimum_next_bid.unwrap_or_default(),
        "Bid applied with statutory minimum recomputed"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_calculation_from_typed_minimum() {
        // The canonical rescue: the handwritten amount is gone, the typed
        // minimum says $99,750.00, the bid must come out to exactly
        // $95,000.00.
        let ex = Extractor::with_defaults();
        let text = "AMOUNT OF BID: [illegible smudge]\n\
Minimum Amount Of Next Upset Bid: $99,750.00";
        let resolution = resolve_bid(&ex, &[text], None);
        assert_eq!(resolution.source, BidSource::BackCalculated);
        assert_eq!(resolution.amount, Some(95_000.0));
    }

    #[test]
    fn test_direct_extraction_preferred_when_legible() {
        let ex = Extractor::with_defaults();
        let text = "Amount of Bid: $102,500.00\n\
Minimum Amount Of Next Upset Bid: $107,625.00";
        let resolution = resolve_bid(&ex, &[text], None);
        assert_eq!(resolution.source, BidSource::Direct);
        assert_eq!(resolution.amount, Some(102_500.0));
    }

    #[test]
    fn test_implausible_direct_read_falls_back() {
        // OCR read the handwritten box as a figure BELOW the recorded bid.
        // The typed minimum rescues us.
        let ex = Extractor::with_defaults();
        let text = "Amount of Bid: $15,000.00\n\
Minimum Amount Of Next Upset Bid: $157,500.00";
        let resolution = resolve_bid(&ex, &[text], Some(140_000.0));
        assert_eq!(resolution.source, BidSource::BackCalculated);
        assert_eq!(resolution.amount, Some(150_000.0));
    }

    #[test]
    fn test_nothing_legible_is_a_gap_not_a_zero() {
        let ex = Extractor::with_defaults();
        let resolution = resolve_bid(&ex, &["totally unrelated text"], None);
        assert_eq!(resolution.source, BidSource::NotFound);
        assert_eq!(resolution.amount, None);
    }

    #[test]
    fn test_monotonic_increase_applies() {
        let mut case = Case::new("24SP001234-910");
        assert!(apply_bid_update(&mut case, 100_000.0).unwrap());
        assert!(apply_bid_update(&mut case, 105_000.0).unwrap());
        assert_eq!(case.current_bid_amount, Some(105_000.0));
        assert_eq!(case.minimum_next_bid, Some(110_250.0));
    }

    #[test]
    fn test_decrease_rejected_and_state_retained() {
        let mut case = Case::new("24SP001234-910");
        apply_bid_update(&mut case, 100_000.0).unwrap();
        let err = apply_bid_update(&mut case, 95_000.0).unwrap_err();
        assert!(matches!(err, EngineError::BidDecrease { .. }));
        // Prior valid state survives the rejection.
        assert_eq!(case.current_bid_amount, Some(100_000.0));
        assert_eq!(case.minimum_next_bid, Some(105_000.0));
    }

    #[test]
    fn test_ratio_invariant_holds_after_every_apply() {
        let mut case = Case::new("24SP001234-910");
        for bid in [80_000.0, 84_000.0, 95_123.45] {
            apply_bid_update(&mut case, bid).unwrap();
            let current = case.current_bid_amount.unwrap();
            let minimum = case.minimum_next_bid.unwrap();
            assert!((minimum - round_to_cents(current * UPSET_BID_RATIO)).abs() < 0.01);
        }
    }

    #[test]
    fn test_equal_bid_is_a_no_op() {
        let mut case = Case::new("24SP001234-910");
        apply_bid_update(&mut case, 100_000.0).unwrap();
        assert!(!apply_bid_update(&mut case, 100_000.0).unwrap());
    }
}
