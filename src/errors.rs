// =============================================================================
// errors.rs — THE TAXONOMY OF THINGS GOING WRONG
// =============================================================================
//
// Foreclosure data fails in a small number of well-understood ways, and every
// one of them gets its own variant here. The golden rule of this engine:
// a gap is a GAP, never a zero. A document that contradicts its case is a
// FLAG, never a fact. A bid that goes down is a MISREAD, never an update.
//
// Anything that doesn't fit one of these variants gets wrapped in anyhow at
// the task boundary, because some failures (Redis hiccups, DNS tantrums)
// are not worth a bespoke type.
// =============================================================================

use thiserror::Error;
use uuid::Uuid;

/// Every way this engine refuses to do the wrong thing, enumerated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store has never heard of this case. Either the scraper hasn't
    /// found it yet or someone typed a case number from memory. Never works.
    #[error("case {case_number} not found in the store")]
    CaseNotFound { case_number: String },

    /// A critical field is missing and no document we hold can supply it.
    /// This is the Healer's cue, not a value to be defaulted.
    #[error("case {case_number} is missing critical field '{field}'")]
    FieldMissing {
        case_number: String,
        field: &'static str,
    },

    /// A later-observed bid was LOWER than the recorded one. Upset bids only
    /// go up — that's the whole point of the word "upset." A decrease means
    /// the OCR misread a handwritten figure or the document belongs to a
    /// different case. Either way: rejected, logged, not applied.
    #[error("bid decrease rejected on {case_number}: recorded ${prior:.2}, proposed ${proposed:.2}")]
    BidDecrease {
        case_number: String,
        prior: f64,
        proposed: f64,
    },

    /// A document's own text cites a different case number than the case it
    /// was filed under. Flagged for a human; excluded from extraction.
    #[error("document {document_id} on case {case_number} cites foreign case number {cited}")]
    Misfiled {
        case_number: String,
        document_id: Uuid,
        cited: String,
    },

    /// Optimistic concurrency lost the race. Someone else (the daily run, a
    /// manual heal, a very fast clerk) updated the row first. Retryable.
    #[error("version conflict on case {case_number}: expected v{expected}")]
    Conflict { case_number: String, expected: u64 },

    /// A collaborator (scraper, OCR service, persistence API) is having a
    /// bad day. Bounded retries already happened before this surfaced.
    #[error("collaborator '{name}' unavailable: {detail}")]
    Collaborator { name: &'static str, detail: String },

    /// A collaborator request exceeded its deadline. Per the healing
    /// contract this reads as "still missing," not as a run-ending error.
    #[error("collaborator '{name}' timed out after {seconds}s")]
    Timeout { name: &'static str, seconds: u64 },
}

impl EngineError {
    /// Transient errors are worth retrying or deferring to the next pass.
    /// Everything else is a data-quality verdict and retrying won't help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Collaborator { .. } | EngineError::Timeout { .. } | EngineError::Conflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let e = EngineError::Timeout { name: "ocr", seconds: 30 };
        assert!(e.is_transient());

        let e = EngineError::BidDecrease {
            case_number: "24SP001234-910".into(),
            prior: 100_000.0,
            proposed: 95_000.0,
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn test_display_carries_the_details() {
        let e = EngineError::FieldMissing {
            case_number: "24SP001234-910".into(),
            field: "property_address",
        };
        let msg = e.to_string();
        assert!(msg.contains("24SP001234-910"));
        assert!(msg.contains("property_address"));
    }
}
