// =============================================================================
// linker.rs — THE CHAIN-OF-CUSTODY DESK
// =============================================================================
//
// Two kinds of paperwork problems live here.
//
// First, the easy one: a downloaded document needs to be attached to the
// docket event that produced it. We match on semantic tag (a "Report Of
// Foreclosure Sale" PDF belongs to a report-of-sale event) and nearest
// date. Links never cross cases; a document's event is always an event of
// the document's own case.
//
// Second, the scary one: MISFILINGS. County staff scan hundreds of pages a
// day, and sometimes an upset bid lands in the wrong case file. The tell
// is the document's own text citing a different case number than the case
// it was filed under — especially a different county suffix. But OCR also
// mangles case numbers ("24SP001234" becomes "24SP0O1234" on a bad day),
// and we must not cry wolf over a smudge. The tiebreaker is edit distance
// plus structure: one flipped character in an otherwise-matching number is
// noise; a different suffix or a genuinely different sequence is a real
// cross-case reference and gets flagged. Flagged documents are NEVER
// deleted — they're quarantined from extraction and left for a human,
// because robots deleting court records is how you end up in the news.
// =============================================================================

use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::events::{tag_event, EventTag};
use crate::models::{CaseEvent, Document};

/// Max days between a document's printed date and its event's date for a
/// date-based link to count. Clerks file fast; scanners lag a little.
const LINK_DATE_SLACK_DAYS: i64 = 30;

/// What the identity cross-check concluded about one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCheck {
    /// The text cites the case it was filed under. All is well.
    Verified,
    /// The only citations differ by a single character from the expected
    /// number with the same structure — an OCR smudge, not a misfiling.
    OcrNoise { found: String },
    /// The text cites a genuinely different case. Suspected misfiling.
    Misfiled { found: String },
    /// No case-number-shaped string in the text at all. Common for
    /// handwritten exhibits; nothing to verify, nothing to flag.
    NoReference,
}

/// Attach unlinked documents to their most plausible producing events.
/// Mutates only `document_id`/`event_id` back-references, same case only.
pub fn link_documents(events: &mut [CaseEvent], docs: &mut [Document]) {
    for doc in docs.iter_mut() {
        if doc.event_id.is_some() {
            continue;
        }
        let doc_tag = tag_event(&doc.document_name);
        if doc_tag == EventTag::Unrecognized {
            continue;
        }

        // Candidates: same tag, same case, closest date. An undated
        // document can only link to an event by tag uniqueness.
        let mut best: Option<(usize, i64)> = None;
        for (i, event) in events.iter().enumerate() {
            if event.case_number != doc.case_number || tag_event(&event.event_type) != doc_tag {
                continue;
            }
            let distance = match (doc.document_date, event.event_date) {
                (Some(d), Some(e)) => (d - e).num_days().abs(),
                // Tag matches but one side is undated: usable, but only
                // as a last resort behind any dated match.
                _ => LINK_DATE_SLACK_DAYS,
            };
            if distance <= LINK_DATE_SLACK_DAYS
                && best.map_or(true, |(_, best_d)| distance < best_d)
            {
                best = Some((i, distance));
            }
        }

        if let Some((i, distance)) = best {
            doc.event_id = Some(events[i].id);
            events[i].document_id = Some(doc.id);
            debug!(
                document = %doc.document_name,
                event_type = %events[i].event_type,
                day_distance = distance,
                "Document linked to producing event"
            );
        }
    }
}

/// Cross-check a document's internal text against the case it was filed
/// under. Returns a verdict; the caller decides what to quarantine.
pub fn verify_case_identity(case_number: &str, ocr_text: &str) -> IdentityCheck {
    let expected = normalize_case_number(case_number);
    let citations = scan_case_numbers(ocr_text);

    if citations.is_empty() {
        return IdentityCheck::NoReference;
    }

    let mut noise: Option<String> = None;
    let mut foreign: Option<String> = None;

    for cited in &citations {
        let found = normalize_case_number(cited);
        if found == expected {
            return IdentityCheck::Verified;
        }

        let (exp_core, exp_suffix) = split_suffix(&expected);
        let (found_core, found_suffix) = split_suffix(&found);

        // A differing county suffix on matching digits is the classic
        // misfiling signature — same sequence number, wrong courthouse.
        if let (Some(es), Some(fs)) = (exp_suffix, found_suffix) {
            if exp_core == found_core && es != fs {
                foreign.get_or_insert_with(|| cited.clone());
                continue;
            }
        }

        match edit_distance(exp_core, found_core) {
            0 | 1 => {
                noise.get_or_insert_with(|| cited.clone());
            }
            _ => {
                foreign.get_or_insert_with(|| cited.clone());
            }
        }
    }

    if let Some(found) = foreign {
        warn!(
            case_number = case_number,
            cited = found.as_str(),
            "Document text cites a FOREIGN case number — suspected misfiling"
        );
        return IdentityCheck::Misfiled { found };
    }
    if let Some(found) = noise {
        debug!(
            case_number = case_number,
            cited = found.as_str(),
            "Case-number citation off by one character — treating as OCR noise"
        );
        return IdentityCheck::OcrNoise { found };
    }
    IdentityCheck::NoReference
}

/// Run identity checks over a case's documents and set the quarantine
/// flag on genuine mismatches. Returns how many were newly flagged.
pub fn flag_misfiled_documents(case_number: &str, docs: &mut [Document]) -> usize {
    let mut flagged = 0;
    for doc in docs.iter_mut() {
        if doc.suspected_misfiled {
            continue;
        }
        if let IdentityCheck::Misfiled { found } = verify_case_identity(case_number, &doc.ocr_text) {
            doc.suspected_misfiled = true;
            flagged += 1;
            let err = EngineError::Misfiled {
                case_number: case_number.to_string(),
                document_id: doc.id,
                cited: found,
            };
            warn!(
                error = %err,
                document = %doc.document_name,
                "Document quarantined from extraction pending manual review"
            );
        }
    }
    flagged
}

// =============================================================================
// Case-number scanning — hand-rolled, because NC special proceeding
// numbers have exactly one shape: YY SP NNNN, optional "-CCC" county code.
// =============================================================================

/// Find case-number-shaped substrings in free text. Handles the usual
/// renderings: "24SP001234-910", "24 SP 1234", "24-SP-001234".
pub fn scan_case_numbers(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0usize;

    while i + 4 <= bytes.len() {
        // The "SP" landmark, case-insensitive.
        if !(bytes[i].eq_ignore_ascii_case(&b's') && bytes[i + 1].eq_ignore_ascii_case(&b'p')) {
            i += 1;
            continue;
        }

        // Walk backwards over optional separators to the two-digit year.
        let mut back = i;
        while back > 0 && matches!(bytes[back - 1], b' ' | b'-') {
            back -= 1;
        }
        if back < 2 || !bytes[back - 1].is_ascii_digit() || !bytes[back - 2].is_ascii_digit() {
            i += 2;
            continue;
        }
        // Guard against eating a longer number's tail ("2024SP..." is a
        // different animal; so is "USPS").
        if back >= 3 && bytes[back - 3].is_ascii_digit() {
            i += 2;
            continue;
        }
        let year_start = back - 2;

        // Walk forward over optional separators to the sequence digits.
        let mut j = i + 2;
        while j < bytes.len() && matches!(bytes[j], b' ' | b'-') {
            j += 1;
        }
        let seq_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        let seq_len = j - seq_start;
        if !(3..=6).contains(&seq_len) {
            i += 2;
            continue;
        }

        // Optional county suffix: "-NNN".
        let mut end = j;
        if j + 1 < bytes.len() && bytes[j] == b'-' {
            let mut k = j + 1;
            while k < bytes.len() && bytes[k].is_ascii_digit() && k - j <= 3 {
                k += 1;
            }
            if k - j - 1 == 3 {
                end = k;
            }
        }

        found.push(text[year_start..end].to_string());
        i = end.max(i + 2);
    }

    found
}

/// Canonical form: uppercase, separators stripped, leading zeros in the
/// sequence collapsed so "24SP001234" and "24 SP 1234" agree.
pub fn normalize_case_number(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    // Re-attach the suffix marker: the last 3 chars are a county code iff
    // the raw form carried a hyphen before them.
    let had_suffix = raw.trim_end().len() >= 4 && raw.contains('-') && raw.rsplit('-').next().map_or(false, |s| s.len() == 3 && s.chars().all(|c| c.is_ascii_digit()));

    let (core, suffix) = if had_suffix {
        let split_at = compact.len() - 3;
        (compact[..split_at].to_string(), Some(compact[split_at..].to_string()))
    } else {
        (compact, None)
    };

    // Collapse leading zeros in the sequence portion (after "YYSP").
    let core = if core.len() > 4 && core[2..4].eq_ignore_ascii_case("SP") {
        let (prefix, seq) = core.split_at(4);
        let trimmed = seq.trim_start_matches('0');
        let seq = if trimmed.is_empty() { "0" } else { trimmed };
        format!("{}{}", prefix, seq)
    } else {
        core
    };

    match suffix {
        Some(s) => format!("{}-{}", core, s),
        None => core,
    }
}

fn split_suffix(normalized: &str) -> (&str, Option<&str>) {
    match normalized.rsplit_once('-') {
        Some((core, suffix)) => (core, Some(suffix)),
        None => (normalized, None),
    }
}

/// Plain Levenshtein. The inputs are a dozen characters; no need to be
/// clever about it.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_scan_finds_the_usual_renderings() {
        let text = "In re: 24SP001234-910, see also file 24 SP 1234 and 23-SP-000987.";
        let found = scan_case_numbers(text);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], "24SP001234-910");
        assert_eq!(found[1], "24 SP 1234");
        assert_eq!(found[2], "23-SP-000987");
    }

    #[test]
    fn test_scan_ignores_usps_and_long_numbers() {
        let found = scan_case_numbers("Mailed via USPS tracking 9400SP11 on file 2024SP001234.");
        assert!(found.is_empty());
    }

    #[test]
    fn test_normalization_agrees_across_renderings() {
        assert_eq!(
            normalize_case_number("24SP001234-910"),
            normalize_case_number("24 SP 1234-910"),
        );
        assert_ne!(
            normalize_case_number("24SP001234-910"),
            normalize_case_number("24SP001234-920"),
        );
    }

    #[test]
    fn test_matching_citation_verifies() {
        let check = verify_case_identity(
            "24SP001234-910",
            "REPORT OF SALE in the matter of 24 SP 1234-910, Wake County.",
        );
        assert_eq!(check, IdentityCheck::Verified);
    }

    #[test]
    fn test_county_suffix_mismatch_is_misfiled() {
        // Same digits, different county: the classic wrong-courthouse scan.
        let check = verify_case_identity(
            "24SP001234-910",
            "Upset bid filed in case 24SP001234-920.",
        );
        assert!(matches!(check, IdentityCheck::Misfiled { .. }));
    }

    #[test]
    fn test_single_character_smudge_is_ocr_noise() {
        // 24SP001234 misread as 24SP061234: one substitution, same shape.
        let check = verify_case_identity(
            "24SP001234-910",
            "In the matter of 24SP061234-910.",
        );
        assert!(matches!(check, IdentityCheck::OcrNoise { .. }));
    }

    #[test]
    fn test_genuinely_different_case_is_misfiled() {
        let check = verify_case_identity(
            "24SP001234-910",
            "This filing concerns 22SP007777-910 exclusively.",
        );
        assert!(matches!(check, IdentityCheck::Misfiled { .. }));
    }

    #[test]
    fn test_no_reference_for_handwritten_exhibits() {
        let check = verify_case_identity("24SP001234-910", "photo of the front porch");
        assert_eq!(check, IdentityCheck::NoReference);
    }

    #[test]
    fn test_flagging_quarantines_but_never_deletes() {
        let mut docs = vec![
            Document::new("24SP001234-910", "Upset Bid", "filed in 24SP001234-920"),
            Document::new("24SP001234-910", "Report Of Sale", "in re 24SP001234-910"),
        ];
        let flagged = flag_misfiled_documents("24SP001234-910", &mut docs);
        assert_eq!(flagged, 1);
        assert!(docs[0].suspected_misfiled);
        assert!(!docs[1].suspected_misfiled);
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_linking_by_tag_and_nearest_date() {
        let case = "24SP001234-910";
        let mut events = vec![
            CaseEvent {
                id: Uuid::new_v4(),
                case_number: case.into(),
                event_date: date(2024, 3, 4),
                event_type: "Report Of Foreclosure Sale".into(),
                description: String::new(),
                document_id: None,
                ingest_seq: 0,
            },
            CaseEvent {
                id: Uuid::new_v4(),
                case_number: case.into(),
                event_date: date(2024, 3, 12),
                event_type: "Upset Bid Filed".into(),
                description: String::new(),
                document_id: None,
                ingest_seq: 1,
            },
        ];
        let mut doc = Document::new(case, "Report Of Sale", "the sale happened");
        doc.document_date = date(2024, 3, 5);
        let mut docs = vec![doc];

        link_documents(&mut events, &mut docs);
        assert_eq!(docs[0].event_id, Some(events[0].id));
        assert_eq!(events[0].document_id, Some(docs[0].id));
        assert_eq!(events[1].document_id, None);
    }

    #[test]
    fn test_edit_distance_basics() {
        assert_eq!(edit_distance("24SP1234", "24SP1234"), 0);
        assert_eq!(edit_distance("24SP1234", "24SP1235"), 1);
        assert_eq!(edit_distance("24SP1234", "22SP7777"), 5);
    }
}
