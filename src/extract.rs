// =============================================================================
// extract.rs — THE FIELD EXCAVATOR
// =============================================================================
//
// This module digs structured fields out of OCR'd court filings: the
// property address, the bid amounts, the legal description, the trustee.
// The source material is hostile. Form fields are handwritten. Scanners
// were last serviced during the Clinton administration. And every document
// is absolutely crawling with addresses that are NOT the property — the
// attorney's office, the defendant's last known mailing address, the
// service-of-process block for heirs unknown.
//
// The defense is a priority-ordered tier list per field:
//
//   Tier 1: explicit semantic labels glued to the value ("the address of
//           the real property is:"). When these match, they're right.
//   Tier 2: standard form-field headers from the AOC forms.
//   Tier 3: common generic phrasings ("commonly known as ...").
//   Tier 4: a bare structural pattern (street number + street name + zip),
//           used only when nothing above matched anywhere in the document.
//
// Every candidate match gets its PRECEDING text window sniffed against a
// rejection-context automaton — markers that say "this value belongs to a
// lawyer, a defendant mailing block, or a service clause." A rejected
// candidate is discarded and we move on; a rejected-only document yields
// "not found," never the rejected value. This ordering is load-bearing:
// the attorney's address usually appears FIRST in document order, so
// specificity must outrank position. Ask us how we learned that.
//
// The winning tier rides along in the result for auditability. When tier 4
// starts winning a lot, the tier 1-3 lists need new vocabulary.
// =============================================================================

use aho_corasick::AhoCorasick;
use rayon::prelude::*;
use tracing::debug;

use crate::events::parse_event_date;
use crate::models::{ExtractionResult, ExtractionVerdict, FieldKind};

/// One priority tier: a human label plus the anchor phrases that identify
/// the value. Anchors are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct TierSpec {
    pub tier: u8,
    pub label: String,
    pub anchors: Vec<String>,
}

impl TierSpec {
    fn new(tier: u8, label: &str, anchors: &[&str]) -> Self {
        Self {
            tier,
            label: label.to_string(),
            anchors: anchors.iter().map(|a| a.to_ascii_lowercase()).collect(),
        }
    }
}

/// The full, ordered, immutable pattern configuration. Passed INTO the
/// extractor rather than living in mutable global state, so tests are
/// reproducible and a dozen worker threads can share one instance without
/// anybody holding a lock.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Markers that disqualify a candidate when found in the text window
    /// immediately preceding it.
    pub rejection_markers: Vec<String>,
    /// How many characters of preceding context to sniff.
    pub rejection_window: usize,
    pub address_tiers: Vec<TierSpec>,
    pub bid_amount_tiers: Vec<TierSpec>,
    pub minimum_bid_tiers: Vec<TierSpec>,
    pub legal_description_tiers: Vec<TierSpec>,
    pub trustee_tiers: Vec<TierSpec>,
    pub sale_date_tiers: Vec<TierSpec>,
}

impl Default for ExtractorConfig {
    /// The production pattern set, compiled from reading several hundred
    /// special-proceeding files so you don't have to.
    fn default() -> Self {
        Self {
            rejection_markers: [
                "attorney for",
                "attorneys for",
                "counsel for",
                "counsel of record",
                "law office",
                "law firm",
                "agent for",
                "registered agent",
                "on behalf of",
                "last known address",
                "mailing address",
                "served upon",
                "service upon",
                "certificate of service",
                "heirs of",
                "unknown heirs",
                "defendant",
                "respondent",
                "c/o",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rejection_window: 140,
            address_tiers: vec![
                TierSpec::new(1, "explicit-property-address", &[
                    "the address of the real property is",
                    "the address for the real property is",
                    "address of the property being sold",
                    "real property located at",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "property address:",
                    "address of property:",
                    "subject property:",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "commonly known as",
                    "more commonly known as",
                    "known and numbered as",
                ]),
                // Tier 4 is the built-in structural scan; no anchors.
            ],
            bid_amount_tiers: vec![
                TierSpec::new(1, "explicit-bid-amount", &[
                    "amount of bid:",
                    "amount of the bid:",
                    "the amount of the final bid",
                    "highest bid of",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "amount of bid",
                    "final bid",
                    "high bid",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "bid in the amount of",
                    "sold for the sum of",
                ]),
            ],
            minimum_bid_tiers: vec![
                TierSpec::new(1, "explicit-minimum-upset", &[
                    "minimum amount of next upset bid:",
                    "the minimum amount of the next upset bid",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "minimum amount of next upset bid",
                    "minimum upset bid",
                    "amount of minimum upset bid",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "next upset bid must be at least",
                    "an upset bid of not less than",
                ]),
            ],
            legal_description_tiers: vec![
                TierSpec::new(1, "explicit-legal-description", &[
                    "the real property being sold is described as follows",
                    "legal description of the property:",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "legal description:",
                    "description of property:",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "being all of lot",
                    "lying and being in",
                ]),
            ],
            trustee_tiers: vec![
                TierSpec::new(1, "explicit-trustee", &[
                    "substitute trustee:",
                    "the substitute trustee is",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "trustee:",
                    "name of trustee",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "as trustee,",
                    "acting as trustee",
                ]),
            ],
            sale_date_tiers: vec![
                TierSpec::new(1, "explicit-sale-date", &[
                    "date of sale:",
                    "the sale was held on",
                    "sale conducted on",
                ]),
                TierSpec::new(2, "form-field-header", &[
                    "sale date",
                    "date of foreclosure sale",
                ]),
                TierSpec::new(3, "generic-phrasing", &[
                    "sold at public auction on",
                    "offered for sale on",
                ]),
            ],
        }
    }
}

/// The extractor: a config plus its compiled rejection automaton. Build one,
/// wrap it in an Arc, share it across the whole worker pool. Read-only
/// forever after.
pub struct Extractor {
    cfg: ExtractorConfig,
    rejection: AhoCorasick,
}

impl Extractor {
    pub fn new(cfg: ExtractorConfig) -> Self {
        let rejection = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&cfg.rejection_markers)
            .expect("Failed to build rejection-context automaton — the markers are invalid somehow");
        Self { cfg, rejection }
    }

    pub fn with_defaults() -> Self {
        Self::new(ExtractorConfig::default())
    }

    /// Extract one field from one document's text. The heart of the module.
    pub fn extract(&self, text: &str, field: FieldKind) -> ExtractionResult {
        if text.is_empty() || !quick_field_check(text, field) {
            return ExtractionResult::not_found(field);
        }

        // ASCII lowering keeps byte offsets identical between the lowered
        // haystack and the original text, which the harvesters rely on.
        let lowered = text.to_ascii_lowercase();
        let mut saw_rejected = false;

        for tier in self.tiers_for(field) {
            for anchor in &tier.anchors {
                let mut search_from = 0usize;
                while let Some(rel) = lowered[search_from..].find(anchor.as_str()) {
                    let start = search_from + rel;
                    let value_start = start + anchor.len();
                    search_from = value_start;

                    if let Some(marker) = self.rejection_hit(&lowered, start) {
                        saw_rejected = true;
                        debug!(
                            field = %field,
                            tier = tier.tier,
                            marker = marker.as_str(),
                            "Extraction candidate rejected by preceding context"
                        );
                        continue;
                    }

                    if let Some(value) = harvest(text, value_start, field) {
                        debug!(
                            field = %field,
                            tier = tier.tier,
                            pattern = tier.label.as_str(),
                            "Extraction candidate accepted"
                        );
                        return ExtractionResult {
                            field,
                            value: Some(value),
                            tier: Some(tier.tier),
                            pattern_label: Some(tier.label.clone()),
                            verdict: ExtractionVerdict::Accepted,
                        };
                    }
                }
            }
        }

        // Tier 4: the bare structural fallback, currently only meaningful
        // for addresses. Used only because no higher tier matched anywhere.
        if field == FieldKind::PropertyAddress {
            for (line_start, candidate) in structural_address_candidates(text) {
                if let Some(marker) = self.rejection_hit(&lowered, line_start) {
                    saw_rejected = true;
                    debug!(
                        field = %field,
                        tier = 4u8,
                        marker = marker.as_str(),
                        "Structural address candidate rejected by preceding context"
                    );
                    continue;
                }
                return ExtractionResult {
                    field,
                    value: Some(candidate),
                    tier: Some(4),
                    pattern_label: Some("structural-fallback".to_string()),
                    verdict: ExtractionVerdict::Accepted,
                };
            }
        }

        if saw_rejected {
            // Every candidate belonged to a lawyer or a mailing block.
            // "Not found" beats "confidently wrong" every single time.
            ExtractionResult {
                field,
                value: None,
                tier: None,
                pattern_label: None,
                verdict: ExtractionVerdict::Rejected {
                    reason: "all candidates matched rejection context".to_string(),
                },
            }
        } else {
            ExtractionResult::not_found(field)
        }
    }

    /// Scan many texts for the same field in parallel. Rayon's work-stealing
    /// scheduler spreads the documents across every core; extraction is
    /// pure CPU, so this is free lunch.
    pub fn batch_extract(&self, texts: &[&str], field: FieldKind) -> Vec<ExtractionResult> {
        texts.par_iter().map(|t| self.extract(t, field)).collect()
    }

    fn tiers_for(&self, field: FieldKind) -> &[TierSpec] {
        match field {
            FieldKind::PropertyAddress => &self.cfg.address_tiers,
            FieldKind::BidAmount => &self.cfg.bid_amount_tiers,
            FieldKind::MinimumNextBid => &self.cfg.minimum_bid_tiers,
            FieldKind::LegalDescription => &self.cfg.legal_description_tiers,
            FieldKind::TrusteeContact => &self.cfg.trustee_tiers,
            FieldKind::SaleDate => &self.cfg.sale_date_tiers,
        }
    }

    /// Sniff the fixed window preceding a match for rejection markers.
    /// Returns the offending marker for the audit log.
    fn rejection_hit(&self, lowered: &str, match_start: usize) -> Option<String> {
        let window_start = match_start.saturating_sub(self.cfg.rejection_window);
        // Back off to a char boundary before slicing.
        let mut ws = window_start;
        while ws > 0 && !lowered.is_char_boundary(ws) {
            ws -= 1;
        }
        let window = &lowered[ws..match_start];
        // Rejection context never crosses a paragraph boundary. An attorney
        // block ends at the blank line separating it from the body text;
        // without this cut, a caption-page signature block poisons every
        // match on the first half of page one.
        let window = match window.rfind("\n\n") {
            Some(pos) => &window[pos + 2..],
            None => window,
        };
        self.rejection
            .find(window)
            .map(|m| window[m.start()..m.end()].to_string())
    }
}

// =============================================================================
// Value harvesting — what counts as "the value" depends on the field.
// =============================================================================

fn harvest(text: &str, from: usize, field: FieldKind) -> Option<String> {
    let rest = text.get(from..)?;
    match field {
        FieldKind::PropertyAddress => harvest_address(rest),
        FieldKind::BidAmount | FieldKind::MinimumNextBid => {
            // Same line only. Form fields stack vertically; wandering onto
            // the next line steals the neighboring field's figure.
            let line = rest.lines().next().unwrap_or("");
            parse_money(ascii_clamp(line, 100)).map(|v| format!("{:.2}", v))
        }
        FieldKind::SaleDate => harvest_date(rest),
        FieldKind::LegalDescription => harvest_paragraph(rest),
        FieldKind::TrusteeContact => harvest_line(rest),
    }
}

/// Take the rest of the line after the anchor; if the address continues on
/// the next line ("123 Maple Street\nDurham, NC 27701" is a clerk favorite),
/// stitch them together.
fn harvest_address(rest: &str) -> Option<String> {
    let mut lines = rest.lines();
    let first = clean_value(lines.next()?)?;
    let mut address = first;

    if !looks_complete_address(&address) {
        if let Some(next) = lines.next() {
            if let Some(cont) = clean_value(next) {
                if looks_like_city_state_zip(&cont) {
                    address = format!("{}, {}", address.trim_end_matches(','), cont);
                }
            }
        }
    }

    // An address with no digits is a paragraph, not an address.
    address.chars().any(|c| c.is_ascii_digit()).then_some(address)
}

fn harvest_line(rest: &str) -> Option<String> {
    let value = clean_value(rest.lines().next()?)?;
    (value.chars().filter(|c| c.is_alphabetic()).count() >= 3).then_some(value)
}

/// Legal descriptions run long. Take up to the first blank line, capped,
/// because some deeds describe every iron pipe in the county.
fn harvest_paragraph(rest: &str) -> Option<String> {
    let mut out = String::new();
    for line in rest.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() && !out.is_empty() {
            break;
        }
        if !trimmed.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(trimmed);
        }
        if out.len() >= 400 {
            break;
        }
    }
    let out = out.trim_start_matches([':', '-', ' ']).trim().to_string();
    (out.len() >= 10).then_some(out)
}

fn harvest_date(rest: &str) -> Option<String> {
    let snippet = ascii_clamp(rest, 80);
    let words: Vec<&str> = snippet.split_whitespace().collect();
    // Dates arrive as one token ("03/05/2024") or three ("March 5, 2024").
    for width in [1usize, 3] {
        for window in words.windows(width) {
            let candidate = window.join(" ");
            let candidate = candidate.trim_matches(|c: char| matches!(c, '.' | ',' | ';'));
            if let Some(d) = parse_event_date(candidate) {
                return Some(d.to_string());
            }
        }
    }
    None
}

/// Slice a prefix without splitting a UTF-8 character. OCR output is
/// "mostly ASCII," and "mostly" has ruined better slices than this one.
fn ascii_clamp(s: &str, max: usize) -> &str {
    let mut n = s.len().min(max);
    while n > 0 && !s.is_char_boundary(n) {
        n -= 1;
    }
    &s[..n]
}

fn clean_value(line: &str) -> Option<String> {
    let cleaned = line
        .trim()
        .trim_start_matches([':', '-', '#', ' '])
        .trim()
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn looks_complete_address(s: &str) -> bool {
    has_zip(s) || s.to_ascii_lowercase().contains(", nc")
}

fn looks_like_city_state_zip(s: &str) -> bool {
    let lowered = s.to_ascii_lowercase();
    lowered.contains(", nc") || lowered.contains("north carolina") || has_zip(s)
}

fn has_zip(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut run = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            let next_is_digit = bytes.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if run == 5 && !next_is_digit {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

// =============================================================================
// Tier 4: structural address detection.
// =============================================================================

/// Street-suffix vocabulary for the structural scan. Lowercase, matched as
/// whole words.
const STREET_SUFFIXES: &[&str] = &[
    "street", "st", "road", "rd", "avenue", "ave", "drive", "dr", "lane", "ln",
    "court", "ct", "circle", "cir", "boulevard", "blvd", "highway", "hwy",
    "way", "place", "pl", "trail", "trl", "parkway", "pkwy", "loop",
];

/// Find lines shaped like "123 Something Street ... 27601". Yields the byte
/// offset of the line start (for rejection-window checks) and the stitched
/// candidate value.
fn structural_address_candidates(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    let lines: Vec<&str> = text.lines().collect();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let line_start = offset + (line.len() - trimmed.len());
        offset += line.len() + 1;

        let leading_digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
        if !(1..=6).contains(&leading_digits) {
            continue;
        }
        let lowered = trimmed.to_ascii_lowercase();
        let has_suffix = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| STREET_SUFFIXES.contains(&word));
        if !has_suffix {
            continue;
        }

        let mut candidate = trimmed.trim().to_string();
        if !looks_complete_address(&candidate) {
            if let Some(next) = lines.get(idx + 1) {
                let next = next.trim();
                if looks_like_city_state_zip(next) {
                    candidate = format!("{}, {}", candidate.trim_end_matches(','), next);
                }
            }
        }
        if looks_complete_address(&candidate) {
            out.push((line_start, candidate));
        }
    }
    out
}

// =============================================================================
// Money parsing — handwriting-aware, OCR-forgiving, zero-intolerant.
// =============================================================================

/// Pull the first plausible dollar amount out of a snippet. Tolerates the
/// classic OCR confusions (O for 0, l/I for 1) because clerks' typewriters
/// and scanners conspire against us. Returns None rather than 0.0 — zero
/// is not a bid, it's an absence.
pub fn parse_money(snippet: &str) -> Option<f64> {
    let bytes = snippet.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'$' || b.is_ascii_digit() || matches!(b, b'O' | b'o' | b'l' | b'I')
        {
            // A letter only starts a money token if a '$' or digit is near;
            // otherwise every word containing 'o' would audition.
            if !b.is_ascii_digit() && b != b'$' {
                i += 1;
                continue;
            }

            let mut token = String::new();
            let mut j = if b == b'$' { i + 1 } else { i };
            while j < bytes.len() {
                match bytes[j] {
                    c @ b'0'..=b'9' => token.push(c as char),
                    b'O' | b'o' => token.push('0'),
                    b'l' | b'I' => token.push('1'),
                    b',' => {}
                    b'.' => token.push('.'),
                    b' ' if token.is_empty() => {}
                    _ => break,
                }
                j += 1;
            }

            if token.chars().any(|c| c.is_ascii_digit()) {
                if let Ok(v) = token.trim_end_matches('.').parse::<f64>() {
                    if v > 0.0 {
                        return Some(v);
                    }
                }
            }
            i = j.max(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

/// Cheap memchr gate: does the text even contain bytes this field could
/// live near? Saves the full tier walk on obviously irrelevant documents.
pub fn quick_field_check(text: &str, field: FieldKind) -> bool {
    let lowered = text.to_ascii_lowercase();
    let b = lowered.as_bytes();
    match field {
        FieldKind::PropertyAddress => {
            memchr::memmem::find(b, b"address").is_some()
                || memchr::memmem::find(b, b"known as").is_some()
                || memchr::memmem::find(b, b"property").is_some()
                || memchr::memmem::find(b, b", nc").is_some()
                || has_zip(&lowered)
        }
        FieldKind::BidAmount | FieldKind::MinimumNextBid => {
            memchr::memmem::find(b, b"bid").is_some()
                || memchr::memmem::find(b, b"sum of").is_some()
        }
        FieldKind::LegalDescription => {
            memchr::memmem::find(b, b"described").is_some()
                || memchr::memmem::find(b, b"description").is_some()
                || memchr::memmem::find(b, b"lot").is_some()
        }
        FieldKind::TrusteeContact => memchr::memmem::find(b, b"trustee").is_some(),
        FieldKind::SaleDate => memchr::memmem::find(b, b"sale").is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier1_beats_tier4_attorney_address() {
        // The attorney's structural address appears FIRST in document
        // order. The tier-1 labeled property address must still win.
        let text = "\
Smith & Associates, PLLC\n\
Attorney for Petitioner\n\
800 Lawyer Plaza Drive, Raleigh, NC 27602\n\
\n\
REPORT OF FORECLOSURE SALE\n\
The address of the real property is: 412 Honeysuckle Lane, Durham, NC 27701\n";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::PropertyAddress);
        assert_eq!(result.verdict, ExtractionVerdict::Accepted);
        assert_eq!(result.tier, Some(1));
        assert!(result.value.unwrap().contains("Honeysuckle"));
    }

    #[test]
    fn test_rejected_only_candidates_yield_not_found() {
        // Only an attorney address present: the structural fallback finds
        // it, the rejection context kills it, and we return nothing.
        let text = "\
Attorney for Petitioner:\n\
800 Lawyer Plaza Drive, Raleigh, NC 27602\n";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::PropertyAddress);
        assert!(result.value.is_none());
        assert!(matches!(result.verdict, ExtractionVerdict::Rejected { .. }));
    }

    #[test]
    fn test_structural_fallback_accepts_clean_address() {
        let text = "Sale to be held at the courthouse door.\n\
1024 Persimmon Road\n\
Asheville, NC 28801\n";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::PropertyAddress);
        assert_eq!(result.tier, Some(4));
        let value = result.value.unwrap();
        assert!(value.contains("Persimmon"));
        assert!(value.contains("28801"));
    }

    #[test]
    fn test_last_known_address_clause_is_rejected() {
        let text = "Mailed to respondent at last known address: \
214 Foxglove Court, Wilmington, NC 28401";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::PropertyAddress);
        assert!(result.value.is_none());
    }

    #[test]
    fn test_minimum_upset_bid_extraction() {
        let text = "Minimum Amount Of Next Upset Bid: $99,750.00";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::MinimumNextBid);
        assert_eq!(result.verdict, ExtractionVerdict::Accepted);
        assert_eq!(result.value.as_deref(), Some("99750.00"));
    }

    #[test]
    fn test_parse_money_ocr_confusions() {
        assert_eq!(parse_money("$95,OOO.00"), Some(95_000.0));
        assert_eq!(parse_money("$1O5,250"), Some(105_250.0));
        assert_eq!(parse_money("no numbers here"), None);
        assert_eq!(parse_money("$0.00"), None);
        assert_eq!(parse_money("$123,456.78"), Some(123_456.78));
    }

    #[test]
    fn test_sale_date_harvest() {
        let ex = Extractor::with_defaults();
        let result = ex.extract("The sale was held on March 5, 2024 at noon.", FieldKind::SaleDate);
        assert_eq!(result.value.as_deref(), Some("2024-03-05"));

        let result = ex.extract("Date of Sale: 03/05/2024", FieldKind::SaleDate);
        assert_eq!(result.value.as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn test_legal_description_paragraph() {
        let text = "The real property being sold is described as follows:\n\
BEING all of Lot 14, Block C, of the Meadowbrook Subdivision as recorded\n\
in Plat Book 42, Page 17, Wake County Registry.\n\
\n\
This the 5th day of March, 2024.";
        let ex = Extractor::with_defaults();
        let result = ex.extract(text, FieldKind::LegalDescription);
        let value = result.value.unwrap();
        assert!(value.contains("Lot 14"));
        assert!(!value.contains("5th day of March"));
    }

    #[test]
    fn test_trustee_extraction() {
        let ex = Extractor::with_defaults();
        let result = ex.extract("Substitute Trustee: Harriet B. Vane", FieldKind::TrusteeContact);
        assert_eq!(result.value.as_deref(), Some("Harriet B. Vane"));
    }

    #[test]
    fn test_batch_extract_parallel() {
        let ex = Extractor::with_defaults();
        let texts = vec![
            "Amount of Bid: $80,000.00",
            "the cat sat on the mat",
            "Amount of Bid: $120,000.00",
        ];
        let results = ex.batch_extract(&texts, FieldKind::BidAmount);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].value.as_deref(), Some("80000.00"));
        assert_eq!(results[1].verdict, ExtractionVerdict::NotFound);
        assert_eq!(results[2].value.as_deref(), Some("120000.00"));
    }

    #[test]
    fn test_empty_text_not_found() {
        let ex = Extractor::with_defaults();
        let result = ex.extract("", FieldKind::PropertyAddress);
        assert_eq!(result.verdict, ExtractionVerdict::NotFound);
    }
}
