// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF LEGAL DOOM
// =============================================================================
//
// These structs represent the fundamental building blocks of our foreclosure
// tracking system. Each field has been carefully chosen to capture every
// conceivable piece of information about a property's march through a
// North Carolina special proceeding.
//
// Is it overkill to have a confidence tier on a case classification?
// Yes. Do we care? Absolutely not. The statute doesn't care either.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The statutory upset-bid increment. North Carolina law says the next bid
/// must be at least 5% over the current one, so `minimum_next_bid` is always
/// `current_bid_amount * 1.05`. The two fields travel together or not at all.
pub const UPSET_BID_RATIO: f64 = 1.05;

/// The lifecycle state of a foreclosure case. This is a CLOSED set — the
/// store enforces it as an allowed-value constraint, and nothing in this
/// engine ever writes a state outside it. Contrast with event TYPES, which
/// are an open vocabulary because court clerks invent new labels the way
/// the rest of us invent excuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// We have the case but no recognized indicator events yet.
    /// Flagged for a human — never silently dropped.
    Unclassified,

    /// Foreclosure initiated, no sale held. The calm before the gavel.
    Upcoming,

    /// A sale happened and the 10-day upset-bid window is open.
    /// This is where the money is, and where complete data matters most.
    UpsetBid,

    /// Sale confirmed (or the window lapsed with nobody upsetting).
    /// Terminal. The trustee's deed is getting recorded.
    ClosedSold,

    /// The case was dismissed. Terminal. Somebody paid, settled, or the
    /// bank's paperwork fell apart. It happens more than you'd think.
    ClosedDismissed,

    /// A bankruptcy stay (or similar) froze the proceeding. Not terminal —
    /// the case returns to its underlying state once the stay lifts.
    Blocked,
}

impl Classification {
    /// Terminal states never transition again. The gavel has spoken.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Classification::ClosedSold | Classification::ClosedDismissed)
    }

    /// The string stored in the classification column. Fixed set, on purpose.
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unclassified => "unclassified",
            Classification::Upcoming => "upcoming",
            Classification::UpsetBid => "upset_bid",
            Classification::ClosedSold => "closed_sold",
            Classification::ClosedDismissed => "closed_dismissed",
            Classification::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How sure we are about a `closed_sold` verdict.
///
/// High means dual-signal: the upset window lapsed AND the clerk entered an
/// explicit confirmation order. Low means we're inferring from the calendar
/// alone, which is usually right and occasionally embarrassing — so low
/// confidence cases carry a review flag and get logged for human audit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// One legal proceeding. The center of the universe as far as this engine
/// is concerned. Owned by the pipeline; mutated only by the classifier,
/// extractor, and healer; never deleted here (deletion is a dashboard-level
/// decision made by people with better job titles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    /// Jurisdiction-structured identifier, e.g. "24SP001234-910":
    /// two-digit year, "SP" for Special Proceeding, a sequence number,
    /// and the county code suffix. The suffix matters — a document citing
    /// the right digits under the wrong county is a misfiling, not a match.
    pub case_number: String,

    /// The lifecycle state. See the enum above for the full existential map.
    pub classification: Classification,

    /// Confidence tier, populated for closed_sold verdicts.
    pub confidence: Option<Confidence>,

    /// True when something about this case needs human eyes: unclassified
    /// timelines, low-confidence closures, misfiled documents, fields the
    /// healer gave up on. A flag is a promise that we didn't just shrug.
    pub needs_review: bool,

    /// Why the flag is up, in plain words, for the dashboard.
    pub review_reasons: Vec<String>,

    /// When the proceeding was filed with the clerk of court.
    pub file_date: Option<NaiveDate>,

    /// When the foreclosure sale was actually held. Extracted from
    /// documents, so it's metadata — never the deadline's source of truth.
    pub sale_date: Option<NaiveDate>,

    /// The statutory upset-bid deadline. Derived ONLY from event dates plus
    /// the court calendar. Handwritten dates inside documents are explicitly
    /// distrusted for this field; a clerk's scrawl has cost people houses.
    pub next_bid_deadline: Option<NaiveDate>,

    /// The current winning bid, in dollars.
    pub current_bid_amount: Option<f64>,

    /// current_bid_amount * 1.05, cent-rounded. Statutory, not negotiable,
    /// and never edited independently of its partner field.
    pub minimum_next_bid: Option<f64>,

    /// Street address of the collateral, as extracted from filings.
    pub property_address: Option<String>,

    /// The metes-and-bounds (or lot-and-plat) legal description.
    pub legal_description: Option<String>,

    /// The substitute trustee running the sale.
    pub trustee_contact: Option<String>,

    /// Counsel of record for the foreclosing party.
    pub attorney_contact: Option<String>,

    /// When the scraper last touched this case.
    pub last_scraped_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency row version. The daily run and a manual heal
    /// can overlap; whoever loses the version check reloads and retries.
    pub version: u64,
}

impl Case {
    /// A bare case shell, the way one arrives from the scraper before the
    /// pipeline has had opinions about it.
    pub fn new(case_number: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            classification: Classification::Unclassified,
            confidence: None,
            needs_review: false,
            review_reasons: Vec::new(),
            file_date: None,
            sale_date: None,
            next_bid_deadline: None,
            current_bid_amount: None,
            minimum_next_bid: None,
            property_address: None,
            legal_description: None,
            trustee_contact: None,
            attorney_contact: None,
            last_scraped_at: None,
            version: 0,
        }
    }

    /// The county-code suffix of the case number, if present.
    /// "24SP001234-910" -> Some("910")
    pub fn county_suffix(&self) -> Option<&str> {
        self.case_number.rsplit_once('-').map(|(_, suffix)| suffix)
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (bid: {}, deadline: {})",
            self.case_number,
            self.classification,
            self.current_bid_amount
                .map(|b| format!("${:.2}", b))
                .unwrap_or_else(|| "—".to_string()),
            self.next_bid_deadline
                .map(|d| d.to_string())
                .unwrap_or_else(|| "—".to_string()),
        )
    }
}

/// One timeline entry belonging to exactly one case. Cascade-deleted with
/// the case, not that we ever delete cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub id: Uuid,

    /// The owning case.
    pub case_number: String,

    /// Nullable because some filings genuinely lack dates. Undated events
    /// are preserved and sorted last — dropped data is how you lose houses.
    pub event_date: Option<NaiveDate>,

    /// Free-text label from an OPEN vocabulary ("Report Of Foreclosure
    /// Sale", "Upset Bid Filed", whatever the clerk's office dreams up
    /// next quarter). Semantic meaning comes from events::tag_event, which
    /// can learn new labels without a schema migration.
    pub event_type: String,

    /// The docket text as scraped.
    pub description: String,

    /// The document this event produced, once the linker has done its job.
    pub document_id: Option<Uuid>,

    /// Insertion order, for the stable date-then-arrival sort. Two filings
    /// stamped the same day keep the order the courthouse produced them in.
    pub ingest_seq: u64,
}

impl CaseEvent {
    /// Exact-duplicate identity: same date + type + description. Repeated
    /// scraping passes produce these constantly; one survives.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.case_number,
            self.event_date.map(|d| d.to_string()).unwrap_or_default(),
            self.event_type.trim().to_ascii_lowercase(),
            self.description.trim().to_ascii_lowercase(),
        )
    }
}

/// A retrieved court document: the OCR'd text plus enough metadata to know
/// where it came from and whether to trust it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,

    /// The case this document was filed under. Which is not always the case
    /// it BELONGS to — see `suspected_misfiled`.
    pub case_number: String,

    /// The filing's title, e.g. "Report Of Foreclosure Sale".
    pub document_name: String,

    /// The date printed on the document, when legible.
    pub document_date: Option<NaiveDate>,

    /// The extracted text. Immutable once OCR succeeds; a re-OCR REPLACES
    /// this value on the same Document rather than minting a new one.
    pub ocr_text: String,

    /// Back-reference to the event that produced this document. Either
    /// absent (unlinked) or pointing at an event of the SAME case.
    pub event_id: Option<Uuid>,

    /// The misfiling detector raised its hand. The document stays (never
    /// auto-deleted), but extraction won't touch it until a human rules.
    pub suspected_misfiled: bool,
}

impl Document {
    pub fn new(
        case_number: impl Into<String>,
        document_name: impl Into<String>,
        ocr_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_number: case_number.into(),
            document_name: document_name.into(),
            document_date: None,
            ocr_text: ocr_text.into(),
            event_id: None,
            suspected_misfiled: false,
        }
    }
}

/// A raw event record straight off the scraper, before normalization has
/// civilized it. Dates arrive as whatever string the portal rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_date: Option<String>,
    pub event_type: String,
    pub description: String,
}

/// Which field the extractor is hunting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    PropertyAddress,
    BidAmount,
    MinimumNextBid,
    LegalDescription,
    TrusteeContact,
    SaleDate,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::PropertyAddress => "property_address",
            FieldKind::BidAmount => "bid_amount",
            FieldKind::MinimumNextBid => "minimum_next_bid",
            FieldKind::LegalDescription => "legal_description",
            FieldKind::TrusteeContact => "trustee_contact",
            FieldKind::SaleDate => "sale_date",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The extractor's verdict on one candidate field. Transient — audited,
/// logged, never persisted as its own row.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub field: FieldKind,
    pub value: Option<String>,
    /// Which pattern tier matched (1 = explicit label ... 4 = bare
    /// structural fallback). Kept for auditability: when tier 4 starts
    /// winning a lot, the pattern list needs new friends.
    pub tier: Option<u8>,
    /// The human-readable label of the winning pattern.
    pub pattern_label: Option<String>,
    pub verdict: ExtractionVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionVerdict {
    Accepted,
    /// Every candidate hit a rejection context. We'd rather say "not found"
    /// than hand back an attorney's office address as the property.
    Rejected { reason: String },
    NotFound,
}

impl ExtractionResult {
    pub fn not_found(field: FieldKind) -> Self {
        Self {
            field,
            value: None,
            tier: None,
            pattern_label: None,
            verdict: ExtractionVerdict::NotFound,
        }
    }
}

/// What gets published to Redis when a case changes. The dashboard
/// subscribes on the other end, presumably with a mix of greed and dread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseUpdate {
    /// A UUID v4 for this specific update. Every state change deserves
    /// to feel unique and special.
    pub id: String,
    pub case_number: String,
    pub classification: Classification,
    pub confidence: Option<Confidence>,
    pub current_bid_amount: Option<f64>,
    pub minimum_next_bid: Option<f64>,
    pub next_bid_deadline: Option<NaiveDate>,
    pub needs_review: bool,
    pub kind: UpdateKind,
    /// When OUR system emitted this update, not when the courthouse acted.
    pub emitted_at: DateTime<Utc>,
}

/// What kind of change prompted the update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Classified,
    BidUpdated,
    Healed { tier: u8 },
    FlaggedForReview,
}

impl CaseUpdate {
    pub fn from_case(case: &Case, kind: UpdateKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_number: case.case_number.clone(),
            classification: case.classification,
            confidence: case.confidence,
            current_bid_amount: case.current_bid_amount,
            minimum_next_bid: case.minimum_next_bid,
            next_bid_deadline: case.next_bid_deadline,
            needs_review: case.needs_review,
            kind,
            emitted_at: Utc::now(),
        }
    }
}

impl fmt::Display for CaseUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {}{}",
            self.id,
            self.case_number,
            self.classification,
            if self.needs_review { " (review)" } else { "" },
        )
    }
}

/// Round to whole cents, the way the clerk's office does when computing the
/// 5% minimum. $99,750.00 / 1.05 had better come out to exactly $95,000.00.
pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_terminality() {
        assert!(Classification::ClosedSold.is_terminal());
        assert!(Classification::ClosedDismissed.is_terminal());
        assert!(!Classification::Blocked.is_terminal());
        assert!(!Classification::UpsetBid.is_terminal());
    }

    #[test]
    fn test_county_suffix() {
        let case = Case::new("24SP001234-910");
        assert_eq!(case.county_suffix(), Some("910"));
        let case = Case::new("24SP001234");
        assert_eq!(case.county_suffix(), None);
    }

    #[test]
    fn test_event_dedup_key_ignores_case_and_whitespace() {
        let mut a = CaseEvent {
            id: Uuid::new_v4(),
            case_number: "24SP001234-910".into(),
            event_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            event_type: "Upset Bid Filed".into(),
            description: "Upset bid of $105,000".into(),
            document_id: None,
            ingest_seq: 0,
        };
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        b.event_type = "  UPSET BID FILED ".into();
        b.ingest_seq = 7;
        assert_eq!(a.dedup_key(), b.dedup_key());

        a.event_date = None;
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_round_to_cents() {
        assert_eq!(round_to_cents(99_750.0 / UPSET_BID_RATIO), 95_000.0);
        assert_eq!(round_to_cents(100.005), 100.01);
    }
}
