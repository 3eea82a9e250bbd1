// =============================================================================
// store.rs — THE PERSISTENCE COUNTER
// =============================================================================
//
// The actual database lives on the other side of an internal API, owned by
// people who enjoy writing migrations. This engine sees it as a trait:
// load a case, load its timeline, load its documents, write a case back
// with optimistic concurrency, append events with duplicate suppression.
//
// Two implementations:
//
// - HttpCaseStore: the production client, speaking JSON to the persistence
//   service the same way our other clients speak to the scraper and OCR
//   sidecars. A 409 on the versioned upsert means somebody else (the daily
//   run, a manual heal, an over-caffeinated operator) got there first —
//   reload, recompute, retry. That per-case version check is the ONLY
//   critical section in the whole engine; there are no long-lived locks
//   anywhere, and there never will be.
//
// - MemoryStore: parking_lot-locked maps for tests. Same contract,
//   zero network, no feelings.
// =============================================================================

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::models::{Case, CaseEvent, Classification, Document};

/// The persistence collaborator's contract.
#[allow(async_fn_in_trait)]
pub trait CaseStore: Send + Sync {
    async fn load_case(&self, case_number: &str) -> Result<Case, EngineError>;
    async fn load_events(&self, case_number: &str) -> Result<Vec<CaseEvent>, EngineError>;
    async fn load_documents(&self, case_number: &str) -> Result<Vec<Document>, EngineError>;

    /// Atomic per-case upsert. Fails with `Conflict` when the stored
    /// version no longer matches `expected_version`; the winner's row is
    /// retained and the loser reloads. Returns the stored case with its
    /// version bumped.
    async fn upsert_case(&self, case: &Case, expected_version: u64) -> Result<Case, EngineError>;

    /// Append-only event insert with duplicate suppression (exact
    /// date + type + description). Returns how many rows actually landed.
    async fn insert_events(&self, events: Vec<CaseEvent>) -> Result<usize, EngineError>;

    async fn insert_document(&self, doc: Document) -> Result<(), EngineError>;

    /// Whole-row document update: re-OCR'd text REPLACES the old text on
    /// the same row; link back-references and misfiling flags ride along.
    async fn update_document(&self, doc: &Document) -> Result<(), EngineError>;

    /// Case numbers, optionally filtered by classification.
    async fn list_case_numbers(
        &self,
        classification: Option<Classification>,
    ) -> Result<Vec<String>, EngineError>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// The production store client. Cheap to clone; reqwest pools underneath.
#[derive(Clone)]
pub struct HttpCaseStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCaseStore {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn case_url(&self, case_number: &str, tail: &str) -> String {
        format!(
            "{}/cases/{}{}",
            self.base_url,
            urlencoding::encode(case_number),
            tail
        )
    }

    fn unavailable(e: reqwest::Error) -> EngineError {
        EngineError::Collaborator {
            name: "store",
            detail: e.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, EngineError> {
        let response = self.client.get(&url).send().await.map_err(Self::unavailable)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::CaseNotFound {
                case_number: url.rsplit('/').next().unwrap_or("?").to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(EngineError::Collaborator {
                name: "store",
                detail: format!("HTTP {} from {}", response.status(), url),
            });
        }
        response.json::<T>().await.map_err(Self::unavailable)
    }
}

impl CaseStore for HttpCaseStore {
    async fn load_case(&self, case_number: &str) -> Result<Case, EngineError> {
        let result: Result<Case, EngineError> = self.get_json(self.case_url(case_number, "")).await;
        // Rewrite the 404 with the human-readable number, not the escaped one.
        result.map_err(|e| match e {
            EngineError::CaseNotFound { .. } => EngineError::CaseNotFound {
                case_number: case_number.to_string(),
            },
            other => other,
        })
    }

    async fn load_events(&self, case_number: &str) -> Result<Vec<CaseEvent>, EngineError> {
        self.get_json(self.case_url(case_number, "/events")).await
    }

    async fn load_documents(&self, case_number: &str) -> Result<Vec<Document>, EngineError> {
        self.get_json(self.case_url(case_number, "/documents")).await
    }

    async fn upsert_case(&self, case: &Case, expected_version: u64) -> Result<Case, EngineError> {
        let url = format!(
            "{}?expected_version={}",
            self.case_url(&case.case_number, ""),
            expected_version
        );
        let response = self
            .client
            .put(&url)
            .json(case)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(EngineError::Conflict {
                case_number: case.case_number.clone(),
                expected: expected_version,
            });
        }
        if !response.status().is_success() {
            return Err(EngineError::Collaborator {
                name: "store",
                detail: format!("HTTP {} upserting {}", response.status(), case.case_number),
            });
        }
        response.json::<Case>().await.map_err(Self::unavailable)
    }

    async fn insert_events(&self, events: Vec<CaseEvent>) -> Result<usize, EngineError> {
        #[derive(serde::Deserialize)]
        struct Inserted {
            inserted: usize,
        }
        let url = format!("{}/events", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&events)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(EngineError::Collaborator {
                name: "store",
                detail: format!("HTTP {} inserting events", response.status()),
            });
        }
        let body: Inserted = response.json().await.map_err(Self::unavailable)?;
        Ok(body.inserted)
    }

    async fn insert_document(&self, doc: Document) -> Result<(), EngineError> {
        let url = format!("{}/documents", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&doc)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(EngineError::Collaborator {
                name: "store",
                detail: format!("HTTP {} inserting document", response.status()),
            });
        }
        Ok(())
    }

    async fn update_document(&self, doc: &Document) -> Result<(), EngineError> {
        let url = format!("{}/documents/{}", self.base_url, doc.id);
        let response = self
            .client
            .put(&url)
            .json(doc)
            .send()
            .await
            .map_err(Self::unavailable)?;
        if !response.status().is_success() {
            return Err(EngineError::Collaborator {
                name: "store",
                detail: format!("HTTP {} updating document {}", response.status(), doc.id),
            });
        }
        Ok(())
    }

    async fn list_case_numbers(
        &self,
        classification: Option<Classification>,
    ) -> Result<Vec<String>, EngineError> {
        let url = match classification {
            Some(c) => format!("{}/cases?classification={}", self.base_url, c.as_str()),
            None => format!("{}/cases", self.base_url),
        };
        self.get_json(url).await
    }
}

// =============================================================================
// In-memory implementation, for tests and for anyone brave enough to run
// the engine against /dev/null.
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    cases: HashMap<String, Case>,
    events: Vec<CaseEvent>,
    event_keys: HashSet<String>,
    documents: HashMap<Uuid, Document>,
}

/// Same contract as the HTTP store, no network, no mercy.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test convenience: drop a case in without the versioning ceremony.
    pub fn seed_case(&self, case: Case) {
        self.inner.write().cases.insert(case.case_number.clone(), case);
    }

    pub fn seed_document(&self, doc: Document) {
        self.inner.write().documents.insert(doc.id, doc);
    }
}

impl CaseStore for MemoryStore {
    async fn load_case(&self, case_number: &str) -> Result<Case, EngineError> {
        self.inner
            .read()
            .cases
            .get(case_number)
            .cloned()
            .ok_or_else(|| EngineError::CaseNotFound {
                case_number: case_number.to_string(),
            })
    }

    async fn load_events(&self, case_number: &str) -> Result<Vec<CaseEvent>, EngineError> {
        Ok(self
            .inner
            .read()
            .events
            .iter()
            .filter(|e| e.case_number == case_number)
            .cloned()
            .collect())
    }

    async fn load_documents(&self, case_number: &str) -> Result<Vec<Document>, EngineError> {
        Ok(self
            .inner
            .read()
            .documents
            .values()
            .filter(|d| d.case_number == case_number)
            .cloned()
            .collect())
    }

    async fn upsert_case(&self, case: &Case, expected_version: u64) -> Result<Case, EngineError> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.cases.get(&case.case_number) {
            if existing.version != expected_version {
                return Err(EngineError::Conflict {
                    case_number: case.case_number.clone(),
                    expected: expected_version,
                });
            }
        }
        let mut stored = case.clone();
        stored.version = expected_version + 1;
        inner.cases.insert(stored.case_number.clone(), stored.clone());
        Ok(stored)
    }

    async fn insert_events(&self, events: Vec<CaseEvent>) -> Result<usize, EngineError> {
        let mut inner = self.inner.write();
        let mut inserted = 0;
        for event in events {
            if inner.event_keys.insert(event.dedup_key()) {
                inner.events.push(event);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_document(&self, doc: Document) -> Result<(), EngineError> {
        self.inner.write().documents.insert(doc.id, doc);
        Ok(())
    }

    async fn update_document(&self, doc: &Document) -> Result<(), EngineError> {
        self.inner.write().documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn list_case_numbers(
        &self,
        classification: Option<Classification>,
    ) -> Result<Vec<String>, EngineError> {
        let inner = self.inner.read();
        let mut numbers: Vec<String> = inner
            .cases
            .values()
            .filter(|c| classification.map_or(true, |cl| c.classification == cl))
            .map(|c| c.case_number.clone())
            .collect();
        numbers.sort();
        Ok(numbers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versioned_upsert_detects_conflict() {
        let store = MemoryStore::new();
        let case = Case::new("24SP001234-910");
        let stored = store.upsert_case(&case, 0).await.unwrap();
        assert_eq!(stored.version, 1);

        // A second writer holding the stale version loses the race.
        let err = store.upsert_case(&case, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));

        // And the first writer's row is intact.
        let loaded = store.load_case("24SP001234-910").await.unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_event_insert_suppresses_duplicates() {
        let store = MemoryStore::new();
        let event = CaseEvent {
            id: Uuid::new_v4(),
            case_number: "24SP001234-910".into(),
            event_date: chrono::NaiveDate::from_ymd_opt(2024, 3, 12),
            event_type: "Upset Bid Filed".into(),
            description: "bid of $105,000".into(),
            document_id: None,
            ingest_seq: 0,
        };
        let mut repeat = event.clone();
        repeat.id = Uuid::new_v4();

        assert_eq!(store.insert_events(vec![event]).await.unwrap(), 1);
        assert_eq!(store.insert_events(vec![repeat]).await.unwrap(), 0);
        assert_eq!(store.load_events("24SP001234-910").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_classification() {
        let store = MemoryStore::new();
        let mut a = Case::new("24SP000001-910");
        a.classification = Classification::UpsetBid;
        let mut b = Case::new("24SP000002-910");
        b.classification = Classification::Upcoming;
        store.seed_case(a);
        store.seed_case(b);

        let upset = store
            .list_case_numbers(Some(Classification::UpsetBid))
            .await
            .unwrap();
        assert_eq!(upset, vec!["24SP000001-910".to_string()]);
        assert_eq!(store.list_case_numbers(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reocr_replaces_text_on_same_row() {
        let store = MemoryStore::new();
        let mut doc = Document::new("24SP001234-910", "Upset Bid", "garbage ### ocr");
        let id = doc.id;
        store.seed_document(doc.clone());

        doc.ocr_text = "Minimum Amount Of Next Upset Bid: $99,750.00".into();
        store.update_document(&doc).await.unwrap();

        let docs = store.load_documents("24SP001234-910").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert!(docs[0].ocr_text.contains("99,750.00"));
    }
}
