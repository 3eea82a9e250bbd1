// =============================================================================
// collaborators.rs — THE OUTSIDE WORLD, BEHIND GLASS
// =============================================================================
//
// Two sidecar services do the dirty work this engine refuses to do itself:
//
// - The SCRAPER drives a headless browser through the county portal,
//   solves whatever CAPTCHA the vendor bolted on this quarter, and hands
//   us raw timelines and document bytes. It is slow, rate-limited, and
//   allergic to enthusiasm.
//
// - The OCR service turns PDF bytes into text. Sometimes that text is
//   prose. Sometimes it is modem noise transcribed by a poet. Re-running
//   it on a better day genuinely helps, which is why `reprocess` exists.
//
// Both are consumed through traits so tests can swap in mocks that count
// calls, and both HTTP clients ride behind a circuit breaker plus bounded
// retry-with-backoff, because the alternative is one flaky VPN tunnel
// taking down an entire nightly batch. A request that exhausts its
// retries surfaces as a Collaborator/Timeout error; upstream, the Healer
// reads that as "still missing," shrugs, and moves on with its life.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::errors::EngineError;
use crate::models::RawEvent;

/// Did the scraper accept our refetch request?
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefetchStatus {
    Accepted,
    Rejected,
}

/// The scraping collaborator.
#[allow(async_fn_in_trait)]
pub trait Scraper: Send + Sync {
    async fn fetch_case_timeline(&self, case_number: &str) -> Result<Vec<RawEvent>, EngineError>;
    async fn fetch_document(&self, event_id: Uuid) -> Result<Vec<u8>, EngineError>;
    /// Ask the scraper to queue a fresh pass over a case. Asynchronous on
    /// the far side; "accepted" means queued, not done.
    async fn request_refetch(&self, case_number: &str) -> Result<RefetchStatus, EngineError>;
}

/// The OCR collaborator.
#[allow(async_fn_in_trait)]
pub trait OcrService: Send + Sync {
    async fn extract_text(&self, document_bytes: &[u8]) -> Result<String, EngineError>;
    /// Re-run OCR on a document the service already holds. The new text
    /// replaces the old on the same Document row.
    async fn reprocess(&self, document_id: Uuid) -> Result<String, EngineError>;
}

// =============================================================================
// Bounded retry with backoff — the shared courtesy protocol for talking
// to services that are doing their best.
// =============================================================================

/// Run an async operation up to `max_attempts` times with exponential
/// backoff, consulting the circuit breaker before each attempt. Transient
/// failures get patience; the breaker gets the final word.
pub async fn with_retries<T, F, Fut>(
    name: &'static str,
    breaker: &CircuitBreaker,
    max_attempts: u32,
    base_backoff: Duration,
    op: F,
) -> Result<T, EngineError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut last_err = EngineError::Collaborator {
        name,
        detail: "no attempts made".to_string(),
    };

    for attempt in 0..max_attempts {
        if !breaker.allow_request() {
            return Err(EngineError::Collaborator {
                name,
                detail: format!("circuit breaker {} is open", breaker.name()),
            });
        }

        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(e) => {
                breaker.record_failure();
                if !e.is_transient() {
                    return Err(e);
                }
                let backoff = base_backoff * 2u32.saturating_pow(attempt);
                warn!(
                    collaborator = name,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient collaborator failure — backing off before retry"
                );
                last_err = e;
                tokio::time::sleep(backoff).await;
            }
        }
    }

    Err(last_err)
}

// =============================================================================
// HTTP implementations
// =============================================================================

/// Production scraper client. One circuit breaker guards the whole portal
/// session, because when the VPN goes, everything goes.
#[derive(Clone)]
pub struct HttpScraper {
    base_url: String,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl HttpScraper {
    pub fn new(
        base_url: impl Into<String>,
        client: reqwest::Client,
        breaker: Arc<CircuitBreaker>,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            breaker,
            max_attempts,
            base_backoff,
        }
    }

    fn transient(e: reqwest::Error) -> EngineError {
        EngineError::Collaborator {
            name: "scraper",
            detail: e.to_string(),
        }
    }
}

impl Scraper for HttpScraper {
    async fn fetch_case_timeline(&self, case_number: &str) -> Result<Vec<RawEvent>, EngineError> {
        let url = format!(
            "{}/cases/{}/timeline",
            self.base_url,
            urlencoding::encode(case_number)
        );
        with_retries("scraper", &self.breaker, self.max_attempts, self.base_backoff, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.get(&url).send().await.map_err(Self::transient)?;
                if !response.status().is_success() {
                    return Err(EngineError::Collaborator {
                        name: "scraper",
                        detail: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                response.json::<Vec<RawEvent>>().await.map_err(Self::transient)
            }
        })
        .await
    }

    async fn fetch_document(&self, event_id: Uuid) -> Result<Vec<u8>, EngineError> {
        let url = format!("{}/documents/{}", self.base_url, event_id);
        with_retries("scraper", &self.breaker, self.max_attempts, self.base_backoff, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.get(&url).send().await.map_err(Self::transient)?;
                if !response.status().is_success() {
                    return Err(EngineError::Collaborator {
                        name: "scraper",
                        detail: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                Ok(response.bytes().await.map_err(Self::transient)?.to_vec())
            }
        })
        .await
    }

    async fn request_refetch(&self, case_number: &str) -> Result<RefetchStatus, EngineError> {
        #[derive(serde::Deserialize)]
        struct RefetchResponse {
            status: RefetchStatus,
        }
        let url = format!(
            "{}/refetch/{}",
            self.base_url,
            urlencoding::encode(case_number)
        );
        with_retries("scraper", &self.breaker, self.max_attempts, self.base_backoff, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.post(&url).send().await.map_err(Self::transient)?;
                if !response.status().is_success() {
                    return Err(EngineError::Collaborator {
                        name: "scraper",
                        detail: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                let body: RefetchResponse = response.json().await.map_err(Self::transient)?;
                debug!(status = ?body.status, "Refetch request answered");
                Ok(body.status)
            }
        })
        .await
    }
}

/// Production OCR client.
#[derive(Clone)]
pub struct HttpOcr {
    base_url: String,
    client: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl HttpOcr {
    pub fn new(
        base_url: impl Into<String>,
        client: reqwest::Client,
        breaker: Arc<CircuitBreaker>,
        max_attempts: u32,
        base_backoff: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            breaker,
            max_attempts,
            base_backoff,
        }
    }

    fn transient(e: reqwest::Error) -> EngineError {
        EngineError::Collaborator {
            name: "ocr",
            detail: e.to_string(),
        }
    }
}

impl OcrService for HttpOcr {
    async fn extract_text(&self, document_bytes: &[u8]) -> Result<String, EngineError> {
        let url = format!("{}/extract", self.base_url);
        let bytes = document_bytes.to_vec();
        with_retries("ocr", &self.breaker, self.max_attempts, self.base_backoff, || {
            let client = self.client.clone();
            let url = url.clone();
            let bytes = bytes.clone();
            async move {
                let response = client
                    .post(&url)
                    .body(bytes)
                    .send()
                    .await
                    .map_err(Self::transient)?;
                if !response.status().is_success() {
                    return Err(EngineError::Collaborator {
                        name: "ocr",
                        detail: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                response.text().await.map_err(Self::transient)
            }
        })
        .await
    }

    async fn reprocess(&self, document_id: Uuid) -> Result<String, EngineError> {
        let url = format!("{}/reprocess/{}", self.base_url, document_id);
        with_retries("ocr", &self.breaker, self.max_attempts, self.base_backoff, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.post(&url).send().await.map_err(Self::transient)?;
                if !response.status().is_success() {
                    return Err(EngineError::Collaborator {
                        name: "ocr",
                        detail: format!("HTTP {} from {}", response.status(), url),
                    });
                }
                response.text().await.map_err(Self::transient)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retries_retries_transient_then_succeeds() {
        let breaker = CircuitBreaker::new("test", 10, Duration::from_secs(60), 1);
        let calls = AtomicU32::new(0);

        let result: Result<u32, EngineError> = with_retries(
            "test",
            &breaker,
            3,
            Duration::from_millis(1),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::Collaborator {
                            name: "test",
                            detail: "flaky".into(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_gives_up_after_max_attempts() {
        let breaker = CircuitBreaker::new("test", 10, Duration::from_secs(60), 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), EngineError> = with_retries(
            "test",
            &breaker,
            3,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EngineError::Collaborator {
                        name: "test",
                        detail: "still flaky".into(),
                    })
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_do_not_retry() {
        let breaker = CircuitBreaker::new("test", 10, Duration::from_secs(60), 1);
        let calls = AtomicU32::new(0);

        let result: Result<(), EngineError> = with_retries(
            "test",
            &breaker,
            5,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EngineError::BidDecrease {
                        case_number: "24SP001234-910".into(),
                        prior: 2.0,
                        proposed: 1.0,
                    })
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_blocks_requests() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(600), 1);
        breaker.record_failure(); // Trip it.
        let calls = AtomicU32::new(0);

        let result: Result<(), EngineError> = with_retries(
            "test",
            &breaker,
            3,
            Duration::from_millis(1),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
