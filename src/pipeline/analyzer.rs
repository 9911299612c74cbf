//! Analysis retry engine.
//!
//! Wraps the summarization collaborator with bounded exponential
//! backoff. A response that was received, however malformed, goes
//! through repair and never fails the job; only exhausting the call
//! attempts themselves is fatal.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::{AnalysisRequest, Summarizer};
use crate::domain::Analysis;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Retry wrapper around a summarizer
pub struct AnalysisEngine {
    summarizer: Arc<dyn Summarizer>,

    /// Maximum attempts, including the first
    max_attempts: u32,

    /// Delay before retry n is `base_delay * 2^(n-1)`
    base_delay: Duration,
}

impl AnalysisEngine {
    pub fn new(summarizer: Arc<dyn Summarizer>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            summarizer,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Call the summarizer, retrying on failure, and repair the response
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, AnalysisError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            tracing::debug!(
                title = %request.title,
                attempt,
                max_attempts = self.max_attempts,
                "Sending analysis request"
            );

            match self.summarizer.summarize(request).await {
                Ok(raw) => {
                    tracing::info!(title = %request.title, "Analysis complete");
                    return Ok(Analysis::repair(&raw, &request.title));
                }
                Err(e) => {
                    last_error = e.to_string();

                    if attempt < self.max_attempts {
                        let delay = self.base_delay * 2u32.pow(attempt - 1);
                        tracing::warn!(
                            title = %request.title,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "Analysis attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(
                            title = %request.title,
                            attempts = self.max_attempts,
                            error = %last_error,
                            "All analysis attempts failed"
                        );
                    }
                }
            }
        }

        Err(AnalysisError::Exhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SummarizeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySummarizer {
        calls: AtomicU32,
        fail_first: u32,
        response: String,
    }

    #[async_trait]
    impl Summarizer for FlakySummarizer {
        async fn summarize(&self, _request: &AnalysisRequest) -> Result<String, SummarizeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(SummarizeError::Api("transient".to_string()))
            } else {
                Ok(self.response.clone())
            }
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            transcript: "text".to_string(),
            title: "Original Title".to_string(),
            channel: "C".to_string(),
            duration_secs: 10,
            allowed_tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let summarizer = Arc::new(FlakySummarizer {
            calls: AtomicU32::new(0),
            fail_first: 2,
            response: r#"{"title": "Recovered", "summary": "S"}"#.to_string(),
        });
        let engine = AnalysisEngine::new(summarizer.clone(), 3, Duration::from_millis(1));

        let analysis = engine.analyze(&request()).await.unwrap();

        assert_eq!(analysis.title, "Recovered");
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_is_an_error() {
        let summarizer = Arc::new(FlakySummarizer {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            response: String::new(),
        });
        let engine = AnalysisEngine::new(summarizer.clone(), 3, Duration::from_millis(1));

        let err = engine.analyze(&request()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Exhausted { attempts: 3, .. }));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_response_is_repaired_not_retried() {
        let summarizer = Arc::new(FlakySummarizer {
            calls: AtomicU32::new(0),
            fail_first: 0,
            response: "not json at all".to_string(),
        });
        let engine = AnalysisEngine::new(summarizer.clone(), 3, Duration::from_millis(1));

        let analysis = engine.analyze(&request()).await.unwrap();

        // Repaired to fallback, with only one call made
        assert_eq!(analysis.title, "Original Title");
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }
}
