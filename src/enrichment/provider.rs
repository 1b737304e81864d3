//! Enrichment provider seam.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::{ExchangeId, ExchangeRecord};

/// Ways an enrichment attempt can fail. Never surfaced to proxy callers.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl EnrichmentError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentError::Http(_) => "http",
            EnrichmentError::Status { .. } => "status",
            EnrichmentError::Timeout(_) => "timeout",
            EnrichmentError::Malformed(_) => "malformed",
        }
    }
}

/// Annotation produced for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub exchange_id: ExchangeId,
    pub label: String,
    pub provider_latency: Duration,
}

/// An external model-based annotator.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Produce a one-line label for the exchange. One attempt, no retries.
    async fn annotate(&self, record: &ExchangeRecord) -> Result<String, EnrichmentError>;
}
