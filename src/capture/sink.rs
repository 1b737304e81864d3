//! Capture sink.
//!
//! # Responsibilities
//! - Log every sealed exchange (synchronous, best-effort)
//! - Record exchange metrics
//! - Hand the exchange to the enrichment queue without waiting
//!
//! # Design Decisions
//! - `capture` never awaits: the caller already has its response
//! - Enrichment handoff is drop-on-full; logging happens regardless

use std::sync::Arc;

use axum::http::Request;

use crate::capture::exchange::{CapturePolicy, ExchangeRecord, InFlight};
use crate::enrichment::{EnrichmentQueue, Submission};
use crate::observability::metrics;

/// What happened to a captured exchange after logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Logged; enrichment disabled or not applicable to this path.
    Logged,
    /// Logged and queued for enrichment.
    Queued,
    /// Logged; enrichment queue was full or closed so the record was dropped for enrichment.
    EnrichmentDropped,
}

/// Cheap to clone; one per listener plus one per in-flight exchange.
#[derive(Clone)]
pub struct CaptureSink {
    policy: Arc<CapturePolicy>,
    enrichment: Option<EnrichmentQueue>,
}

impl CaptureSink {
    pub fn new(policy: CapturePolicy, enrichment: Option<EnrichmentQueue>) -> Self {
        Self {
            policy: Arc::new(policy),
            enrichment,
        }
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// Open a record for an inbound request.
    pub fn begin<B>(&self, request: &Request<B>, listen_port: u16, upstream: &str) -> InFlight {
        InFlight::begin(request, listen_port, upstream, self.clone())
    }

    /// Log the exchange and offer it to the enrichment queue.
    pub fn capture(&self, record: ExchangeRecord) -> CaptureOutcome {
        log_exchange(&record);
        metrics::record_exchange(
            record.listen_port,
            &record.method,
            record.response_status,
            record.duration,
        );

        let Some(queue) = &self.enrichment else {
            return CaptureOutcome::Logged;
        };

        let id = record.id.clone();
        match queue.submit(record) {
            Submission::Queued => CaptureOutcome::Queued,
            Submission::Filtered => CaptureOutcome::Logged,
            Submission::Full => {
                tracing::warn!(exchange_id = %id, "Enrichment queue full, skipping enrichment");
                metrics::record_enrichment("dropped");
                CaptureOutcome::EnrichmentDropped
            }
            Submission::Closed => {
                tracing::debug!(exchange_id = %id, "Enrichment worker stopped, skipping enrichment");
                CaptureOutcome::EnrichmentDropped
            }
        }
    }

    /// A sink whose enrichment queue is read directly by the test.
    #[cfg(test)]
    pub(crate) fn recording(
        policy: CapturePolicy,
        capacity: usize,
    ) -> (Self, tokio::sync::mpsc::Receiver<Arc<ExchangeRecord>>) {
        let (queue, rx) = EnrichmentQueue::new(capacity, Vec::new());
        (Self::new(policy, Some(queue)), rx)
    }
}

fn log_exchange(record: &ExchangeRecord) {
    let duration_ms = record.duration.as_secs_f64() * 1000.0;
    match &record.error {
        None => tracing::info!(
            exchange_id = %record.id,
            method = %record.method,
            path = %record.path,
            query = record.query.as_deref(),
            listen_port = record.listen_port,
            upstream = %record.upstream,
            response_status = record.response_status,
            duration_ms,
            request_bytes = record.request_body_size,
            response_bytes = record.response_body_size,
            "Exchange completed"
        ),
        Some(error) => tracing::warn!(
            exchange_id = %record.id,
            method = %record.method,
            path = %record.path,
            query = record.query.as_deref(),
            listen_port = record.listen_port,
            upstream = %record.upstream,
            response_status = record.response_status,
            duration_ms,
            request_bytes = record.request_body_size,
            response_bytes = record.response_body_size,
            error = %error,
            "Exchange failed"
        ),
    }

    tracing::debug!(
        exchange_id = %record.id,
        started_at_ms = record.started_at_unix_ms() as u64,
        request_headers = ?record.request_headers,
        request_body = record.request_body_preview.as_deref(),
        response_headers = ?record.response_headers,
        response_body = record.response_body_preview.as_deref(),
        "Exchange detail"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    use crate::capture::exchange::ExchangeId;

    fn record(path: &str) -> ExchangeRecord {
        ExchangeRecord {
            id: ExchangeId::from_headers(&Default::default()),
            method: "GET".into(),
            path: path.into(),
            query: None,
            listen_port: 8585,
            upstream: "http://sonarr:8989".into(),
            request_headers: Vec::new(),
            request_body_size: 0,
            request_body_preview: None,
            response_status: Some(200),
            response_headers: Vec::new(),
            response_body_size: 2,
            response_body_preview: Some("{}".into()),
            started_at: SystemTime::now(),
            duration: Duration::from_millis(3),
            error: None,
        }
    }

    #[test]
    fn logs_only_without_enrichment() {
        let sink = CaptureSink::new(CapturePolicy::default(), None);
        assert_eq!(sink.capture(record("/api")), CaptureOutcome::Logged);
    }

    #[test]
    fn drops_for_enrichment_when_queue_is_full() {
        let (sink, _rx) = CaptureSink::recording(CapturePolicy::default(), 1);

        assert_eq!(sink.capture(record("/a")), CaptureOutcome::Queued);
        assert_eq!(sink.capture(record("/b")), CaptureOutcome::EnrichmentDropped);
    }

    #[test]
    fn closed_queue_never_blocks() {
        let (sink, rx) = CaptureSink::recording(CapturePolicy::default(), 8);
        drop(rx);
        assert_eq!(sink.capture(record("/a")), CaptureOutcome::EnrichmentDropped);
    }

    #[test]
    fn path_filter_skips_enrichment() {
        let (queue, mut rx) = EnrichmentQueue::new(8, vec!["/api/v1/search".into()]);
        let sink = CaptureSink::new(CapturePolicy::default(), Some(queue));

        assert_eq!(sink.capture(record("/api/v3/series")), CaptureOutcome::Logged);
        assert_eq!(sink.capture(record("/api/v1/search")), CaptureOutcome::Queued);
        assert_eq!(rx.try_recv().unwrap().path, "/api/v1/search");
    }
}
