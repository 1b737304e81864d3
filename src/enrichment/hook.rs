//! Enrichment queue and worker.
//!
//! # Responsibilities
//! - Accept sealed exchanges through a bounded, non-blocking queue
//! - Annotate them off the request path with bounded concurrency
//! - Log annotations; log and discard failures
//!
//! # Design Decisions
//! - `try_send` only: a full queue drops the record (lossy under load),
//!   it never pushes back on the proxy path
//! - One provider attempt per exchange, each under a deadline
//! - Small annotation cache keyed by everything the provider is shown
//!   (method, path, redacted query, status, sizes, previews, error)

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::capture::ExchangeRecord;
use crate::config::EnrichmentConfig;
use crate::enrichment::provider::{Annotation, EnrichmentError, EnrichmentProvider};
use crate::observability::metrics;

/// Result of offering a record to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// Path not eligible for enrichment.
    Filtered,
    /// Queue at capacity; record dropped.
    Full,
    /// Worker gone; record dropped.
    Closed,
}

/// Producer side of the enrichment handoff.
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::Sender<Arc<ExchangeRecord>>,
    path_prefixes: Arc<[String]>,
}

impl EnrichmentQueue {
    pub fn new(
        capacity: usize,
        path_prefixes: Vec<String>,
    ) -> (Self, mpsc::Receiver<Arc<ExchangeRecord>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                path_prefixes: path_prefixes.into(),
            },
            rx,
        )
    }

    fn accepts(&self, record: &ExchangeRecord) -> bool {
        self.path_prefixes.is_empty()
            || self
                .path_prefixes
                .iter()
                .any(|prefix| record.path.starts_with(prefix.as_str()))
    }

    /// Offer a record without waiting.
    pub fn submit(&self, record: ExchangeRecord) -> Submission {
        if !self.accepts(&record) {
            return Submission::Filtered;
        }
        match self.tx.try_send(Arc::new(record)) {
            Ok(()) => Submission::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Submission::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Submission::Closed,
        }
    }
}

/// Annotates exchanges through a provider, one attempt each.
#[derive(Clone)]
pub struct EnrichmentHook {
    provider: Arc<dyn EnrichmentProvider>,
    timeout: Duration,
    cache: Arc<DashMap<u64, String>>,
    cache_capacity: usize,
}

impl EnrichmentHook {
    pub fn new(provider: Arc<dyn EnrichmentProvider>, config: &EnrichmentConfig) -> Self {
        Self {
            provider,
            timeout: config.timeout(),
            cache: Arc::new(DashMap::new()),
            cache_capacity: config.cache_capacity,
        }
    }

    /// Start the worker. It runs until every queue handle is dropped, then
    /// finishes the annotations already in flight.
    pub fn spawn(
        self,
        config: &EnrichmentConfig,
    ) -> (EnrichmentQueue, JoinHandle<()>) {
        let (queue, rx) = EnrichmentQueue::new(config.queue_capacity, config.path_prefixes.clone());
        let limit = Arc::new(Semaphore::new(config.max_concurrency));

        tracing::info!(
            provider = %self.provider.name(),
            queue_capacity = config.queue_capacity,
            max_concurrency = config.max_concurrency,
            "Enrichment hook enabled"
        );

        let handle = tokio::spawn(self.run(rx, limit));
        (queue, handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<Arc<ExchangeRecord>>, limit: Arc<Semaphore>) {
        let mut in_flight = JoinSet::new();

        while let Some(record) = rx.recv().await {
            let Ok(permit) = limit.clone().acquire_owned().await else {
                break;
            };
            let hook = self.clone();
            in_flight.spawn(async move {
                hook.enrich(&record).await;
                drop(permit);
            });

            // Reap finished tasks so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        tracing::debug!("Enrichment worker stopped");
    }

    async fn enrich(&self, record: &ExchangeRecord) {
        match self.annotate(record).await {
            Ok(annotation) => {
                metrics::record_enrichment("annotated");
                tracing::info!(
                    exchange_id = %annotation.exchange_id,
                    label = %annotation.label,
                    provider_latency_ms = annotation.provider_latency.as_millis() as u64,
                    "Exchange annotated"
                );
            }
            Err(e) => {
                metrics::record_enrichment(e.kind());
                tracing::warn!(
                    exchange_id = %record.id,
                    error = %e,
                    "Enrichment failed, annotation discarded"
                );
            }
        }
    }

    /// One annotation attempt under the provider deadline.
    pub async fn annotate(&self, record: &ExchangeRecord) -> Result<Annotation, EnrichmentError> {
        let key = cache_key(record);
        if let Some(label) = self.cache.get(&key) {
            return Ok(Annotation {
                exchange_id: record.id.clone(),
                label: label.clone(),
                provider_latency: Duration::ZERO,
            });
        }

        let started = Instant::now();
        let label = tokio::time::timeout(self.timeout, self.provider.annotate(record))
            .await
            .map_err(|_| EnrichmentError::Timeout(self.timeout))??;

        let label = label.trim().to_string();
        if label.is_empty() {
            return Err(EnrichmentError::Malformed("empty annotation".to_string()));
        }

        if self.cache_capacity > 0 {
            if self.cache.len() >= self.cache_capacity {
                self.cache.clear();
            }
            self.cache.insert(key, label.clone());
        }

        Ok(Annotation {
            exchange_id: record.id.clone(),
            label,
            provider_latency: started.elapsed(),
        })
    }
}

/// Two exchanges share a key only when the provider would see the same input.
fn cache_key(record: &ExchangeRecord) -> u64 {
    let mut hasher = DefaultHasher::new();
    (
        &record.method,
        &record.path,
        &record.query,
        record.response_status,
        &record.error,
        record.request_body_size,
        &record.request_body_preview,
        record.response_body_size,
        &record.response_body_preview,
    )
        .hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    use async_trait::async_trait;

    use crate::capture::ExchangeId;

    enum Behaviour {
        Label(&'static str),
        Blank,
        Hang,
    }

    struct FakeProvider {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EnrichmentProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn annotate(&self, _record: &ExchangeRecord) -> Result<String, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Label(label) => Ok(label.to_string()),
                Behaviour::Blank => Ok("  ".to_string()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("late".to_string())
                }
            }
        }
    }

    fn config() -> EnrichmentConfig {
        EnrichmentConfig {
            enabled: true,
            api_key: Some("test".into()),
            timeout_secs: 1,
            ..EnrichmentConfig::default()
        }
    }

    fn record(path: &str) -> ExchangeRecord {
        ExchangeRecord {
            id: ExchangeId::from_headers(&Default::default()),
            method: "GET".into(),
            path: path.into(),
            query: None,
            listen_port: 8586,
            upstream: "http://prowlarr:9696".into(),
            request_headers: Vec::new(),
            request_body_size: 0,
            request_body_preview: None,
            response_status: Some(200),
            response_headers: Vec::new(),
            response_body_size: 0,
            response_body_preview: None,
            started_at: SystemTime::now(),
            duration: Duration::from_millis(1),
            error: None,
        }
    }

    #[tokio::test]
    async fn annotates_and_caches() {
        let provider = FakeProvider::new(Behaviour::Label("indexer search"));
        let hook = EnrichmentHook::new(provider.clone(), &config());

        let first = hook.annotate(&record("/api/v1/search")).await.unwrap();
        let second = hook.annotate(&record("/api/v1/search")).await.unwrap();

        assert_eq!(first.label, "indexer search");
        assert_eq!(second.label, "indexer search");
        assert_eq!(second.provider_latency, Duration::ZERO);
        assert_ne!(first.exchange_id, second.exchange_id);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_searches_on_one_path_are_annotated_separately() {
        let provider = FakeProvider::new(Behaviour::Label("indexer search"));
        let hook = EnrichmentHook::new(provider.clone(), &config());

        let mut dune = record("/api/v1/search");
        dune.query = Some("query=dune".into());
        let mut foundation = record("/api/v1/search");
        foundation.query = Some("query=foundation".into());

        hook.annotate(&dune).await.unwrap();
        hook.annotate(&foundation).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);

        let mut other_results = foundation.clone();
        other_results.response_body_preview = Some(r#"[{"title":"Foundation.S01"}]"#.into());
        hook.annotate(&other_results).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

        let mut repeat = foundation.clone();
        repeat.id = ExchangeId::from_headers(&Default::default());
        hook.annotate(&repeat).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_timeout_is_reported() {
        let hook = EnrichmentHook::new(FakeProvider::new(Behaviour::Hang), &config());
        let err = hook.annotate(&record("/api")).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Timeout(_)));
    }

    #[tokio::test]
    async fn blank_annotation_is_malformed() {
        let hook = EnrichmentHook::new(FakeProvider::new(Behaviour::Blank), &config());
        let err = hook.annotate(&record("/api")).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Malformed(_)));
    }

    #[tokio::test]
    async fn worker_drains_and_stops_when_queue_dropped() {
        let provider = FakeProvider::new(Behaviour::Label("ok"));
        let mut config = config();
        config.cache_capacity = 0;
        let (queue, handle) = EnrichmentHook::new(provider.clone(), &config).spawn(&config);

        assert_eq!(queue.submit(record("/a")), Submission::Queued);
        assert_eq!(queue.submit(record("/b")), Submission::Queued);
        drop(queue);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker should stop")
            .unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
