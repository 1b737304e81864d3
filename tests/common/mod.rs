//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use prowlarr_llm_proxy::capture::ExchangeRecord;
use prowlarr_llm_proxy::enrichment::{EnrichmentError, EnrichmentProvider};
use prowlarr_llm_proxy::lifecycle::StartupError;
use prowlarr_llm_proxy::{ProxyConfig, Shutdown, Startup};

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Upstream that answers every request with a JSON description of it.
///
/// `{"backend", "method", "uri", "headers": {name: value}, "body", "body_len"}`
pub async fn start_echo_backend(name: &'static str) -> SocketAddr {
    start_echo_backend_with_delay(name, Duration::ZERO).await
}

/// Echo backend that waits `delay` before answering.
pub async fn start_echo_backend_with_delay(name: &'static str, delay: Duration) -> SocketAddr {
    let app = Router::new().fallback(move |request: Request<Body>| async move {
        tokio::time::sleep(delay).await;
        Json(echo(name, request).await)
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(name: &str, request: Request<Body>) -> Value {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut headers = Map::new();
    for (key, value) in parts.headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match headers.get_mut(key.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                headers.insert(key.as_str().to_string(), Value::String(value));
            }
        }
    }

    json!({
        "backend": name,
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&bytes),
        "body_len": bytes.len(),
    })
}

/// Upstream that writes `response` verbatim to every connection, then closes.
pub async fn start_raw_backend(response: &'static str) -> SocketAddr {
    start_raw_backend_bytes(response.as_bytes().to_vec()).await
}

/// Like [`start_raw_backend`], for responses that are not UTF-8.
pub async fn start_raw_backend_bytes(response: Vec<u8>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response: Arc<[u8]> = response.into();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// What a [`start_watched_backend`] upstream saw on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// First request bytes arrived.
    Received,
    /// The proxy closed the connection.
    Closed,
}

/// Upstream that never answers and reports when the proxy lets go of it.
pub async fn start_watched_backend() -> (SocketAddr, mpsc::UnboundedReceiver<ConnectionEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, events) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let mut received = false;
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) if !received => {
                            received = true;
                            let _ = events_tx.send(ConnectionEvent::Received);
                        }
                        Ok(_) => {}
                    }
                }
                let _ = events_tx.send(ConnectionEvent::Closed);
            });
        }
    });
    (addr, events)
}

/// Next event from a watched upstream, failing the test after 5s.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("upstream event within 5s")
        .expect("watched upstream still running")
}

/// Upstream that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Send a raw HTTP/1.1 request and read until the server closes.
pub async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response within 5s")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// The JSON object embedded in a raw HTTP response.
pub fn json_body(raw: &str) -> Value {
    let start = raw.find('{').expect("JSON body");
    let end = raw.rfind('}').expect("JSON body");
    serde_json::from_str(&raw[start..=end]).unwrap()
}

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Label(&'static str),
    Fail,
    Hang,
}

/// Enrichment provider that reports every exchange it is asked about.
pub struct RecordingProvider {
    behaviour: Behaviour,
    seen: mpsc::UnboundedSender<ExchangeRecord>,
}

impl RecordingProvider {
    pub fn new(behaviour: Behaviour) -> (Arc<Self>, mpsc::UnboundedReceiver<ExchangeRecord>) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { behaviour, seen }), rx)
    }
}

#[async_trait]
impl EnrichmentProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn annotate(&self, record: &ExchangeRecord) -> Result<String, EnrichmentError> {
        let _ = self.seen.send(record.clone());
        match self.behaviour {
            Behaviour::Label(label) => Ok(label.to_string()),
            Behaviour::Fail => Err(EnrichmentError::Status {
                status: 500,
                body: "provider exploded".into(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".into())
            }
        }
    }
}

/// Test configuration routing each `(listen port, upstream address)` pair.
pub fn config_for(routes: &[(u16, SocketAddr)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.routes = routes
        .iter()
        .map(|(port, upstream)| (port.to_string(), format!("http://{}", upstream)))
        .collect();
    config.timeouts.request_secs = 2.0;
    config.timeouts.shutdown_grace_secs = 5;
    config.enrichment.cache_capacity = 0;
    config
}

/// Turn on enrichment with a dummy credential.
pub fn with_enrichment(mut config: ProxyConfig) -> ProxyConfig {
    config.enrichment.enabled = true;
    config.enrichment.api_key = Some("test-key".into());
    config.enrichment.timeout_secs = 1;
    config
}

pub struct TestProxy {
    /// `(route port, bound address)` reported by the proxy at startup.
    pub addrs: Vec<(u16, SocketAddr)>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

impl TestProxy {
    pub fn url(&self, port: u16, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", port, path)
    }

    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("proxy should stop within 10s")
            .expect("proxy task should not panic")
    }
}

/// Bind every listener and start serving in the background.
pub async fn start_proxy(
    config: ProxyConfig,
    provider: Option<Arc<dyn EnrichmentProvider>>,
) -> TestProxy {
    let mut startup = Startup::new(config);
    if let Some(provider) = provider {
        startup = startup.with_provider(provider);
    }
    let ready = startup.bind().await.expect("proxy should start");
    let addrs = ready.local_addrs();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(ready.serve(shutdown.clone()));
    TestProxy {
        addrs,
        shutdown,
        handle,
    }
}
