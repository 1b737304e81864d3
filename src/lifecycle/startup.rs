//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the Route Table from validated configuration
//! - Start the enrichment worker when a credential is configured
//! - Bind every listener and only then report readiness
//! - Serve until shutdown, then drain enrichment
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::capture::{CapturePolicy, CaptureSink};
use crate::config::ProxyConfig;
use crate::enrichment::{EnrichmentError, EnrichmentHook, EnrichmentProvider, OpenAiProvider};
use crate::http::ProxyServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::supervisor::{Supervisor, SupervisorError};
use crate::net::{ListenerError, ListenerSet};
use crate::routing::{RouteError, RouteTable};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid route table: {0}")]
    Routes(#[from] RouteError),

    #[error("invalid bind host '{0}'")]
    BindHost(String),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("enrichment provider: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Everything needed to bring the proxy up.
pub struct Startup {
    config: ProxyConfig,
    provider: Option<Arc<dyn EnrichmentProvider>>,
}

impl Startup {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Use `provider` instead of the OpenAI-compatible client. Still only
    /// used when enrichment is enabled with a credential.
    pub fn with_provider(mut self, provider: Arc<dyn EnrichmentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Build every subsystem and bind every listener.
    pub async fn bind(self) -> Result<Ready, StartupError> {
        let config = self.config;

        if !config.routes.is_empty() && config.upstream_url != ProxyConfig::default().upstream_url {
            tracing::warn!(
                upstream_url = %config.upstream_url,
                "Both routes and upstream_url are set; routes take precedence"
            );
        }

        let routes = Arc::new(RouteTable::new(config.route_entries())?);
        let host: IpAddr = config
            .listener
            .bind_host
            .parse()
            .map_err(|_| StartupError::BindHost(config.listener.bind_host.clone()))?;

        let (queue, enrichment) = match config.enrichment.credential() {
            Some(api_key) if config.enrichment.enabled => {
                let provider: Arc<dyn EnrichmentProvider> = match self.provider {
                    Some(provider) => provider,
                    None => Arc::new(OpenAiProvider::new(&config.enrichment, api_key)?),
                };
                let (queue, worker) =
                    EnrichmentHook::new(provider, &config.enrichment).spawn(&config.enrichment);
                (Some(queue), Some(worker))
            }
            _ => {
                tracing::info!("Enrichment disabled");
                (None, None)
            }
        };

        let policy = CapturePolicy::new(
            config.capture.body_preview_bytes,
            &config.capture.redact_headers,
            &config.capture.redact_query_params,
        );
        let sink = CaptureSink::new(policy, queue);
        let server = ProxyServer::new(&config, routes.clone(), sink);

        let listeners = match ListenerSet::bind(host, routes.ports()).await {
            Ok(listeners) => listeners,
            Err(e) => {
                // Dropping the server closes the queue so the worker exits.
                drop(server);
                if let Some(worker) = enrichment {
                    worker.abort();
                }
                return Err(e.into());
            }
        };

        for route in routes.iter() {
            tracing::info!(
                listen_port = route.listen_port,
                upstream = %route.upstream.base(),
                "Route configured"
            );
        }
        tracing::info!(
            app_name = %config.app_name,
            listeners = listeners.len(),
            request_timeout_secs = config.timeouts.request_secs,
            "Proxy ready"
        );

        Ok(Ready {
            server,
            listeners,
            enrichment,
            grace: config.timeouts.shutdown_grace(),
        })
    }
}

/// A proxy with every listener bound, not yet serving.
pub struct Ready {
    server: ProxyServer,
    listeners: ListenerSet,
    enrichment: Option<JoinHandle<()>>,
    grace: Duration,
}

impl Ready {
    /// `(route port, bound address)` for every listener.
    pub fn local_addrs(&self) -> Vec<(u16, SocketAddr)> {
        self.listeners.local_addrs()
    }

    /// Serve until `shutdown` triggers (or a signal arrives, or a listener
    /// fails), then drain listeners and the enrichment worker.
    pub async fn serve(self, shutdown: Shutdown) -> Result<(), StartupError> {
        let Ready {
            server,
            listeners,
            enrichment,
            grace,
        } = self;

        let signals = spawn_signal_handler(shutdown.clone());
        let mut supervisor = Supervisor::new(shutdown.clone(), grace);
        server.spawn_listeners(listeners, &mut supervisor);
        drop(server);

        let result = supervisor.wait().await;
        signals.abort();

        if let Some(mut worker) = enrichment {
            if tokio::time::timeout(grace, &mut worker).await.is_err() {
                tracing::warn!("Enrichment worker did not drain in time, aborting");
                worker.abort();
            }
        }

        result?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
