//! Listener Set binding.
//!
//! # Responsibilities
//! - Bind one TCP socket per configured listen port
//! - Fail the whole set on the first bind error
//! - Report the bound addresses (ephemeral ports resolve here)

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
        }
    }
}

/// A bound socket and the route port it serves.
///
/// `port` is the configured listen port used for route lookup; it differs
/// from `local_addr().port()` only when port 0 was requested.
#[derive(Debug)]
pub struct PortListener {
    port: u16,
    inner: TcpListener,
}

impl PortListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}

/// Every listener of the process, all bound.
#[derive(Debug)]
pub struct ListenerSet {
    listeners: Vec<PortListener>,
}

impl ListenerSet {
    /// Bind `host:port` for each port, in order. On error, sockets already
    /// bound are dropped (closed) before returning.
    pub async fn bind<I>(host: IpAddr, ports: I) -> Result<Self, ListenerError>
    where
        I: IntoIterator<Item = u16>,
    {
        let mut listeners = Vec::new();
        for port in ports {
            let addr = SocketAddr::new(host, port);
            let inner = TcpListener::bind(addr)
                .await
                .map_err(|source| ListenerError::Bind { addr, source })?;

            tracing::debug!(address = %addr, "Listener bound");
            listeners.push(PortListener { port, inner });
        }
        Ok(Self { listeners })
    }

    /// `(route port, bound address)` pairs.
    pub fn local_addrs(&self) -> Vec<(u16, SocketAddr)> {
        self.listeners
            .iter()
            .filter_map(|l| l.local_addr().ok().map(|addr| (l.port, addr)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl IntoIterator for ListenerSet {
    type Item = PortListener;
    type IntoIter = std::vec::IntoIter<PortListener>;

    fn into_iter(self) -> Self::IntoIter {
        self.listeners.into_iter()
    }
}
