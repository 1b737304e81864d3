//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (one per listener)
//!     → server.rs (Axum router per port, health probes, tracing span)
//!     → forwarder.rs (route lookup result → outbound call)
//!         → headers.rs (hop-by-hop filtering, Host rewrite)
//!         → body.rs (byte counting, previews, idle timeout)
//!     → Send to client
//! ```

pub mod body;
pub mod forwarder;
pub mod headers;
pub mod server;

pub use forwarder::Forwarder;
pub use server::{AppState, ProxyServer};
