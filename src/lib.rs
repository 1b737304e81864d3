//! Transparent multi-port HTTP reverse proxy with exchange capture and
//! optional LLM enrichment.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────┐
//!   caller :8585 ───▶│ listener ─▶ router(8585) ─▶ ┐                     │
//!   caller :8586 ───▶│ listener ─▶ router(8586) ─▶ ├─▶ RouteTable        │
//!                    │   (health probes answered   │    ─▶ Forwarder ────┼──▶ upstream
//!                    │    locally per listener)    ┘         │           │
//!                    │                                       ▼           │
//!                    │                         InFlight ─▶ CaptureSink   │
//!                    │                                     │  log line   │
//!                    │                                     ▼             │
//!                    │                   EnrichmentQueue (drop on full)  │
//!                    │                                     ▼             │
//!                    │                     EnrichmentHook ─▶ provider ───┼──▶ LLM API
//!                    └───────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Exchange side channel
pub mod capture;
pub mod enrichment;

// Cross-cutting concerns
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::ProxyServer;
pub use lifecycle::{Ready, Shutdown, Startup};
