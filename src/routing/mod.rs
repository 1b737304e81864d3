//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route entries (port -> upstream base URL)
//!     → table.rs (parse, reject duplicates/malformed URLs)
//!     → Freeze as immutable RouteTable
//!
//! Per request:
//!     listener port → RouteTable::resolve → Route (or UnknownPort)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - One upstream per port: no path routing, no load balancing
//! - Deterministic: same port always resolves to the same upstream

pub mod table;

pub use table::{parse_port, Route, RouteError, RouteTable, Upstream};
