//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Route Table ports
//!     → listener.rs (bind every port up front, fail fast)
//!     → ListenerSet handed to the HTTP server, one serve loop per port
//! ```
//!
//! # Design Decisions
//! - Binding is separate from serving so readiness means "all ports bound"
//! - A bind failure releases every socket bound before it

pub mod listener;

pub use listener::{ListenerError, ListenerSet, PortListener};
