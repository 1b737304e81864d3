//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Route Table → Capture Sink (+ enrichment worker)
//!     → bind every listener → ready
//!
//! Supervision (supervisor.rs):
//!     One task per listener → first failure triggers shutdown of all
//!
//! Shutdown (shutdown.rs):
//!     Trigger → stop accepting → drain within grace → abort → drain enrichment
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use startup::{Ready, Startup, StartupError};
pub use supervisor::{Supervisor, SupervisorError};
