//! Exchange capture subsystem.
//!
//! # Data Flow
//! ```text
//! handler
//!     → CaptureSink::begin (ExchangeId, redacted request summary)
//!     → InFlight (exclusive owner; taps count body bytes)
//!     → finish / drop → sealed ExchangeRecord
//!     → CaptureSink::capture
//!         → structured log event + metrics
//!         → EnrichmentQueue::submit (non-blocking, drop-on-full)
//! ```

mod decode;
pub mod exchange;
pub mod sink;

pub use exchange::{CapturePolicy, ExchangeId, ExchangeRecord, InFlight};
pub use sink::{CaptureOutcome, CaptureSink};
