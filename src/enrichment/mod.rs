//! Optional enrichment of captured exchanges.
//!
//! # Data Flow
//! ```text
//! CaptureSink::capture
//!     → EnrichmentQueue::submit (try_send; full → dropped)
//!     → worker (hook.rs), bounded concurrency
//!     → EnrichmentProvider::annotate (openai.rs), under a deadline
//!     → "Exchange annotated" log line, or failure logged and discarded
//! ```
//!
//! # Design Decisions
//! - Entirely disabled without a provider credential
//! - Nothing here can fail, delay or alter a proxied response

pub mod hook;
pub mod openai;
pub mod provider;

pub use hook::{EnrichmentHook, EnrichmentQueue, Submission};
pub use openai::OpenAiProvider;
pub use provider::{Annotation, EnrichmentError, EnrichmentProvider};
