//! Byte-counting body wrapper.
//!
//! # Responsibilities
//! - Forward frames unchanged while counting data bytes
//! - Keep a bounded preview of the leading bytes for capture
//! - Enforce an idle gap limit between chunks (response direction)
//! - Report how the stream ended exactly once (completed, failed, timed out, dropped)
//!
//! # Design Decisions
//! - Frames are inspected by reference, never copied or buffered
//! - Counters live behind an `Arc` so the exchange owner can read them while
//!   hyper owns the body

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::time::{sleep, Instant, Sleep};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared counters for one body direction.
#[derive(Debug)]
pub struct BodyTap {
    bytes: AtomicU64,
    preview: Mutex<Vec<u8>>,
    preview_limit: usize,
}

impl BodyTap {
    pub fn new(preview_limit: usize) -> Self {
        Self {
            bytes: AtomicU64::new(0),
            preview: Mutex::new(Vec::new()),
            preview_limit,
        }
    }

    /// Account for one data chunk.
    pub fn observe(&self, chunk: &[u8]) {
        let before = self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        if (before as usize) < self.preview_limit {
            if let Ok(mut preview) = self.preview.lock() {
                let room = self.preview_limit.saturating_sub(preview.len());
                preview.extend_from_slice(&chunk[..room.min(chunk.len())]);
            }
        }
    }

    /// Data bytes seen so far.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Leading bytes exactly as they crossed the proxy.
    pub fn raw_preview(&self) -> Vec<u8> {
        self.preview
            .lock()
            .map(|preview| preview.clone())
            .unwrap_or_default()
    }

    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    /// Leading bytes as lossy UTF-8, or `None` if nothing was kept.
    pub fn preview(&self) -> Option<String> {
        let preview = self.preview.lock().ok()?;
        if preview.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&preview).into_owned())
        }
    }
}

/// How a wrapped body stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    /// All frames were delivered.
    Completed,
    /// The inner body produced an error.
    Failed(String),
    /// No chunk arrived within the idle limit.
    TimedOut(Duration),
    /// The body was dropped before reaching its end (caller went away).
    Aborted,
}

pub type CompletionHook = Box<dyn FnOnce(BodyOutcome) + Send>;

/// Fires the completion hook at most once, falling back to drop time.
struct Completion {
    hook: Option<CompletionHook>,
    ended: bool,
}

impl Completion {
    fn fire(&mut self, outcome: BodyOutcome) {
        if let Some(hook) = self.hook.take() {
            hook(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let outcome = if self.ended {
            BodyOutcome::Completed
        } else {
            BodyOutcome::Aborted
        };
        self.fire(outcome);
    }
}

struct IdleLimit {
    limit: Duration,
    timer: Pin<Box<Sleep>>,
}

/// Pass-through body that feeds a [`BodyTap`].
pub struct CountingBody<B> {
    inner: B,
    tap: Arc<BodyTap>,
    idle: Option<IdleLimit>,
    completion: Completion,
}

impl<B: Body> CountingBody<B> {
    pub fn new(inner: B, tap: Arc<BodyTap>) -> Self {
        let ended = inner.is_end_stream();
        Self {
            inner,
            tap,
            idle: None,
            completion: Completion { hook: None, ended },
        }
    }

    /// Fail the stream if no frame arrives for `limit`.
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle = Some(IdleLimit {
            limit,
            timer: Box::pin(sleep(limit)),
        });
        self
    }

    /// Run `hook` once when the stream ends or the body is dropped.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(BodyOutcome) + Send + 'static,
    {
        self.completion.hook = Some(Box::new(hook));
        self
    }
}

impl<B> Body for CountingBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.tap.observe(data);
                }
                if let Some(idle) = this.idle.as_mut() {
                    idle.timer.as_mut().reset(Instant::now() + idle.limit);
                }
                this.completion.ended = this.inner.is_end_stream();
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                let err: BoxError = e.into();
                this.completion.fire(BodyOutcome::Failed(err.to_string()));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.completion.ended = true;
                this.completion.fire(BodyOutcome::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => {
                if let Some(idle) = this.idle.as_mut() {
                    if idle.timer.as_mut().poll(cx).is_ready() {
                        let limit = idle.limit;
                        this.completion.fire(BodyOutcome::TimedOut(limit));
                        return Poll::Ready(Some(Err(Box::new(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("no body data from upstream within {:?}", limit),
                        )))));
                    }
                }
                Poll::Pending
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
