#![forbid(unsafe_code)]

//! Composable runnables over JSON values.
//!
//! Everything here is built on the [`Runnable`] trait; the run model, config
//! context and callback contract live in `runnel-core`.

pub mod callbacks;
pub mod events;
pub mod executor;
pub mod fallback;
pub mod retry;
pub mod runnable;
pub mod timeout;

pub use crate::callbacks::{LoggingHandler, MetricsCollector, MetricsHandler, RunCollector, RunMetrics};
pub use crate::events::{EventData, EventFilter, EventKind, EventStream, EventStreamHandler, StreamEvent};
pub use crate::executor::{BatchOptions, Branch, ConcurrencyLimit, Each, Parallel, Sequence};
pub use crate::fallback::Fallback;
pub use crate::retry::{decide_retry, Retry, RetryConfig, RetryDecision, RetryReason};
pub use crate::runnable::{
    Assign, Bound, ChunkStream, DynRunnable, Lambda, Passthrough, Pick, RunListeners, RunScope,
    Runnable, RunnableExt, WithListeners,
};
pub use crate::timeout::Timeout;

pub use runnel_core;
