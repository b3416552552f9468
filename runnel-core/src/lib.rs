#![forbid(unsafe_code)]

//! Shared building blocks of the runnel engine: the run model, the
//! configuration context, callback dispatch and chunk merging.

pub mod callbacks;
pub mod chunk;
pub mod config;
pub mod error;
pub mod parser;
pub mod run;

pub use crate::callbacks::{CallbackHandler, CallbackManager, RunManager};
pub use crate::chunk::{merge, merge_all, ChunkAccumulator};
pub use crate::config::{ConfigOptions, RunnableConfig, DEFAULT_RECURSION_LIMIT};
pub use crate::error::{
    AggregateError, BoxError, ConfigurationError, ExecutionError, MergeError, ParseError, RunError,
};
pub use crate::parser::{config_from_str, parse_config_str, ConfigFormat, ParsedConfig};
pub use crate::run::{Run, RunStatus};

pub use serde_json::{json, Value};
pub use tokio_util::sync::CancellationToken;
