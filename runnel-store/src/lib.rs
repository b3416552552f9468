#![forbid(unsafe_code)]

//! Persistence for runnel run trees.
//!
//! [`StoreHandler`] records every run transition reported through callbacks
//! into a [`RunStore`]; [`load_tree`] reads a finished tree back.

pub mod handler;
pub mod memory;
pub mod store;

pub use crate::handler::StoreHandler;
pub use crate::memory::MemoryRunStore;
pub use crate::store::{load_tree, NewEvent, RunEvent, RunStore, RunTree, StoreError};
