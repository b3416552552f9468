mod trait_store;
mod tree;
mod types;

pub use trait_store::{RunStore, StoreError};
pub use tree::load_tree;
pub use types::{NewEvent, RunEvent, RunTree};
