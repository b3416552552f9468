pub mod batch;
pub mod branch;
pub mod concurrency;
pub mod each;
pub mod parallel;
pub mod sequence;

pub use batch::BatchOptions;
pub use branch::Branch;
pub use concurrency::{ConcurrencyLimit, ConcurrencyPermit};
pub use each::Each;
pub use parallel::Parallel;
pub use sequence::Sequence;
