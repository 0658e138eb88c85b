//! `orbit-state`: the only state that outlives a run.
//!
//! Each scheduled invocation is a fresh process, so a mystery case's reveal
//! has to be parked somewhere between runs. The store is a single-row SQLite
//! table holding one optional slot; single-writer semantics are enough because
//! only one run is active at a time.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StateError};
pub use store::{SqliteStateStore, StateStore};
pub use types::DurableState;
