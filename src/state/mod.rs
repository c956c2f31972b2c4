//! Scoped handler state.
//!
//! Memoized per-scope key-value contexts used to carry data between handler
//! invocations running as independently scheduled tasks.

pub mod store;

pub use store::{ScopeKey, ScopedStateStore, StateContext};
