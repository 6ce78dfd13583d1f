//! Session-layer collaborators: the change observer that accumulates user
//! edits per document, and the completion cache that stores candidate sets
//! with the state needed to rebase them later.

pub mod cache;
pub mod observer;

pub use cache::{CacheKey, CompletionCache};
pub use observer::EditTracker;
