//! In-memory stores for tests and local mode.

mod column;
mod document;
mod fault;

pub use column::MemoryColumnStore;
pub use document::MemoryDocumentStore;
pub use fault::{CallHistoryEntry, FaultInjector, MockFailure};
