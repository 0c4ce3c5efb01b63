//! Backend clients for the postbridge data layer.
//!
//! The in-memory stores are always compiled; the MongoDB and Cassandra
//! drivers sit behind the `mongodb` and `cassandra` features.

#[cfg(feature = "cassandra")]
pub mod cassandra;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

#[cfg(feature = "cassandra")]
pub use cassandra::{CassandraColumnStore, CassandraSettings};
pub use memory::{MemoryColumnStore, MemoryDocumentStore};
#[cfg(feature = "mongodb")]
pub use mongo::{MongoDocumentStore, MongoSettings};
