//! Core domain types and traits for the postbridge blog data layer.

pub mod document;
pub mod error;
pub mod ids;
pub mod phase;
pub mod post;
pub mod traits;

pub use document::{
    blob_digest, canonical_json, content_digest, document_id, table_name_for, BlobRow, Document,
};
pub use error::{CoreError, CoreResult};
pub use ids::PostId;
pub use phase::{Backend, MigrationPhase, WritePlan};
pub use post::{aggregate_author_stats, sort_posts, AuthorStat, NewPost, Post, SortOrder, DEFAULT_AUTHOR};
pub use traits::{Backends, ColumnStore, DocumentStore, DocumentStream};
