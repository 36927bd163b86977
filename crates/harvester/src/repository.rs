//! Storage operations for harvested repositories.
//!
//! Writes go through [`bulk_upsert`], keyed by upstream id, so replaying the
//! same batch is harmless. Reads serve the summary report and the export.

mod bulk;
mod errors;
mod query;

pub use bulk::{DEFAULT_CHUNK_SIZE, bulk_upsert, bulk_upsert_with_retry, default_write_retry};
pub use errors::{RepositoryError, Result};
pub use query::{
    PaginatedResult, Pagination, count, find_all, find_by_id, list_all, top_by_stars,
};
