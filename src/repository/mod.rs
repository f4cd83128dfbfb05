//! Repository layer for database persistence.
//!
//! Database access uses Diesel ORM with compile-time query checking over
//! SQLite. Blocking diesel calls run inside `spawn_blocking` so the async
//! workers never stall the runtime.

mod models;
mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{DailyAccess, Document};

pub use sqlite::SqliteStore;

/// Persistence interface consumed by the pipeline and the batch ingestor.
///
/// All writes are last-write-wins; the pipeline coordinates through these
/// semantics rather than cross-stage transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up a document by its identity key.
    async fn get_document(&self, id: i32) -> anyhow::Result<Option<Document>>;

    /// Overwrite a document's summary unconditionally. Returns false when
    /// the document does not exist.
    async fn update_summary(&self, id: i32, summary: &str) -> anyhow::Result<bool>;

    /// Fetch the access-count row for one `(document, date)` key.
    async fn get_daily_access(
        &self,
        document_id: i32,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyAccess>>;

    /// Idempotent upsert keyed by `(document_id, date)`: the count is
    /// overwritten, never summed.
    async fn upsert_daily_access(&self, entry: DailyAccess) -> anyhow::Result<()>;

    /// Insert a new document (used by bootstrap and tests; uploads happen
    /// in the external CRUD service).
    async fn insert_document(&self, document: Document) -> anyhow::Result<()>;
}
