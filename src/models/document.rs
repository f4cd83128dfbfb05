//! Persistent document and access-count records.
//!
//! Both records are owned by the document store; the pipeline only mutates
//! them through the summary-update and daily-access interfaces.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Database row ID; the canonical identity for matching async results.
    pub id: i32,
    /// Original upload filename.
    pub file_name: String,
    /// AI-generated summary, empty until the pipeline produces one.
    pub summary: String,
    /// When the document was uploaded.
    pub uploaded_at: NaiveDateTime,
    /// Object path in the blob store.
    pub file_path: String,
}

/// Daily access count for one document, keyed by `(document_id, date)`.
///
/// Reprocessing a batch overwrites the count; it is never summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAccess {
    pub document_id: i32,
    pub date: NaiveDate,
    pub access_count: i32,
}
