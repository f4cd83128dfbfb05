//! Access-log sinks.
//!
//! A sink applies one batch all-or-nothing: either every entry is stored
//! or none is. The shipped implementation validates every referenced
//! document before the first write, which keeps partial application out
//! without needing a cross-entry transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use super::parser::AccessEntry;
use crate::models::DailyAccess;
use crate::repository::DocumentStore;

/// Errors from submitting a batch.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("unknown document {0}")]
    UnknownDocument(i32),

    #[error("store error: {0}")]
    Store(String),
}

/// Destination for validated access-count batches.
#[async_trait]
pub trait AccessLogSink: Send + Sync {
    /// Apply every entry for `batch_date`, or nothing.
    async fn submit_batch(
        &self,
        batch_date: NaiveDate,
        entries: &[AccessEntry],
    ) -> Result<(), SinkError>;
}

/// Sink writing idempotent upserts to the document store.
pub struct StoreSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessLogSink for StoreSink {
    async fn submit_batch(
        &self,
        batch_date: NaiveDate,
        entries: &[AccessEntry],
    ) -> Result<(), SinkError> {
        // Validation phase: every document must exist before anything is
        // written, so a bad entry voids the whole file.
        for entry in entries {
            let document = self
                .store
                .get_document(entry.document_id)
                .await
                .map_err(|e| SinkError::Store(e.to_string()))?;
            if document.is_none() {
                warn!(
                    document_id = entry.document_id,
                    "batch references unknown document"
                );
                return Err(SinkError::UnknownDocument(entry.document_id));
            }
        }

        // Execution phase: all ids are valid, upsert them.
        for entry in entries {
            self.store
                .upsert_daily_access(DailyAccess {
                    document_id: entry.document_id,
                    date: batch_date,
                    access_count: entry.access_count,
                })
                .await
                .map_err(|e| SinkError::Store(e.to_string()))?;
        }

        Ok(())
    }
}
