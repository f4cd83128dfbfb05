//! SQLite-backed document store.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};

use super::models::{DailyAccessRow, DocumentRow};
use super::DocumentStore;
use crate::models::{DailyAccess, Document};
use crate::schema::{daily_accesses, documents};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    file_name TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    uploaded_at TIMESTAMP NOT NULL,
    file_path TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS daily_accesses (
    document_id INTEGER NOT NULL,
    date DATE NOT NULL,
    access_count INTEGER NOT NULL,
    PRIMARY KEY (document_id, date)
);
";

/// Document store over a pooled SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and build the connection pool.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = ConnectionManager::<SqliteConnection>::new(path.display().to_string());
        let pool = Pool::builder().max_size(8).build(manager)?;
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        self.with_conn(|conn| {
            conn.batch_execute(SCHEMA_SQL)?;
            Ok(())
        })
        .await
    }

    /// Run a blocking diesel closure on the pool without stalling the
    /// async runtime.
    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> anyhow::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        Ok(tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await??)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get_document(&self, id: i32) -> anyhow::Result<Option<Document>> {
        self.with_conn(move |conn| {
            let row = documents::table
                .find(id)
                .first::<DocumentRow>(conn)
                .optional()?;
            Ok(row.map(Document::from))
        })
        .await
    }

    async fn update_summary(&self, id: i32, summary: &str) -> anyhow::Result<bool> {
        let summary = summary.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(documents::table.find(id))
                .set(documents::summary.eq(summary))
                .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }

    async fn get_daily_access(
        &self,
        document_id: i32,
        date: NaiveDate,
    ) -> anyhow::Result<Option<DailyAccess>> {
        self.with_conn(move |conn| {
            let row = daily_accesses::table
                .find((document_id, date))
                .first::<DailyAccessRow>(conn)
                .optional()?;
            Ok(row.map(DailyAccess::from))
        })
        .await
    }

    async fn upsert_daily_access(&self, entry: DailyAccess) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(daily_accesses::table)
                .values(DailyAccessRow::from(entry))
                .on_conflict((daily_accesses::document_id, daily_accesses::date))
                .do_update()
                .set(daily_accesses::access_count.eq(entry.access_count))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn insert_document(&self, document: Document) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(documents::table)
                .values(DocumentRow::from(document))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
