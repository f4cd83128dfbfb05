//! Diesel row types mapped to the domain models.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use crate::models::{DailyAccess, Document};
use crate::schema::{daily_accesses, documents};

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = documents)]
pub struct DocumentRow {
    pub id: i32,
    pub file_name: String,
    pub summary: String,
    pub uploaded_at: NaiveDateTime,
    pub file_path: String,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            file_name: row.file_name,
            summary: row.summary,
            uploaded_at: row.uploaded_at,
            file_path: row.file_path,
        }
    }
}

impl From<Document> for DocumentRow {
    fn from(doc: Document) -> Self {
        DocumentRow {
            id: doc.id,
            file_name: doc.file_name,
            summary: doc.summary,
            uploaded_at: doc.uploaded_at,
            file_path: doc.file_path,
        }
    }
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = daily_accesses)]
pub struct DailyAccessRow {
    pub document_id: i32,
    pub date: NaiveDate,
    pub access_count: i32,
}

impl From<DailyAccessRow> for DailyAccess {
    fn from(row: DailyAccessRow) -> Self {
        DailyAccess {
            document_id: row.document_id,
            date: row.date,
            access_count: row.access_count,
        }
    }
}

impl From<DailyAccess> for DailyAccessRow {
    fn from(entry: DailyAccess) -> Self {
        DailyAccessRow {
            document_id: entry.document_id,
            date: entry.date,
            access_count: entry.access_count,
        }
    }
}
