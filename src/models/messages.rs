//! Queue message payloads.
//!
//! Wire field names are camelCase; producers and consumers on other sides
//! of the broker rely on them staying stable.

use serde::{Deserialize, Serialize};

/// Extraction job published at upload time, consumed by the OCR stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrJob {
    pub document_id: i32,
    pub bucket: String,
    pub object_name: String,
}

/// Extracted text produced by the OCR stage, consumed by summarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub document_id: i32,
    pub bucket: String,
    pub object_name: String,
    pub ocr_text: String,
}

/// Generated summary, consumed by the summary consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub document_id: i32,
    pub object_name: String,
    pub summary_text: String,
}
