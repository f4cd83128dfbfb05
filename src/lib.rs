//! DocLoader - asynchronous document enrichment pipeline.
//!
//! Uploaded documents are enriched in stages connected by durable queues:
//! an OCR stage extracts text from the stored file, a summarization stage
//! sends that text to an external AI service, and a summary consumer writes
//! the result back to the document store. A separate batch ingestor applies
//! daily access-count files on a schedule.

pub mod blobstore;
pub mod broker;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod repository;
pub mod schema;
pub mod summarizer;
pub mod workers;
