//! Summarization stage worker.
//!
//! Consumes OCR results, asks the external AI service for a summary
//! within the configured attempt budget, and publishes the outcome to the
//! summary queue. An empty summary (from a malformed API response) is a
//! valid outcome and flows downstream like any other.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::WorkerContext;
use crate::models::{OcrResult, SummaryResult};

/// Subscribe to the result queue until shutdown.
pub async fn run(ctx: WorkerContext, shutdown: CancellationToken) -> anyhow::Result<()> {
    let queue = ctx.settings.broker.result_queue.clone();
    let concurrency = ctx.settings.broker.worker_concurrency;
    let broker = ctx.broker.clone();
    let ctx = Arc::new(ctx);

    super::run_subscriber(broker, &queue, concurrency, shutdown, move |body| {
        let ctx = ctx.clone();
        async move { handle_message(&ctx, &body).await }
    })
    .await
}

async fn handle_message(ctx: &WorkerContext, body: &str) -> anyhow::Result<()> {
    let result: OcrResult = match serde_json::from_str(body) {
        Ok(result) => result,
        Err(e) => {
            warn!("discarding invalid OCR result message: {}", e);
            return Ok(());
        }
    };
    process_result(ctx, result).await
}

/// Summarize one OCR result and publish the summary.
pub async fn process_result(ctx: &WorkerContext, result: OcrResult) -> anyhow::Result<()> {
    if ctx.store.get_document(result.document_id).await?.is_none() {
        warn!(
            document_id = result.document_id,
            "document no longer exists, skipping summarization"
        );
        return Ok(());
    }

    let summary_text = ctx.summarizer.summarize(&result.ocr_text).await?;
    info!(
        document_id = result.document_id,
        chars = summary_text.len(),
        "summary generated"
    );

    let summary = SummaryResult {
        document_id: result.document_id,
        object_name: result.object_name,
        summary_text,
    };
    ctx.broker
        .publish(&ctx.settings.broker.summary_queue, &summary)
        .await?;
    Ok(())
}
