//! OCR stage worker.
//!
//! Consumes extraction jobs, fetches the source file from the blob store,
//! rasterizes and OCRs it, and publishes the extracted text to the result
//! queue. Every temporary file lives in a job-scoped directory that is
//! removed on success and failure alike.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::WorkerContext;
use crate::models::{OcrJob, OcrResult};

/// Subscribe to the OCR queue until shutdown.
pub async fn run(ctx: WorkerContext, shutdown: CancellationToken) -> anyhow::Result<()> {
    let queue = ctx.settings.broker.ocr_queue.clone();
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
    let job: OcrJob = match serde_json::from_str(body) {
        Ok(job) => job,
        Err(e) => {
            warn!("discarding invalid OCR job message: {}", e);
            return Ok(());
        }
    };
    process_job(ctx, job).await
}

/// Run one extraction job end to end.
pub async fn process_job(ctx: &WorkerContext, job: OcrJob) -> anyhow::Result<()> {
    if ctx.store.get_document(job.document_id).await?.is_none() {
        warn!(
            document_id = job.document_id,
            "document no longer exists, skipping OCR job"
        );
        return Ok(());
    }

    info!(
        document_id = job.document_id,
        bucket = %job.bucket,
        object = %job.object_name,
        "processing OCR job"
    );

    let bytes = ctx.blobs.fetch(&job.bucket, &job.object_name).await?;

    // Job-scoped temp dir: dropped (and removed) on every failure path.
    let work_dir = TempDir::new()?;
    let source_path = work_dir.path().join("source.pdf");
    tokio::fs::write(&source_path, &bytes).await?;

    let text = ctx
        .extractor
        .extract_document(&source_path, work_dir.path())
        .await?;

    info!(
        document_id = job.document_id,
        chars = text.len(),
        "OCR complete"
    );

    save_text_artifact(&ctx.settings.ocr.text_dir, &job, &text);

    let result = OcrResult {
        document_id: job.document_id,
        bucket: job.bucket,
        object_name: job.object_name,
        ocr_text: text,
    };
    ctx.broker
        .publish(&ctx.settings.broker.result_queue, &result)
        .await?;

    if let Err(e) = work_dir.close() {
        warn!("temp dir cleanup failed: {}", e);
    }
    Ok(())
}

/// Write the concatenated text to a per-document side artifact.
/// Best-effort: a write failure is logged and never fails the stage.
fn save_text_artifact(base_dir: &Path, job: &OcrJob, text: &str) {
    let write = || -> std::io::Result<PathBuf> {
        let dir = base_dir.join(job.document_id.to_string());
        std::fs::create_dir_all(&dir)?;

        let base_name = Path::new(&job.object_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let path = dir.join(format!("{}.txt", base_name));

        let content = format!(
            "# documentId: {}\n# bucket: {}\n# objectName: {}\n# generatedAt (UTC): {}\n\n{}\n",
            job.document_id,
            job.bucket,
            job.object_name,
            chrono::Utc::now().to_rfc3339(),
            text
        );
        std::fs::write(&path, content)?;
        Ok(path)
    };

    match write() {
        Ok(path) => debug!(path = %path.display(), "OCR text artifact written"),
        Err(e) => warn!(
            document_id = job.document_id,
            "failed to write OCR text artifact: {}", e
        ),
    }
}
