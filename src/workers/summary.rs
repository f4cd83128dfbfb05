//! Summary consumer.
//!
//! Applies generated summaries to the stored document. The write is an
//! unconditional overwrite keyed by the document id, so re-applying the
//! same result any number of times leaves the same stored value.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::WorkerContext;
use crate::models::SummaryResult;
use crate::repository::DocumentStore;

/// Subscribe to the summary queue until shutdown.
pub async fn run(ctx: WorkerContext, shutdown: CancellationToken) -> anyhow::Result<()> {
    let queue = ctx.settings.broker.summary_queue.clone();
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
    let result: SummaryResult = match serde_json::from_str(body) {
        Ok(result) => result,
        Err(e) => {
            warn!("discarding invalid summary message: {}", e);
            return Ok(());
        }
    };
    apply_summary(ctx.store.as_ref(), &result).await
}

/// Overwrite the document's summary. A missing document is skipped with a
/// warning; it is not an error and is never retried.
pub async fn apply_summary(
    store: &dyn DocumentStore,
    result: &SummaryResult,
) -> anyhow::Result<()> {
    let updated = store
        .update_summary(result.document_id, &result.summary_text)
        .await?;

    if updated {
        info!(document_id = result.document_id, "summary updated");
    } else {
        warn!(
            document_id = result.document_id,
            "document not found, skipping summary update"
        );
    }
    Ok(())
}
