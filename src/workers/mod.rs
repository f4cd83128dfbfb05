//! Pipeline stage workers.
//!
//! Each stage is an independent long-lived subscriber on its input queue.
//! Stages share nothing but the broker, the document store and the
//! last-write-wins semantics of its writes; there is no cross-stage
//! ordering, locking or transaction.

pub mod ocr;
pub mod summarize;
pub mod summary;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::blobstore::BlobStore;
use crate::broker::Broker;
use crate::config::Settings;
use crate::ocr::PageExtractor;
use crate::repository::DocumentStore;
use crate::summarizer::SummarizerClient;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Summarize,
    Summary,
}

/// Shared handles every stage worker draws from.
#[derive(Clone)]
pub struct WorkerContext {
    pub settings: Settings,
    pub broker: Arc<Broker>,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<BlobStore>,
    pub extractor: Arc<PageExtractor>,
    pub summarizer: Arc<SummarizerClient>,
}

/// Run the given stages until the shutdown token fires, then drain.
pub async fn run_stages(
    ctx: WorkerContext,
    stages: &[Stage],
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut tasks = JoinSet::new();

    for stage in stages {
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        match stage {
            Stage::Ocr => {
                tasks.spawn(async move { ocr::run(ctx, shutdown).await });
            }
            Stage::Summarize => {
                tasks.spawn(async move { summarize::run(ctx, shutdown).await });
            }
            Stage::Summary => {
                tasks.spawn(async move { summary::run(ctx, shutdown).await });
            }
        }
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("stage worker exited with error: {:#}", e),
            Err(e) => error!("stage worker task panicked: {}", e),
        }
    }

    info!("all stage workers stopped");
    Ok(())
}

/// Keep a queue subscription alive until shutdown: if the consumer stream
/// ends or errors (e.g. the broker connection dropped), wait briefly and
/// resubscribe.
async fn run_subscriber<F, Fut>(
    broker: Arc<Broker>,
    queue: &str,
    concurrency: usize,
    shutdown: CancellationToken,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    loop {
        if let Err(e) = broker
            .clone()
            .subscribe(queue, concurrency, shutdown.clone(), handler.clone())
            .await
        {
            error!(queue, "subscription failed: {}", e);
        }
        if shutdown.is_cancelled() {
            return Ok(());
        }
        warn!(queue, "subscription ended, resubscribing shortly");
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }
}
