//! AMQP message broker client.
//!
//! Durable named queues with at-least-once delivery and manual
//! acknowledgment. The client owns its connection lifecycle: it is
//! constructed once at process start, shared by publishers and
//! subscribers, and closed at shutdown. A connection found closed is
//! re-established lazily under the lock, so concurrent callers never
//! race the reconnect.
//!
//! Handler failures do not requeue forever: the delivery attempt count
//! travels in the `x-attempts` header, and a message that exhausts the
//! attempt budget is parked on `<queue>.dead-letter` instead of looping.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Suffix appended to a queue name to form its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Header carrying the delivery attempt count across republishes.
const ATTEMPTS_HEADER: &str = "x-attempts";

/// Persistent delivery mode per the AMQP spec.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Message broker client with an owned connection lifecycle.
pub struct Broker {
    url: String,
    connection: Mutex<Connection>,
    max_attempts: u32,
}

impl Broker {
    /// Connect to the broker. The returned client is meant to be shared
    /// across all publishers and subscribers of the process.
    pub async fn connect(url: &str, max_attempts: u32) -> Result<Arc<Self>, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        info!("connected to message broker");
        Ok(Arc::new(Self {
            url: url.to_string(),
            connection: Mutex::new(connection),
            max_attempts,
        }))
    }

    /// Close the shared connection. In-flight channels are invalidated.
    pub async fn close(&self) {
        let conn = self.connection.lock().await;
        if let Err(e) = conn.close(200, "shutdown").await {
            warn!("broker connection close failed: {}", e);
        }
    }

    /// Open a channel, re-establishing the shared connection first if it
    /// is no longer connected.
    async fn channel(&self) -> Result<Channel, BrokerError> {
        let mut conn = self.connection.lock().await;
        if !conn.status().connected() {
            warn!("broker connection lost, reconnecting");
            *conn = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        }
        Ok(conn.create_channel().await?)
    }

    async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), BrokerError> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    /// Publish a message as a persistent JSON payload on the durable queue.
    pub async fn publish<T: Serialize>(&self, queue: &str, payload: &T) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(payload)?;
        let channel = self.channel().await?;
        Self::declare_queue(&channel, queue).await?;
        self.publish_raw(&channel, queue, &body, 1).await
    }

    async fn publish_raw(
        &self,
        channel: &Channel,
        queue: &str,
        body: &[u8],
        attempts: u32,
    ) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(ATTEMPTS_HEADER),
            AMQPValue::LongUInt(attempts),
        );
        channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
                    .with_headers(headers),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Consume `queue` until `shutdown` fires, invoking `handler` for each
    /// delivery on its own task. At most `concurrency` deliveries are in
    /// flight at once. Returns when cancelled or when the consumer stream
    /// ends (e.g. the connection dropped); the caller decides whether to
    /// resubscribe.
    pub async fn subscribe<F, Fut>(
        self: Arc<Self>,
        queue: &str,
        concurrency: usize,
        shutdown: CancellationToken,
        handler: F,
    ) -> Result<(), BrokerError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let channel = self.channel().await?;
        Self::declare_queue(&channel, queue).await?;
        Self::declare_queue(&channel, &format!("{}{}", queue, DEAD_LETTER_SUFFIX)).await?;
        channel
            .basic_qos(concurrency as u16, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("docloader-{}", queue);
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, concurrency, "subscribed");

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let handler = Arc::new(handler);
        let mut in_flight = JoinSet::new();

        loop {
            // Reap finished handler tasks without blocking.
            while in_flight.try_join_next().is_some() {}

            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        error!(queue, "consumer stream error: {}", e);
                        break;
                    }
                    None => {
                        warn!(queue, "consumer stream ended");
                        break;
                    }
                },
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let broker = Arc::clone(&self);
            let handler = Arc::clone(&handler);
            let queue = queue.to_string();
            in_flight.spawn(async move {
                let _permit = permit;
                broker.handle_delivery(&queue, delivery, handler.as_ref()).await;
            });
        }

        // Stop taking new deliveries, let in-flight handlers finish.
        debug!(queue, "draining in-flight deliveries");
        while in_flight.join_next().await.is_some() {}
        Ok(())
    }

    /// Run the handler for one delivery and route the outcome: ack on
    /// success, republish with a bumped attempt count on failure, park on
    /// the dead-letter queue once the budget is spent.
    async fn handle_delivery<F, Fut>(&self, queue: &str, delivery: lapin::message::Delivery, handler: &F)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let body = String::from_utf8_lossy(&delivery.data).into_owned();
        let attempts = delivery_attempts(delivery.properties.headers());

        match handler(body).await {
            Ok(()) => {
                if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                    warn!(queue, "ack failed: {}", e);
                }
            }
            Err(e) => {
                let routed = if attempts >= self.max_attempts {
                    warn!(
                        queue,
                        attempts,
                        error = %e,
                        "attempt budget exhausted, dead-lettering message"
                    );
                    self.route_failed(
                        &format!("{}{}", queue, DEAD_LETTER_SUFFIX),
                        &delivery.data,
                        attempts,
                    )
                    .await
                } else {
                    warn!(
                        queue,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "handler failed, requeueing for redelivery"
                    );
                    self.route_failed(queue, &delivery.data, attempts + 1).await
                };

                if routed {
                    if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
                        warn!(queue, "ack after reroute failed: {}", e);
                    }
                } else {
                    // Could not republish; fall back to a broker-side
                    // requeue so the message is not lost.
                    let nack = BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    };
                    if let Err(e) = delivery.acker.nack(nack).await {
                        error!(queue, "nack failed, message may be stuck unacked: {}", e);
                    }
                }
            }
        }
    }

    async fn route_failed(&self, target_queue: &str, body: &[u8], attempts: u32) -> bool {
        let result = async {
            let channel = self.channel().await?;
            Self::declare_queue(&channel, target_queue).await?;
            self.publish_raw(&channel, target_queue, body, attempts).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(queue = target_queue, "failed to route message: {}", e);
                false
            }
        }
    }
}

/// Read the delivery attempt count from message headers. A message
/// without the header is on its first delivery.
fn delivery_attempts(headers: &Option<FieldTable>) -> u32 {
    let Some(table) = headers else { return 1 };
    match table.inner().get(&ShortString::from(ATTEMPTS_HEADER)) {
        Some(AMQPValue::LongUInt(n)) => (*n).max(1),
        Some(AMQPValue::LongInt(n)) => (*n).max(1) as u32,
        Some(AMQPValue::LongLongInt(n)) => (*n).max(1) as u32,
        _ => 1,
    }
}
