//! In-memory at-least-once event bus.
//!
//! [`MemoryEventBus`] implements the [`EventBus`] port with real
//! redelivery behavior: per-topic fan-out, bounded subscriber queues, an
//! ack deadline, exponential redelivery backoff with jitter, and a
//! delivery cap that drops poison messages. Tests against it exercise the
//! same duplicate-delivery and backpressure paths a broker would produce.
//!
//! Each subscriber gets one queue and one worker task. The worker pulls
//! jobs and runs the handler in a spawned task, with at most
//! [`MemoryBusConfig::prefetch`] handler invocations in flight per
//! subscriber. When the in-flight limit and the queue are both full,
//! `publish` blocks and eventually fails with
//! [`BusError::PublishTimeout`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use orderflow::{
    BusError, BusResult, Delivery, Disposition, EventBus, EventHandler, MessageId, Topic,
};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Tuning knobs for the in-memory bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBusConfig {
    /// How long `publish` waits for every subscriber queue to accept the
    /// message before giving up.
    pub publish_ack_wait: Duration,
    /// How long a handler gets per delivery before the bus treats the
    /// attempt as a retry.
    pub ack_deadline: Duration,
    /// Total delivery attempts per message per subscriber. Once reached,
    /// the message is dropped with a warning.
    pub max_deliveries: u32,
    /// Base delay before a redelivery; doubles with each attempt.
    pub redelivery_delay: Duration,
    /// Upper bound on the redelivery delay.
    pub max_redelivery_delay: Duration,
    /// Queue capacity per subscriber.
    pub channel_capacity: usize,
    /// Handler invocations allowed in flight at once, per subscriber.
    pub prefetch: usize,
}

impl Default for MemoryBusConfig {
    /// Five-second publish wait, twenty-second ack deadline, five
    /// deliveries, 200ms base redelivery delay capped at thirty seconds.
    fn default() -> Self {
        Self {
            publish_ack_wait: Duration::from_secs(5),
            ack_deadline: Duration::from_secs(20),
            max_deliveries: 5,
            redelivery_delay: Duration::from_millis(200),
            max_redelivery_delay: Duration::from_secs(30),
            channel_capacity: 1024,
            prefetch: 16,
        }
    }
}

impl MemoryBusConfig {
    /// Replaces the publish wait.
    #[must_use]
    pub const fn with_publish_ack_wait(mut self, wait: Duration) -> Self {
        self.publish_ack_wait = wait;
        self
    }

    /// Replaces the ack deadline.
    #[must_use]
    pub const fn with_ack_deadline(mut self, deadline: Duration) -> Self {
        self.ack_deadline = deadline;
        self
    }

    /// Replaces the delivery cap.
    #[must_use]
    pub const fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max;
        self
    }

    /// Replaces the base redelivery delay.
    #[must_use]
    pub const fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Replaces the redelivery delay cap.
    #[must_use]
    pub const fn with_max_redelivery_delay(mut self, cap: Duration) -> Self {
        self.max_redelivery_delay = cap;
        self
    }

    /// Replaces the per-subscriber queue capacity.
    #[must_use]
    pub const fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Replaces the per-subscriber in-flight limit.
    #[must_use]
    pub const fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// One queued delivery attempt. The payload is shared between subscribers
/// and attempts; each delivery clones it on the way out.
#[derive(Debug, Clone)]
struct Job {
    message_id: MessageId,
    payload: Arc<Vec<u8>>,
    attempt: u32,
}

/// In-memory publish/subscribe bus with at-least-once delivery.
#[derive(Debug)]
pub struct MemoryEventBus {
    config: MemoryBusConfig,
    topics: RwLock<HashMap<Topic, Vec<mpsc::Sender<Job>>>>,
    closed: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryEventBus {
    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn new(config: MemoryBusConfig) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// The bus's configuration.
    #[must_use]
    pub const fn config(&self) -> &MemoryBusConfig {
        &self.config
    }

    /// Number of subscribers currently registered for `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .read()
            .map(|topics| topics.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Shuts the bus down.
    ///
    /// Publishing and subscribing fail with [`BusError::Closed`] from here
    /// on. Topic workers are stopped; handler invocations already in
    /// flight run to completion detached.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut topics) = self.topics.write() {
            topics.clear();
        }
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        info!("event bus shut down");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new(MemoryBusConfig::default())
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, topic: &Topic, payload: Vec<u8>) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let queues: Vec<mpsc::Sender<Job>> = {
            let topics = self.topics.read().map_err(|_| BusError::Closed)?;
            topics.get(topic).cloned().unwrap_or_default()
        };
        if queues.is_empty() {
            debug!(%topic, "published to a topic with no subscribers");
            return Ok(());
        }

        let message_id = MessageId::new();
        let payload = Arc::new(payload);
        for queue in queues {
            let job = Job {
                message_id,
                payload: Arc::clone(&payload),
                attempt: 1,
            };
            match timeout(self.config.publish_ack_wait, queue.send(job)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(BusError::Closed),
                Err(_) => {
                    return Err(BusError::PublishTimeout {
                        topic: topic.clone(),
                        wait: self.config.publish_ack_wait,
                    })
                }
            }
        }
        debug!(%topic, message = %message_id, "message accepted");
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic, handler: Arc<dyn EventHandler>) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let (queue, jobs) = mpsc::channel(self.config.channel_capacity);
        {
            let mut topics = self.topics.write().map_err(|_| BusError::Closed)?;
            topics.entry(topic.clone()).or_default().push(queue.clone());
        }
        let worker = tokio::spawn(run_subscriber(
            jobs,
            queue,
            handler,
            self.config,
            topic.clone(),
        ));
        self.workers.lock().map_err(|_| BusError::Closed)?.push(worker);
        info!(%topic, "subscriber registered");
        Ok(())
    }
}

/// Pulls jobs off one subscriber's queue and runs the handler for each,
/// keeping at most `config.prefetch` invocations in flight.
///
/// The permit is taken before the job, so a subscriber at its in-flight
/// limit leaves messages queued and the queue's backpressure reaches the
/// publisher.
async fn run_subscriber(
    mut jobs: mpsc::Receiver<Job>,
    requeue: mpsc::Sender<Job>,
    handler: Arc<dyn EventHandler>,
    config: MemoryBusConfig,
    topic: Topic,
) {
    let in_flight = Arc::new(Semaphore::new(config.prefetch));
    loop {
        let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
            break;
        };
        let Some(job) = jobs.recv().await else {
            break;
        };
        let handler = Arc::clone(&handler);
        let requeue = requeue.clone();
        let topic = topic.clone();
        tokio::spawn(async move {
            deliver(job, handler, requeue, config, topic).await;
            drop(permit);
        });
    }
}

/// Runs the handler for one attempt and acts on its verdict.
///
/// A handler that panics or outlives the ack deadline counts as a retry.
/// On the deadline the invocation is left running detached; if it finishes
/// later its work stands alongside the redelivery, which is the duplicate
/// delivery consumers already sign up for.
async fn deliver(
    job: Job,
    handler: Arc<dyn EventHandler>,
    requeue: mpsc::Sender<Job>,
    config: MemoryBusConfig,
    topic: Topic,
) {
    let delivery = Delivery {
        topic: topic.clone(),
        message_id: job.message_id,
        payload: (*job.payload).clone(),
        attempt: job.attempt,
    };
    let invocation = tokio::spawn(async move { handler.on_delivery(&delivery).await });
    let verdict = match timeout(config.ack_deadline, invocation).await {
        Ok(Ok(disposition)) => disposition,
        Ok(Err(_)) => {
            warn!(%topic, message = %job.message_id, attempt = job.attempt, "handler panicked");
            Disposition::Retry
        }
        Err(_) => {
            warn!(
                %topic,
                message = %job.message_id,
                attempt = job.attempt,
                "handler missed the ack deadline"
            );
            Disposition::Retry
        }
    };

    match verdict {
        Disposition::Ack => {
            debug!(%topic, message = %job.message_id, attempt = job.attempt, "delivery acked");
        }
        Disposition::Retry => {
            if job.attempt >= config.max_deliveries {
                warn!(
                    %topic,
                    message = %job.message_id,
                    attempts = job.attempt,
                    "delivery cap reached, dropping message"
                );
                return;
            }
            sleep(redelivery_backoff(&config, job.attempt)).await;
            let next = Job {
                attempt: job.attempt + 1,
                ..job
            };
            if requeue.send(next).await.is_err() {
                debug!(%topic, message = %job.message_id, "bus closed before redelivery");
            }
        }
    }
}

/// Exponential backoff on the attempt number, capped, with up to 50%
/// downward jitter so concurrent retries spread out.
fn redelivery_backoff(config: &MemoryBusConfig, attempt: u32) -> Duration {
    let doubled = config
        .redelivery_delay
        .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let capped = doubled.min(config.max_redelivery_delay);
    capped.mul_f64(rand::rng().random_range(0.5..=1.0))
}
