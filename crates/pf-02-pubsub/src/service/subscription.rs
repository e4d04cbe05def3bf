//! Delivery side of a subscription: the pump task and the caller's handle.

use facade_telemetry::{metric_inc, PUBSUB_IN, PUBSUB_IN_DROPPED, PUBSUB_LISTENING};
use shared_types::{EngineSubscription, PubSubEngineError, PubSubMessage};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Callback form of delivery. Runs on the subscription's drain task.
pub type MessageHandler = Arc<dyn Fn(PubSubMessage) + Send + Sync>;

/// Caller's handle on a subscription's bounded delivery buffer.
///
/// Clones share the same buffer. `recv` returns `None` once the
/// subscription is over and the buffer is drained.
#[derive(Clone)]
pub struct TopicSubscription {
    topic: Arc<str>,
    buffer_size: usize,
    receiver: Arc<Mutex<mpsc::Receiver<PubSubMessage>>>,
}

impl TopicSubscription {
    pub(crate) fn new(topic: &str, receiver: mpsc::Receiver<PubSubMessage>, buffer_size: usize) -> Self {
        Self {
            topic: Arc::from(topic),
            buffer_size,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub async fn recv(&self) -> Option<PubSubMessage> {
        self.receiver.lock().await.recv().await
    }

    /// Next buffered message, if any, without waiting.
    ///
    /// Returns `None` while another clone is parked in [`recv`](Self::recv);
    /// the next message belongs to that caller.
    pub fn try_recv(&self) -> Option<PubSubMessage> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }
}

impl fmt::Debug for TopicSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSubscription")
            .field("topic", &self.topic)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

/// Start the pump for `subscription`. The listening gauge is raised before
/// this returns and lowered when the pump exits.
pub(crate) fn spawn_pump(
    subscription: Arc<dyn EngineSubscription>,
    buffer: mpsc::Sender<PubSubMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let topic = subscription.topic().to_string();
    PUBSUB_LISTENING.with_label_values(&[&topic]).inc();
    tokio::spawn(pump(subscription, buffer, cancel, topic))
}

async fn pump(
    subscription: Arc<dyn EngineSubscription>,
    buffer: mpsc::Sender<PubSubMessage>,
    cancel: CancellationToken,
    topic: String,
) {
    debug!(topic = %topic, "Subscription pump started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = subscription.next() => next,
        };

        match next {
            Ok(message) => {
                metric_inc!(PUBSUB_IN, &[&topic]);
                match buffer.try_send(message) {
                    Ok(()) => {}
                    Err(TrySendError::Full(dropped)) | Err(TrySendError::Closed(dropped)) => {
                        metric_inc!(PUBSUB_IN_DROPPED, &[&topic]);
                        debug!(topic = %topic, from = %dropped.from.short(), seqno = dropped.seqno, "Delivery buffer full, message dropped");
                    }
                }
            }
            Err(PubSubEngineError::SubscriptionCancelled) | Err(PubSubEngineError::TopicClosed) => {
                break;
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Subscription read failed");
            }
        }
    }

    subscription.cancel();
    PUBSUB_LISTENING.with_label_values(&[&topic]).dec();
    debug!(topic = %topic, "Subscription pump stopped");
}

/// Drain a delivery buffer into `handler` until the pump goes away.
pub(crate) fn spawn_drain(
    mut receiver: mpsc::Receiver<PubSubMessage>,
    handler: MessageHandler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            handler(message);
        }
    })
}
