//! # PubSub Session Manager
//!
//! Joins each topic once, runs at most one delivery pump per topic and
//! publishes under a bounded timeout.
//!
//! Both maps live behind a single `tokio::sync::RwLock` so join, subscribe
//! and unsubscribe are serialized against each other. Engine calls made
//! while the write lock is held are what keeps a topic from being joined
//! twice.

use facade_telemetry::{metric_inc, PUBSUB_OUT};
use shared_types::{EngineSubscription, EngineTopic, PeerId, PubSubEngine, PubSubMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{PubSubConfig, PubSubError, SubscriptionFilter, TopicRules};
use crate::service::subscription::{spawn_drain, spawn_pump, MessageHandler, TopicSubscription};

struct ActiveSubscription {
    engine: Arc<dyn EngineSubscription>,
    /// `None` when delivery goes to a handler.
    handle: Option<TopicSubscription>,
    cancel: CancellationToken,
}

struct OpenedSubscription {
    engine: Arc<dyn EngineSubscription>,
    receiver: mpsc::Receiver<PubSubMessage>,
    cancel: CancellationToken,
    buffer_size: usize,
}

#[derive(Default)]
struct SessionState {
    topics: HashMap<String, Arc<dyn EngineTopic>>,
    subscriptions: HashMap<String, ActiveSubscription>,
}

/// Topic and subscription sessions of one node.
pub struct PubSubService {
    engine: Arc<dyn PubSubEngine>,
    rules: TopicRules,
    state: RwLock<SessionState>,
    shutdown: CancellationToken,
}

impl PubSubService {
    /// Build a session manager whose pumps stop when `parent` is cancelled.
    pub fn new(
        engine: Arc<dyn PubSubEngine>,
        config: &PubSubConfig,
        parent: &CancellationToken,
    ) -> Result<Self, PubSubError> {
        Ok(Self::with_rules(engine, TopicRules::compile(config)?, parent))
    }

    pub fn with_rules(
        engine: Arc<dyn PubSubEngine>,
        rules: TopicRules,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            engine,
            rules,
            state: RwLock::new(SessionState::default()),
            shutdown: parent.child_token(),
        }
    }

    /// Filter an engine adapter can apply to remote subscription batches.
    #[must_use]
    pub fn subscription_filter(&self) -> Option<&SubscriptionFilter> {
        self.rules.filter()
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    /// Join `name`, or return the handle joined earlier.
    pub async fn join(&self, name: &str) -> Result<Arc<dyn EngineTopic>, PubSubError> {
        if let Some(topic) = self.state.read().await.topics.get(name) {
            return Ok(Arc::clone(topic));
        }
        let mut state = self.state.write().await;
        self.join_locked(&mut state, name).await
    }

    /// Previously joined topic. Never joins.
    pub async fn get_topic(&self, name: &str) -> Option<Arc<dyn EngineTopic>> {
        self.state.read().await.topics.get(name).cloned()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.state.read().await.topics.keys().cloned().collect()
    }

    /// Mesh peers of a joined topic; empty when not joined.
    pub async fn topic_peers(&self, name: &str) -> Vec<PeerId> {
        self.get_topic(name)
            .await
            .map(|topic| topic.list_peers())
            .unwrap_or_default()
    }

    async fn join_locked(
        &self,
        state: &mut SessionState,
        name: &str,
    ) -> Result<Arc<dyn EngineTopic>, PubSubError> {
        if let Some(topic) = state.topics.get(name) {
            return Ok(Arc::clone(topic));
        }
        if self.shutdown.is_cancelled() {
            return Err(PubSubError::Closed);
        }
        if let Some(filter) = self.rules.filter() {
            if !filter.can_subscribe(name) {
                return Err(PubSubError::TopicRejected(name.to_string()));
            }
        }

        let topic = self.engine.join(name).await?;
        state.topics.insert(name.to_string(), Arc::clone(&topic));
        debug!(topic = %name, "Joined topic");
        Ok(topic)
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Subscribe with a buffered delivery handle.
    ///
    /// `buffer_size` of 0 means the configured default; a matching topic
    /// entry overrides it. Subscribing again returns the existing handle and
    /// starts no second pump.
    pub async fn subscribe(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> Result<TopicSubscription, PubSubError> {
        let mut state = self.state.write().await;
        if let Some(active) = state.subscriptions.get(name) {
            return active
                .handle
                .clone()
                .ok_or_else(|| PubSubError::AlreadySubscribed(name.to_string()));
        }

        let opened = self.open_subscription(&mut state, name, buffer_size).await?;
        let handle = TopicSubscription::new(name, opened.receiver, opened.buffer_size);
        state.subscriptions.insert(
            name.to_string(),
            ActiveSubscription {
                engine: opened.engine,
                handle: Some(handle.clone()),
                cancel: opened.cancel,
            },
        );
        Ok(handle)
    }

    /// Subscribe with a callback. A no-op when already subscribed.
    pub async fn subscribe_with_handler(
        &self,
        name: &str,
        handler: MessageHandler,
        buffer_size: usize,
    ) -> Result<(), PubSubError> {
        let mut state = self.state.write().await;
        if state.subscriptions.contains_key(name) {
            return Ok(());
        }

        let opened = self.open_subscription(&mut state, name, buffer_size).await?;
        spawn_drain(opened.receiver, handler);
        state.subscriptions.insert(
            name.to_string(),
            ActiveSubscription {
                engine: opened.engine,
                handle: None,
                cancel: opened.cancel,
            },
        );
        Ok(())
    }

    /// Underlying engine subscription, if subscribed.
    pub async fn get_subscription(&self, name: &str) -> Option<Arc<dyn EngineSubscription>> {
        self.state
            .read()
            .await
            .subscriptions
            .get(name)
            .map(|active| Arc::clone(&active.engine))
    }

    pub async fn is_subscribed(&self, name: &str) -> bool {
        self.state.read().await.subscriptions.contains_key(name)
    }

    async fn open_subscription(
        &self,
        state: &mut SessionState,
        name: &str,
        buffer_size: usize,
    ) -> Result<OpenedSubscription, PubSubError> {
        let topic = self.join_locked(state, name).await?;
        let engine = match topic.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(topic = %name, error = %e, "Engine refused subscription, closing topic");
                state.topics.remove(name);
                if let Err(close_err) = topic.close().await {
                    debug!(topic = %name, error = %close_err, "Topic close after failed subscribe");
                }
                return Err(e.into());
            }
        };

        let buffer_size = self.rules.buffer_for(name, buffer_size);
        let (sender, receiver) = mpsc::channel(buffer_size);
        let cancel = self.shutdown.child_token();
        spawn_pump(Arc::clone(&engine), sender, cancel.clone());

        info!(topic = %name, buffer = buffer_size, "Subscribed");
        Ok(OpenedSubscription {
            engine,
            receiver,
            cancel,
            buffer_size,
        })
    }

    /// Cancel the subscription and leave the topic.
    ///
    /// Does nothing unless the topic is both joined and subscribed.
    pub async fn unsubscribe(&self, name: &str) -> Result<(), PubSubError> {
        let mut state = self.state.write().await;
        if !state.topics.contains_key(name) || !state.subscriptions.contains_key(name) {
            return Ok(());
        }

        if let Some(active) = state.subscriptions.remove(name) {
            active.cancel.cancel();
            active.engine.cancel();
        }
        if let Some(topic) = state.topics.remove(name) {
            topic.close().await?;
        }
        info!(topic = %name, "Unsubscribed");
        Ok(())
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Publish to a joined topic.
    pub async fn publish(&self, name: &str, data: Vec<u8>) -> Result<(), PubSubError> {
        let topic = self
            .get_topic(name)
            .await
            .ok_or_else(|| PubSubError::TopicNotFound(name.to_string()))?;

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(PubSubError::Closed),
            published = timeout(self.rules.publish_timeout(), topic.publish(data)) => {
                published.map_err(|_| PubSubError::PublishTimeout(name.to_string()))??;
            }
        }

        metric_inc!(PUBSUB_OUT, &[name]);
        Ok(())
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Stop every pump and close every topic. Returns the first close error.
    pub async fn close(&self) -> Result<(), PubSubError> {
        self.shutdown.cancel();
        let mut state = self.state.write().await;

        for (_, active) in state.subscriptions.drain() {
            active.cancel.cancel();
            active.engine.cancel();
        }

        let mut first_error = None;
        for (name, topic) in state.topics.drain() {
            if let Err(e) = topic.close().await {
                warn!(topic = %name, error = %e, "Topic close failed");
                first_error.get_or_insert(PubSubError::from(e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
