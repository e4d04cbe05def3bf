//! Broadcast-channel gossip engine.
//!
//! Every topic is one `broadcast` channel shared across the network. A
//! subscriber only sees messages from itself or from peers its host is
//! connected to, which is enough mesh semantics for a fully connected
//! cluster.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    EngineSubscription, EngineTopic, NetworkHost, PeerId, PubSubEngine, PubSubEngineError,
    PubSubMessage,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::host::MemoryHost;
use crate::network::MemoryNetwork;

pub struct MemoryPubSub {
    host: Arc<MemoryHost>,
    network: MemoryNetwork,
    joined: Arc<Mutex<HashSet<String>>>,
    seqno: Arc<AtomicU64>,
}

impl MemoryPubSub {
    pub(crate) fn new(host: Arc<MemoryHost>, network: MemoryNetwork) -> Self {
        Self {
            host,
            network,
            joined: Arc::new(Mutex::new(HashSet::new())),
            seqno: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Names with a live topic handle.
    #[must_use]
    pub fn joined_topics(&self) -> Vec<String> {
        self.joined.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl PubSubEngine for MemoryPubSub {
    async fn join(&self, topic: &str) -> Result<Arc<dyn EngineTopic>, PubSubEngineError> {
        if !self.joined.lock().insert(topic.to_string()) {
            return Err(PubSubEngineError::TopicAlreadyJoined(topic.to_string()));
        }
        self.network.add_topic_member(topic, self.host.local_peer_id());

        Ok(Arc::new(MemoryTopic {
            name: topic.to_string(),
            host: Arc::clone(&self.host),
            network: self.network.clone(),
            sender: self.network.topic_sender(topic),
            joined: Arc::clone(&self.joined),
            seqno: Arc::clone(&self.seqno),
            closed: CancellationToken::new(),
        }))
    }
}

pub struct MemoryTopic {
    name: String,
    host: Arc<MemoryHost>,
    network: MemoryNetwork,
    sender: broadcast::Sender<PubSubMessage>,
    joined: Arc<Mutex<HashSet<String>>>,
    seqno: Arc<AtomicU64>,
    closed: CancellationToken,
}

#[async_trait]
impl EngineTopic for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<Arc<dyn EngineSubscription>, PubSubEngineError> {
        if self.closed.is_cancelled() {
            return Err(PubSubEngineError::TopicClosed);
        }
        Ok(Arc::new(MemorySubscription {
            topic: self.name.clone(),
            host: Arc::clone(&self.host),
            receiver: tokio::sync::Mutex::new(self.sender.subscribe()),
            cancelled: CancellationToken::new(),
            topic_closed: self.closed.clone(),
        }))
    }

    async fn publish(&self, data: Vec<u8>) -> Result<(), PubSubEngineError> {
        if self.closed.is_cancelled() {
            return Err(PubSubEngineError::TopicClosed);
        }
        let message = PubSubMessage {
            topic: self.name.clone(),
            from: self.host.local_peer_id(),
            seqno: self.seqno.fetch_add(1, Ordering::SeqCst),
            data,
        };
        // No receivers is not an error for gossip
        let _ = self.sender.send(message);
        Ok(())
    }

    fn list_peers(&self) -> Vec<PeerId> {
        self.network
            .topic_members(&self.name)
            .into_iter()
            .filter(|peer| self.host.connectedness(peer).is_connected())
            .collect()
    }

    async fn close(&self) -> Result<(), PubSubEngineError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        self.joined.lock().remove(&self.name);
        self.network
            .remove_topic_member(&self.name, &self.host.local_peer_id());
        debug!(topic = %self.name, "Memory topic closed");
        Ok(())
    }
}

pub struct MemorySubscription {
    topic: String,
    host: Arc<MemoryHost>,
    receiver: tokio::sync::Mutex<broadcast::Receiver<PubSubMessage>>,
    cancelled: CancellationToken,
    topic_closed: CancellationToken,
}

impl MemorySubscription {
    fn accepts(&self, message: &PubSubMessage) -> bool {
        message.from == self.host.local_peer_id()
            || self.host.connectedness(&message.from).is_connected()
    }
}

#[async_trait]
impl EngineSubscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&self) -> Result<PubSubMessage, PubSubEngineError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            tokio::select! {
                biased;
                _ = self.cancelled.cancelled() => return Err(PubSubEngineError::SubscriptionCancelled),
                _ = self.topic_closed.cancelled() => return Err(PubSubEngineError::TopicClosed),
                received = receiver.recv() => match received {
                    Ok(message) if self.accepts(&message) => return Ok(message),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(topic = %self.topic, skipped, "Memory subscription lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return Err(PubSubEngineError::TopicClosed),
                },
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_engine_refuses_second_join() {
        let network = MemoryNetwork::new();
        let host = network.add_host();
        let engine = network.pubsub_for(&host);

        let topic = engine.join("blocks").await.unwrap();
        assert!(matches!(
            engine.join("blocks").await,
            Err(PubSubEngineError::TopicAlreadyJoined(_))
        ));

        topic.close().await.unwrap();
        assert!(engine.join("blocks").await.is_ok());
    }

    #[tokio::test]
    async fn test_delivery_requires_connection() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let c = network.add_host();
        a.connect(&b.local_address()).await.unwrap();

        let ta = network.pubsub_for(&a).join("news").await.unwrap();
        let sb = network.pubsub_for(&b).join("news").await.unwrap().subscribe().await.unwrap();
        let sc = network.pubsub_for(&c).join("news").await.unwrap().subscribe().await.unwrap();

        ta.publish(b"hi".to_vec()).await.unwrap();

        let got = timeout(Duration::from_secs(1), sb.next()).await.expect("timeout").unwrap();
        assert_eq!(got.data, b"hi");
        assert_eq!(got.from, a.local_peer_id());
        assert!(timeout(Duration::from_millis(100), sc.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_and_close_end_next() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let topic = network.pubsub_for(&a).join("t").await.unwrap();

        let first = topic.subscribe().await.unwrap();
        first.cancel();
        assert_eq!(first.next().await, Err(PubSubEngineError::SubscriptionCancelled));

        let second = topic.subscribe().await.unwrap();
        topic.close().await.unwrap();
        assert_eq!(second.next().await, Err(PubSubEngineError::TopicClosed));
        assert_eq!(topic.publish(vec![1]).await, Err(PubSubEngineError::TopicClosed));
    }

    #[tokio::test]
    async fn test_list_peers_only_connected_members() {
        let network = MemoryNetwork::new();
        let a = network.add_host();
        let b = network.add_host();
        let c = network.add_host();
        a.connect(&b.local_address()).await.unwrap();

        let ta = network.pubsub_for(&a).join("mesh").await.unwrap();
        let _tb = network.pubsub_for(&b).join("mesh").await.unwrap();
        let _tc = network.pubsub_for(&c).join("mesh").await.unwrap();

        assert_eq!(ta.list_peers(), vec![b.local_peer_id()]);
    }
}
