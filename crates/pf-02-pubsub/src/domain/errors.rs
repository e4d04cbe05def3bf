use shared_types::PubSubEngineError;
use thiserror::Error;

/// Errors returned synchronously by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// Publishing requires a previously joined topic.
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// The live subscription was created with a handler and has no
    /// delivery handle to return.
    #[error("already subscribed to {0} without a delivery handle")]
    AlreadySubscribed(String),

    #[error("topic {0} rejected by subscription filter")]
    TopicRejected(String),

    #[error("publish to {0} timed out")]
    PublishTimeout(String),

    #[error("too many subscriptions: {count} exceeds limit {limit}")]
    TooManySubscriptions { count: usize, limit: usize },

    #[error("invalid pubsub configuration: {0}")]
    InvalidConfig(String),

    #[error("pubsub service closed")]
    Closed,

    #[error("engine error: {0}")]
    Engine(#[from] PubSubEngineError),
}
