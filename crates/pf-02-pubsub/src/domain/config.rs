//! Pubsub configuration.
//!
//! Topic entries match by regular expression against the topic name; the
//! first matching entry with a non-zero buffer size decides the delivery
//! buffer for that topic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::errors::PubSubError;
use crate::domain::filter::SubscriptionFilter;

/// Delivery buffer used when nothing else asks for a size.
pub const DEFAULT_BUFFER_SIZE: usize = 32;

/// Upper bound on a single publish call.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub default_buffer_size: usize,
    pub publish_timeout_secs: u64,
    /// Restricts which topics this node will join and accept from peers.
    pub subscription_filter: Option<SubscriptionFilterConfig>,
    pub topics: Vec<TopicConfig>,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            subscription_filter: None,
            topics: Vec::new(),
        }
    }
}

impl PubSubConfig {
    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Short publish timeout for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            publish_timeout_secs: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Regular expression matched against topic names.
    pub name: String,
    #[serde(default)]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilterConfig {
    pub pattern: String,
    /// Maximum subscriptions accepted from one incoming batch; 0 is unlimited.
    #[serde(default)]
    pub limit: usize,
}

/// Compiled form of [`PubSubConfig`].
#[derive(Debug, Clone)]
pub struct TopicRules {
    default_buffer: usize,
    publish_timeout: Duration,
    topics: Vec<(Regex, usize)>,
    filter: Option<SubscriptionFilter>,
}

impl TopicRules {
    pub fn compile(config: &PubSubConfig) -> Result<Self, PubSubError> {
        if config.default_buffer_size == 0 {
            return Err(PubSubError::InvalidConfig(
                "default_buffer_size must be positive".into(),
            ));
        }
        if config.publish_timeout_secs == 0 {
            return Err(PubSubError::InvalidConfig(
                "publish_timeout_secs must be positive".into(),
            ));
        }

        let topics = config
            .topics
            .iter()
            .map(|topic| {
                Regex::new(&topic.name)
                    .map(|re| (re, topic.buffer_size))
                    .map_err(|e| PubSubError::InvalidConfig(format!("topic {}: {e}", topic.name)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let filter = config
            .subscription_filter
            .as_ref()
            .map(|f| SubscriptionFilter::new(&f.pattern, f.limit))
            .transpose()?;

        Ok(Self {
            default_buffer: config.default_buffer_size,
            publish_timeout: config.publish_timeout(),
            topics,
            filter,
        })
    }

    /// Buffer size for `topic`: a matching topic entry beats the caller's
    /// request, and a zero request means the default.
    #[must_use]
    pub fn buffer_for(&self, topic: &str, requested: usize) -> usize {
        let configured = self
            .topics
            .iter()
            .find(|(re, _)| re.is_match(topic))
            .map(|(_, size)| *size)
            .unwrap_or(0);

        match (configured, requested) {
            (0, 0) => self.default_buffer,
            (0, requested) => requested,
            (configured, _) => configured,
        }
    }

    #[must_use]
    pub fn publish_timeout(&self) -> Duration {
        self.publish_timeout
    }

    #[must_use]
    pub fn filter(&self) -> Option<&SubscriptionFilter> {
        self.filter.as_ref()
    }
}

impl Default for TopicRules {
    fn default() -> Self {
        Self {
            default_buffer: DEFAULT_BUFFER_SIZE,
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            topics: Vec::new(),
            filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(topics: &[(&str, usize)]) -> TopicRules {
        TopicRules::compile(&PubSubConfig {
            topics: topics
                .iter()
                .map(|(name, size)| TopicConfig {
                    name: (*name).to_string(),
                    buffer_size: *size,
                })
                .collect(),
            ..PubSubConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_buffer_when_nothing_requested() {
        assert_eq!(TopicRules::default().buffer_for("blocks", 0), 32);
        assert_eq!(TopicRules::default().buffer_for("blocks", 8), 8);
    }

    #[test]
    fn test_first_matching_topic_wins() {
        let rules = rules(&[("^blocks", 128), ("blocks.*", 4), ("^tx$", 0)]);

        assert_eq!(rules.buffer_for("blocks/v1", 8), 128);
        // Zero-sized entries fall through to the request
        assert_eq!(rules.buffer_for("tx", 8), 8);
        assert_eq!(rules.buffer_for("other", 0), 32);
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let config = PubSubConfig {
            topics: vec![TopicConfig {
                name: "([".into(),
                buffer_size: 1,
            }],
            ..PubSubConfig::default()
        };

        assert!(matches!(
            TopicRules::compile(&config),
            Err(PubSubError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_default_buffer_is_rejected() {
        let config = PubSubConfig {
            default_buffer_size: 0,
            ..PubSubConfig::default()
        };
        assert!(TopicRules::compile(&config).is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: PubSubConfig = serde_json::from_str(
            r#"{"topics":[{"name":"^blocks"}],"subscription_filter":{"pattern":"^b"}}"#,
        )
        .unwrap();

        assert_eq!(config.default_buffer_size, 32);
        assert_eq!(config.publish_timeout_secs, 5);
        assert_eq!(config.topics[0].buffer_size, 0);
        assert_eq!(config.subscription_filter.unwrap().limit, 0);
    }
}
