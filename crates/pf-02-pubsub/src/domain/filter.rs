//! Subscription filter.
//!
//! Decides which topics this node joins and which subscription
//! announcements from a remote peer it keeps. Patterns are unanchored
//! regular expressions.

use regex::Regex;
use std::collections::HashMap;

use crate::domain::errors::PubSubError;

/// One entry of a peer's subscription announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubOpts {
    pub topic: String,
    pub subscribe: bool,
}

impl SubOpts {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscribe: true,
        }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscribe: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    pattern: Regex,
    limit: usize,
}

impl SubscriptionFilter {
    pub fn new(pattern: &str, limit: usize) -> Result<Self, PubSubError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| PubSubError::InvalidConfig(format!("subscription filter: {e}")))?;
        Ok(Self { pattern, limit })
    }

    #[must_use]
    pub fn can_subscribe(&self, topic: &str) -> bool {
        self.pattern.is_match(topic)
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Filter a peer's subscription batch.
    ///
    /// The limit applies to the raw batch. A subscribe and an unsubscribe
    /// for the same topic in one batch cancel out; repeats of the same
    /// action collapse into one entry.
    pub fn filter_incoming(&self, incoming: Vec<SubOpts>) -> Result<Vec<SubOpts>, PubSubError> {
        if self.limit > 0 && incoming.len() > self.limit {
            return Err(PubSubError::TooManySubscriptions {
                count: incoming.len(),
                limit: self.limit,
            });
        }

        let mut order = Vec::new();
        let mut accepted: HashMap<String, Option<SubOpts>> = HashMap::new();
        for opts in incoming {
            if !self.can_subscribe(&opts.topic) {
                continue;
            }
            match accepted.get_mut(&opts.topic) {
                Some(slot) => match slot.as_ref().map(|seen| seen.subscribe) {
                    Some(seen) if seen != opts.subscribe => *slot = None,
                    Some(_) => {}
                    None => *slot = Some(opts),
                },
                None => {
                    order.push(opts.topic.clone());
                    accepted.insert(opts.topic.clone(), Some(opts));
                }
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|topic| accepted.remove(&topic).flatten())
            .collect())
    }
}
