//! # PubSub Session Subsystem
//!
//! Owns topic and subscription lifecycle on top of a gossip engine.
//!
//! ## Architecture
//!
//! - **Domain Layer:** Topic configuration, buffer rules, subscription filter
//! - **Service Layer:** [`PubSubService`] session state and delivery pumps
//!
//! ```text
//!                      ┌──────────── PubSubService ────────────┐
//! join(name) ────────→ │ topics: name → EngineTopic            │
//! subscribe(name) ───→ │ subscriptions: name → pump + buffer   │──→ TopicSubscription
//! publish(name) ─────→ │ (one tokio RwLock over both maps)     │
//!                      └───────────────────────────────────────┘
//!                                         │
//!                              pump: engine.next() ──try_send──→ buffer (drop on full)
//! ```
//!
//! Per topic: **Unjoined → Joined → (Subscribed ⇄ Unsubscribed) → Closed**.

pub mod domain;
pub mod service;

pub use domain::*;
pub use service::*;
