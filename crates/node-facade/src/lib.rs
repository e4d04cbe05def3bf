//! # Node Facade
//!
//! A P2P node assembled from an external networking stack: connection
//! tracking, backoff-throttled dialing, discovery bridging, pubsub sessions
//! and request/response streams behind one handle.
//!
//! ## Architecture
//!
//! - **Domain Layer:** [`NodeConfig`] (TOML/JSON), node and group errors
//! - **Service Layer:** [`Node`], [`start_nodes`], [`setup_group`]
//! - **Adapters:** [`memory_components`] builds a node on the in-process stack
//!
//! ## Usage
//!
//! ```rust,ignore
//! let network = MemoryNetwork::new();
//! let root = CancellationToken::new();
//! let config = NodeConfig::load("node.toml")?;
//! let node = Node::new(config.clone(), memory_components(&network, &config), &root)?;
//! node.start(None).await?;
//! node.pubsub().subscribe("blocks", 0).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod service;

pub use adapters::{memory_components, memory_spec};
pub use domain::*;
pub use service::*;
