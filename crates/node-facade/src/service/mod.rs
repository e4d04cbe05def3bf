//! Service Layer - Node lifecycle and group bootstrap

mod components;
mod group;
mod node;


pub use components::{NodeComponents, NodeSpec};
pub use group::{setup_group, DiscoveryBarrier, GroupConfig};
pub use node::{start_nodes, Node};
