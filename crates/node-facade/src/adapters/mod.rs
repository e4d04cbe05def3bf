//! Adapters Layer - Component sets for concrete networking stacks

pub mod memory;

pub use memory::{memory_components, memory_spec};
