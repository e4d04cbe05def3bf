//! Domain Layer - Topic rules and subscription filtering
//!
//! - Serializable pubsub configuration and its compiled form
//! - Incoming subscription filter
//! - Session errors

pub mod config;
pub mod errors;
pub mod filter;

pub use config::*;
pub use errors::*;
pub use filter::*;
