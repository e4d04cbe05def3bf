//! Domain Layer - Pure connectivity bookkeeping with no I/O
//!
//! - Backoff policy and the LRU-bounded per-peer backoff cache
//! - Tracker, connector and discovery configuration
//! - Batch connection results and errors

pub mod backoff;
pub mod config;
pub mod entities;
pub mod errors;

pub use backoff::*;
pub use config::*;
pub use entities::*;
pub use errors::*;
