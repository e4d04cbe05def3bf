//! Service Layer - Session state and delivery pumps

mod session;
mod subscription;

pub use session::PubSubService;
pub use subscription::{MessageHandler, TopicSubscription};
