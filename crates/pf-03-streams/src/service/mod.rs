//! Service Layer - Both ends of a request/response exchange

mod framing;
mod inbound;
mod outbound;

pub use inbound::{handle_stream, request_handler, InboundRequest};
pub use outbound::request;
