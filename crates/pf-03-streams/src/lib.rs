//! # Point-to-Point Stream Protocol
//!
//! One request, one response, one stream. Messages are framed with a
//! big-endian `u32` length prefix.
//!
//! ## Architecture
//!
//! ```text
//! requester                                      responder
//! ─────────                                      ─────────
//! request()                                      handle_stream()
//!   new_stream ─────────── open ───────────────→   (host spawns handler)
//!   write frame ────────── request ────────────→   read frame
//!   shutdown write half                            InboundRequest::respond()
//!   read frame ←────────── response ────────────     write frame
//!   drop stream                                    InboundRequest::close()
//! ```
//!
//! Every phase runs under the configured timeout. Success and failure are
//! counted per protocol, failures per phase (`open`, `read`, `write`,
//! `close_write`, `close`). Streams are released on every exit path.

pub mod domain;
pub mod service;

pub use domain::*;
pub use service::*;
