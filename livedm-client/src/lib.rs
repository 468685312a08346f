//! # livedm-client
//!
//! Session layer for the live-room push service.
//!
//! This crate provides:
//! - A [`Session`] owning one WebSocket connection, its auth handshake and
//!   heartbeat timer
//! - Linear, capped reconnect backoff driven by an explicit state machine
//! - Single-handler dispatch with owned [`Subscription`] tokens

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod subscription;

pub use config::{ReconnectPolicy, SessionConfig};
pub use error::SessionError;
pub use lifecycle::{ConnectionState, Lifecycle};
pub use livedm_protocol::DecodedPacket;
pub use session::Session;
pub use subscription::{HandlerError, HandlerSlot, Subscription};
