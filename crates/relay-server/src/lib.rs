//! # relay-server
//!
//! Axum HTTP + WebSocket fan-out relay.
//!
//! - [`hub`] — client registry and serial broadcast event loop
//! - [`client`] — per-connection state and bounded outbound queue
//! - [`websocket`] — upgrade handler and the inbound/outbound pump pair
//! - [`server`] — router, listener, static files, health endpoint
//! - [`config`] — tunables with documented defaults
//!
//! Data flow: upgrade → `Client` registers with the [`hub::Hub`] →
//! inbound pump posts decoded messages to the broadcast channel → the hub
//! fans each message out to every registered client's queue → each
//! outbound pump drains its own queue onto its own socket.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod health;
pub mod hub;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use hub::{Hub, HubHandle};
pub use server::{start, ServerHandle};
