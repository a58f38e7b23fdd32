//! The `transport` module binds real-time connections to the dispatch
//! core.
//!
//! It defines the inbound protocol participants speak, the token-based
//! identity adapter, the [`RealtimeGateway`] that routes messages and
//! checks subscriptions, and the WebSocket server itself.

pub mod auth;
pub mod gateway;
pub mod message;
pub mod websocket;

pub use auth::TokenAuthority;
pub use gateway::{Access, RealtimeGateway, access};
pub use message::{Claims, ClientMessage};
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;
