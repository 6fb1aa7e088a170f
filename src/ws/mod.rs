//! Self-healing WebSocket subscriptions.
//!
//! # Architecture
//!
//! - [`connect`]: Opens a subscription and returns its [`Subscription`] handle
//! - [`Handler`]: Receives lifecycle and data events; [`Callbacks`] adapts plain closures
//! - [`message`]: Decodes inbound frames into [`Reading`]s
//!
//! Every subscription owns one socket at a time. When the socket closes for any reason the
//! handler hears about it once through [`Handler::on_disconnected`], and a new connection is
//! attempted after the configured delay until the subscription is disposed.

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;

pub use config::{Config, ReconnectConfig};
pub use connection::{ConnectionState, Subscription, connect};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use handler::{Callbacks, Event, Handler};
pub use message::{InboundMessage, Reading};
