//! WebSocket module for the live facility event stream.
//!
//! This module provides:
//! - Connection management with auto-reconnect, backoff and cooldown
//! - An event multiplexer fanning typed messages out to subscribers
//! - A broadcast channel for status changes and raw messages
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   EventClient                       │
//! │   (connect / disconnect / send, reconnect timers)   │
//! └─────────────────────────────────────────────────────┘
//!                         │ inbound frames
//!                         ▼
//!              ┌─────────────────────┐
//!              │     Multiplexer     │
//!              │ (handler registry)  │
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │  handler   │ │  handler   │ │ broadcast  │
//!   │ ("repair_  │ │ ("issue_   │ │ (ClientEv- │
//!   │ scheduled")│ │ updated")  │ │  ent)      │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = EventClient::new(ClientConfig::from_env()?);
//! let _sub = client.on("issue_created", |env| println!("{:?}", env.payload));
//! client.init();
//! ```

mod client;
pub mod connection;
mod multiplexer;

pub use client::EventClient;
pub use connection::{
    ClientEvent, ConnectionState, Connector, DisconnectReason, ReconnectConfig, ReconnectPolicy,
    ReconnectStep, TransportError, TungsteniteConnector,
};
pub use multiplexer::{Handler, HandlerId, Multiplexer, Subscription};
