//! Fixline client - live event stream for the facility issue tracker
//!
//! This crate keeps a WebSocket connection to the application server open,
//! fans incoming events out to subscribers, and turns repair, issue,
//! inventory and user activity events into notification records for the UI.

pub mod config;
pub mod logging;
pub mod notifications;
pub mod ws;

pub use config::{ClientConfig, ConfigError, Identity};
pub use notifications::{
    InventoryAlerts, IssueActivityAlerts, IssueAlerts, LocaleFormatter, NotificationSettings,
    NotificationSink, PlainFormatter, RepairNotifications, SharedSettings, UserActivityAlerts,
};
pub use ws::{
    ClientEvent, ConnectionState, DisconnectReason, EventClient, Handler, Subscription,
    TransportError,
};
