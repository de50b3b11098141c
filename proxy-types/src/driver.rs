//! Contract for the pluggable transport driver. Only a ZeroMQ-style driver
//! is named here; the driver implementation itself is an external
//! collaborator, so this module declares the contract and the
//! `DriverType` selector only.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::message::{Message, SessionId};
use crate::names::ComponentName;

/// Errors a [`TransportDriver`] implementation may report.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("driver send failed: {0}")]
    Send(String),
    #[error("driver connect failed: {0}")]
    Connect(String),
    #[error("driver disconnect failed: {0}")]
    Disconnect(String),
}

/// Selects a concrete driver implementation. Only `ZeroMq` is recognized;
/// other values surface [`proxy_types::error::ProxyError::DriverTypeUnsupported`]
/// (see `Config::driver_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DriverType {
    ZeroMq,
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMq => write!(f, "zeromq"),
        }
    }
}

impl std::str::FromStr for DriverType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zeromq" | "zmq" => Ok(Self::ZeroMq),
            other => Err(other.to_owned()),
        }
    }
}

/// Pluggable peer-to-peer transport. Drivers are free to split one logical
/// send into multiple wire operations, hence `send` returning a list of
/// session ids rather than a single one.
pub trait TransportDriver: Send + Sync {
    /// This node's local receiving address, as published to the registry.
    fn address(&self) -> String;

    /// Open connections to the given peers.
    fn connect(&self, peers: &HashMap<ComponentName, String>) -> Result<(), DriverError>;

    /// Close connections to the given peers.
    fn disconnect(&self, peers: &HashMap<ComponentName, String>) -> Result<(), DriverError>;

    /// Send a unicast message. Returns the session ids the driver reports
    /// for the wire operations it performed; an empty list means the
    /// caller should fall back to `[message.session_id]`.
    fn send(&self, message: Message) -> Result<Vec<SessionId>, DriverError>;

    /// Send a message to the wildcard destination.
    fn broadcast(&self, message: Message) -> Result<(), DriverError>;

    /// Block for up to `timeout` (or indefinitely if `None`) for the next
    /// inbound message. `Ok(None)` means the timeout elapsed with nothing
    /// received.
    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Message>, DriverError>;
}
