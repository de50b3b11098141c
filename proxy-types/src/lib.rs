//! Data model, error taxonomy and external contracts for the peer-to-peer
//! rendezvous proxy. See `proxy-node` for the rendezvous, session-routing
//! and rejoin logic built on top of these types.

#[cfg(feature = "quickcheck")]
mod arbitrary;

pub mod config;
pub mod driver;
pub mod error;
pub mod message;
pub mod names;
pub mod peer;
pub mod registry;

pub use config::{Config, ConfigBuilder, MinimalPeers};
pub use driver::{DriverError, DriverType, TransportDriver};
pub use error::{ProxyError, Result};
pub use message::{Destination, Message, Payload, SessionId, SessionStage, SessionType, Tag};
pub use names::{ComponentName, GroupName, PeerType};
pub use peer::{OnboardSet, PeerInfo, PeerSockets};
pub use registry::{Registry, RegistryError};
