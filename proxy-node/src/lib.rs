//! Rendezvous, session routing and rejoin logic for a peer-to-peer group
//! proxy. Built on the data model and external contracts declared by
//! `proxy-types`. See that crate's docs for `Config`, `Message`, `Registry`
//! and `TransportDriver`; this crate wires them into the four components
//! described in the system overview (Rendezvous, SessionRouter,
//! RejoinController, LifecycleHooks) and the `Proxy` facade that combines
//! them.

mod backoff;
pub mod lifecycle;
pub mod proxy;
pub mod rejoin;
pub mod rendezvous;
pub mod session;
pub mod testing;

pub use lifecycle::LifecycleHooks;
pub use proxy::Proxy;
pub use rejoin::{RejoinCache, RejoinController};
pub use rendezvous::Rendezvous;
pub use session::SessionRouter;
