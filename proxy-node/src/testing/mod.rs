//! In-process fakes for the `Registry` and `TransportDriver` contracts,
//! built from the same channel/mutex primitives as the rest of this
//! crate rather than a second dependency stack. Used by this crate's own
//! integration tests; not a production registry or network client.

mod driver;
mod registry;

pub use driver::{ChannelDriver, Network};
pub use registry::InMemoryRegistry;
