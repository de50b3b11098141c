//! Contract for the shared key-value registry the rendezvous protocol is
//! built against. The registry itself — a hash-map-valued key-value store —
//! is an external collaborator; this module only declares the operations
//! the core requires of it.

/// Errors a [`Registry`] implementation may report.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")]
    Unreachable(String),
    #[error("registry operation failed: {0}")]
    Operation(String),
}

/// A key-value store with hash-map-valued keys: `hset`/`hdel`/`hmget`/
/// `hlen`/`hkeys`/`hgetall` over string fields and JSON-encoded string
/// values.
///
/// Implementations must preserve field insertion order for `hkeys` and
/// `hgetall`, since that order is used to break ties when more peers than
/// expected are registered.
pub trait Registry: Send + Sync {
    /// Set `field` to `value` within the hash-map at `key`.
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), RegistryError>;

    /// Remove `field` from the hash-map at `key`, if present.
    fn hdel(&self, key: &str, field: &str) -> Result<(), RegistryError>;

    /// Fetch the values of `fields` from the hash-map at `key`, in the same
    /// order as `fields`. Missing fields come back as `None`.
    fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>, RegistryError>;

    /// Number of fields currently set in the hash-map at `key`.
    fn hlen(&self, key: &str) -> Result<usize, RegistryError>;

    /// Field names in the hash-map at `key`, in insertion order.
    fn hkeys(&self, key: &str) -> Result<Vec<String>, RegistryError>;

    /// All (field, value) pairs in the hash-map at `key`, in insertion
    /// order.
    fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, RegistryError>;
}
