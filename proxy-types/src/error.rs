use crate::driver::DriverError;
use crate::registry::RegistryError;

/// Domain-level error taxonomy for the proxy. Construction errors are
/// always surfaced to the caller; steady-state errors are surfaced to the
/// caller of the offending operation; the rejoin controller logs and
/// continues on transient registry read errors, only failing the proxy
/// when `minimal_peers` is breached.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    /// Initial registry connection failed. Fatal, raised at construction.
    #[error("registry unreachable: {0}")]
    RegistryUnreachable(#[source] RegistryError),

    /// Unknown `driver_type` was requested. Fatal.
    #[error("unsupported driver type: {0}")]
    DriverTypeUnsupported(String),

    /// Send-class operation targeted an absent peer with rejoin disabled,
    /// or the onboard count for a peer-type fell below `minimal_peers`.
    #[error("peer(s) missing: {0}")]
    PeersMiss(String),

    /// Rendezvous exhausted its retry budget, or address resolution
    /// returned missing/undecodable data.
    #[error("information incomplete: {0}")]
    InformationIncomplete(String),

    /// The driver reported a send failure. Treated as transient; the
    /// caller may retry.
    #[error("driver send failure: {0}")]
    DriverSendFailure(#[source] DriverError),
}

impl From<DriverError> for ProxyError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Send(_) => ProxyError::DriverSendFailure(err),
            DriverError::Connect(msg) => {
                ProxyError::InformationIncomplete(format!("connect failed: {msg}"))
            }
            DriverError::Disconnect(msg) => {
                ProxyError::InformationIncomplete(format!("disconnect failed: {msg}"))
            }
        }
    }
}

impl From<RegistryError> for ProxyError {
    fn from(err: RegistryError) -> Self {
        ProxyError::RegistryUnreachable(err)
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
