use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::driver::DriverType;
use crate::error::ProxyError;
use crate::names::{ComponentName, GroupName, PeerType};

/// Default RejoinCache capacity. A compile-time constant; not
/// configurable.
pub const DEFAULT_REJOIN_CACHE_CAPACITY: usize = 1024;

/// Default delay after connecting to resolved peers, to let pub/sub-style
/// transports finish subscription handshakes before traffic begins.
pub const DEFAULT_SLOW_JOINER_DELAY: Duration = Duration::from_millis(200);

/// `minimal_peers` may be given as one scalar fraction applied to every
/// peer-type, or as a per-type mapping.
#[derive(Debug, Clone)]
pub enum MinimalPeers {
    Scalar(f64),
    PerType(HashMap<PeerType, f64>),
}

impl Default for MinimalPeers {
    fn default() -> Self {
        // max(1, floor(expected * 0.0)) == 1: by default, every peer-type
        // must keep at least one connected peer before the proxy degrades.
        MinimalPeers::Scalar(0.0)
    }
}

impl MinimalPeers {
    fn fraction_for(&self, peer_type: &PeerType) -> f64 {
        match self {
            MinimalPeers::Scalar(fraction) => *fraction,
            MinimalPeers::PerType(map) => map.get(peer_type).copied().unwrap_or(0.0),
        }
    }

    /// Absolute minimum onboard count for `peer_type`, given its expected
    /// census: `max(1, floor(expected * fraction))`.
    pub fn minimum_for(&self, peer_type: &PeerType, expected_count: usize) -> usize {
        let fraction = self.fraction_for(peer_type);
        let floor = (expected_count as f64 * fraction).floor() as usize;
        floor.max(1)
    }
}

/// Immutable configuration record for a [`crate::proxy::Proxy`] (named in
/// `proxy-node`). Built via [`ConfigBuilder`]; the environment variable
/// `component_name`, if set, overrides any name passed to the builder.
#[derive(Debug, Clone)]
pub struct Config {
    pub group_name: GroupName,
    pub component_type: PeerType,
    pub component_name: ComponentName,
    pub expected_peers: HashMap<PeerType, usize>,
    pub driver_type: String,
    pub driver_parameters: HashMap<String, String>,
    pub registry_address: (String, u16),
    pub max_retries: usize,
    pub base_retry_interval: Duration,
    pub enable_rejoin: bool,
    pub minimal_peers: MinimalPeers,
    pub peer_update_frequency: Duration,
    pub enable_message_cache_for_rejoin: bool,
    pub max_wait_time_for_rejoin: Duration,
    pub log_enable: bool,
    pub rejoin_cache_capacity: usize,
    pub slow_joiner_delay: Duration,
    /// `CONTAINER_NAME`, if set, feeds the container-mapping side map.
    pub container_name: Option<String>,
    /// `JOB_NAME`, if set, feeds the `"{job}:component_name_to_container_name"`
    /// side map key.
    pub job_name: Option<String>,
}

impl Config {
    pub fn builder(
        group_name: impl Into<GroupName>,
        component_type: impl Into<PeerType>,
        expected_peers: HashMap<PeerType, usize>,
    ) -> ConfigBuilder {
        ConfigBuilder::new(group_name.into(), component_type.into(), expected_peers)
    }

    /// Parse and validate `driver_type`, surfacing `DriverTypeUnsupported`
    /// for anything this crate doesn't recognize.
    pub fn driver_type(&self) -> Result<DriverType, ProxyError> {
        DriverType::from_str(&self.driver_type)
            .map_err(|unknown| ProxyError::DriverTypeUnsupported(unknown))
    }

    pub fn minimal_peers_for(&self, peer_type: &PeerType) -> usize {
        let expected = self.expected_peers.get(peer_type).copied().unwrap_or(0);
        self.minimal_peers.minimum_for(peer_type, expected)
    }
}

/// Builder for [`Config`]. Fields not set take the documented defaults.
pub struct ConfigBuilder {
    group_name: GroupName,
    component_type: PeerType,
    component_name: Option<ComponentName>,
    expected_peers: HashMap<PeerType, usize>,
    driver_type: String,
    driver_parameters: HashMap<String, String>,
    registry_address: (String, u16),
    max_retries: usize,
    base_retry_interval: Duration,
    enable_rejoin: bool,
    minimal_peers: MinimalPeers,
    peer_update_frequency: Duration,
    enable_message_cache_for_rejoin: bool,
    max_wait_time_for_rejoin: Duration,
    log_enable: bool,
    rejoin_cache_capacity: usize,
    slow_joiner_delay: Duration,
    container_name: Option<String>,
    job_name: Option<String>,
}

impl ConfigBuilder {
    fn new(
        group_name: GroupName,
        component_type: PeerType,
        expected_peers: HashMap<PeerType, usize>,
    ) -> Self {
        Self {
            group_name,
            component_type,
            component_name: None,
            expected_peers,
            driver_type: "zeromq".to_owned(),
            driver_parameters: HashMap::new(),
            registry_address: ("127.0.0.1".to_owned(), 6379),
            max_retries: 5,
            base_retry_interval: Duration::from_millis(100),
            enable_rejoin: false,
            minimal_peers: MinimalPeers::default(),
            peer_update_frequency: Duration::from_secs(15),
            enable_message_cache_for_rejoin: true,
            max_wait_time_for_rejoin: Duration::from_secs(30),
            log_enable: true,
            rejoin_cache_capacity: DEFAULT_REJOIN_CACHE_CAPACITY,
            slow_joiner_delay: DEFAULT_SLOW_JOINER_DELAY,
            container_name: std::env::var("CONTAINER_NAME").ok(),
            job_name: std::env::var("JOB_NAME").ok(),
        }
    }

    pub fn component_name(mut self, name: impl Into<ComponentName>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    pub fn driver_type(mut self, driver_type: impl Into<String>) -> Self {
        self.driver_type = driver_type.into();
        self
    }

    pub fn driver_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.driver_parameters = parameters;
        self
    }

    pub fn registry_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.registry_address = (host.into(), port);
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_retry_interval(mut self, interval: Duration) -> Self {
        self.base_retry_interval = interval;
        self
    }

    pub fn enable_rejoin(mut self, enable: bool) -> Self {
        self.enable_rejoin = enable;
        self
    }

    pub fn minimal_peers(mut self, minimal_peers: MinimalPeers) -> Self {
        self.minimal_peers = minimal_peers;
        self
    }

    pub fn peer_update_frequency(mut self, frequency: Duration) -> Self {
        self.peer_update_frequency = frequency;
        self
    }

    pub fn enable_message_cache_for_rejoin(mut self, enable: bool) -> Self {
        self.enable_message_cache_for_rejoin = enable;
        self
    }

    pub fn max_wait_time_for_rejoin(mut self, duration: Duration) -> Self {
        self.max_wait_time_for_rejoin = duration;
        self
    }

    pub fn log_enable(mut self, enable: bool) -> Self {
        self.log_enable = enable;
        self
    }

    pub fn rejoin_cache_capacity(mut self, capacity: usize) -> Self {
        self.rejoin_cache_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        // The `component_name` environment variable, if set, overrides
        // whatever name the host passed to the builder.
        let component_name = std::env::var("component_name")
            .ok()
            .map(ComponentName::from)
            .or(self.component_name)
            .unwrap_or_else(|| ComponentName::new(generate_component_name(&self.component_type)));

        Config {
            group_name: self.group_name,
            component_type: self.component_type,
            component_name,
            expected_peers: self.expected_peers,
            driver_type: self.driver_type,
            driver_parameters: self.driver_parameters,
            registry_address: self.registry_address,
            max_retries: self.max_retries,
            base_retry_interval: self.base_retry_interval,
            enable_rejoin: self.enable_rejoin,
            minimal_peers: self.minimal_peers,
            peer_update_frequency: self.peer_update_frequency,
            enable_message_cache_for_rejoin: self.enable_message_cache_for_rejoin,
            max_wait_time_for_rejoin: self.max_wait_time_for_rejoin,
            log_enable: self.log_enable,
            rejoin_cache_capacity: self.rejoin_cache_capacity,
            slow_joiner_delay: self.slow_joiner_delay,
            container_name: self.container_name,
            job_name: self.job_name,
        }
    }
}

fn generate_component_name(component_type: &PeerType) -> String {
    let rng = fastrand::Rng::new();
    format!("{component_type}-{:08x}", rng.u32(..))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_peers_scalar_floors_and_enforces_at_least_one() {
        let minimal = MinimalPeers::Scalar(0.6);
        let actor = PeerType::new("actor");
        assert_eq!(minimal.minimum_for(&actor, 2), 1);
        assert_eq!(minimal.minimum_for(&actor, 5), 3);
        assert_eq!(minimal.minimum_for(&actor, 0), 1);
    }

    #[test]
    fn driver_type_rejects_unknown_variant() {
        let config = Config::builder("g", "actor", HashMap::new())
            .driver_type("carrier-pigeon")
            .build();
        assert!(matches!(
            config.driver_type(),
            Err(ProxyError::DriverTypeUnsupported(_))
        ));
    }

    #[test]
    fn builder_defaults_apply() {
        let config = Config::builder("g", "actor", HashMap::new()).build();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.rejoin_cache_capacity, DEFAULT_REJOIN_CACHE_CAPACITY);
        assert!(!config.enable_rejoin);
    }
}
