use std::sync::Arc;
use std::thread;

use log::{debug, warn};
use proxy_types::{Config, ComponentName, OnboardSet, PeerInfo, PeerSockets, ProxyError, Registry, TransportDriver};

use crate::backoff::delay_for_attempt;

/// Publishes this proxy to the registry, blocks until the expected peer
/// census is reached, resolves addresses, and connects the transport
/// driver to every resolved peer.
pub struct Rendezvous {
    config: Arc<Config>,
    registry: Arc<dyn Registry>,
    driver: Arc<dyn TransportDriver>,
}

impl Rendezvous {
    pub fn new(config: Arc<Config>, registry: Arc<dyn Registry>, driver: Arc<dyn TransportDriver>) -> Self {
        Self {
            config,
            registry,
            driver,
        }
    }

    /// Run the join protocol for the given expected peer-types. Returns the
    /// resulting onboard view and the driver connections made to reach it.
    pub fn join(&self, peer_infos: &[PeerInfo]) -> Result<(OnboardSet, PeerSockets), ProxyError> {
        let local_address = self.driver.address();
        let self_key = self
            .config
            .group_name
            .roster_key(&self.config.component_type);
        let encoded_address = serde_json::to_string(&local_address).map_err(|err| {
            ProxyError::InformationIncomplete(format!("failed to encode local address: {err}"))
        })?;
        self.registry
            .hset(&self_key, self.config.component_name.as_str(), &encoded_address)?;

        let mut onboard = OnboardSet::new();
        let mut sockets = PeerSockets::new();

        for info in peer_infos {
            let names = self.poll_for_census(info)?;
            let fields: Vec<String> = names.iter().map(|n| n.to_string()).collect();
            let raw = self.registry.hmget(&info.registry_key, &fields)?;

            for (name, raw_address) in names.iter().zip(raw) {
                let raw_address = raw_address.ok_or_else(|| {
                    ProxyError::InformationIncomplete(format!(
                        "no address registered for peer {name} ({})",
                        info.peer_type
                    ))
                })?;
                let address: String = serde_json::from_str(&raw_address).map_err(|err| {
                    ProxyError::InformationIncomplete(format!(
                        "undecodable address for peer {name}: {err}"
                    ))
                })?;
                onboard.insert(info.peer_type.clone(), name.clone());
                sockets.insert(name.clone(), address);
            }
        }

        self.driver.connect(sockets.as_map())?;

        // Slow-joiner delay: pub/sub-style transports silently drop
        // messages sent before a subscriber's filter has propagated.
        thread::sleep(self.config.slow_joiner_delay);

        if self.config.enable_rejoin {
            if let Some(container) = &self.config.container_name {
                let encoded_container = serde_json::to_string(container).map_err(|err| {
                    ProxyError::InformationIncomplete(format!(
                        "failed to encode container name: {err}"
                    ))
                })?;
                self.registry.hset(
                    "component-container-mapping",
                    self.config.component_name.as_str(),
                    &encoded_container,
                )?;
                if let Some(job) = &self.config.job_name {
                    let key = format!("{job}:component_name_to_container_name");
                    self.registry
                        .hset(&key, self.config.component_name.as_str(), &encoded_container)?;
                }
            }
        }

        Ok((onboard, sockets))
    }

    /// Poll the registry for `info`'s roster until its census is met, using
    /// exponential backoff. Selects the first `expected_count` names in
    /// registry order once satisfied (tie-break on over-subscription).
    fn poll_for_census(&self, info: &PeerInfo) -> Result<Vec<ComponentName>, ProxyError> {
        for attempt in 0..self.config.max_retries {
            let seen = self.registry.hlen(&info.registry_key)?;
            if seen >= info.expected_count {
                let mut names = self.registry.hkeys(&info.registry_key)?;
                if names.len() > info.expected_count {
                    debug!(
                        "join: registry reports {} peers for {}, more than expected {}; truncating",
                        names.len(),
                        info.peer_type,
                        info.expected_count
                    );
                }
                names.truncate(info.expected_count);
                return Ok(names.into_iter().map(ComponentName::from).collect());
            }
            debug!(
                "join: attempt {}/{} for peer-type {} ({}/{})",
                attempt + 1,
                self.config.max_retries,
                info.peer_type,
                seen,
                info.expected_count
            );
            if attempt + 1 < self.config.max_retries {
                thread::sleep(delay_for_attempt(self.config.base_retry_interval, attempt as u32));
            }
        }
        warn!(
            "join: exhausted {} retries waiting for peer-type {}",
            self.config.max_retries, info.peer_type
        );
        Err(ProxyError::InformationIncomplete(format!(
            "peer-type {} did not reach expected census of {}",
            info.peer_type, info.expected_count
        )))
    }
}
