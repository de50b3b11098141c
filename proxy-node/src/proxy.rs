use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::info;
use proxy_types::{
    ComponentName, Config, OnboardSet, PeerInfo, PeerSockets, PeerType, ProxyError, Registry,
    TransportDriver,
};

use crate::lifecycle::LifecycleHooks;
use crate::rejoin::{RejoinCache, RejoinController};
use crate::rendezvous::Rendezvous;
use crate::session::SessionRouter;

/// Facade composing Rendezvous, SessionRouter, RejoinController and
/// LifecycleHooks into the single object a host process embeds.
///
/// Constructed by [`Proxy::join`], which blocks until the expected peer
/// census is reached (or fails with `InformationIncomplete`); valid for the
/// lifetime between that call returning and [`Proxy::shutdown`].
pub struct Proxy {
    config: Arc<Config>,
    onboard: Arc<Mutex<OnboardSet>>,
    sockets: Arc<Mutex<PeerSockets>>,
    degraded: Arc<AtomicBool>,
    router: Arc<SessionRouter>,
    rejoin: Option<RejoinController>,
    lifecycle: Arc<LifecycleHooks>,
}

impl Proxy {
    /// Construct a proxy and run Rendezvous to completion: register self,
    /// block until every expected peer-type's census is met, resolve
    /// addresses, and connect the transport driver.
    pub fn join(
        config: Config,
        registry: Arc<dyn Registry>,
        driver: Arc<dyn TransportDriver>,
    ) -> Result<Self, ProxyError> {
        // Fail fast on an unrecognized driver type before touching the
        // registry or the driver at all: this is a construction-time error.
        config.driver_type()?;
        let config = Arc::new(config);

        let peer_infos: Vec<PeerInfo> = config
            .expected_peers
            .iter()
            .map(|(peer_type, count)| PeerInfo::new(&config.group_name, peer_type.clone(), *count))
            .collect();

        let rendezvous = Rendezvous::new(config.clone(), registry.clone(), driver.clone());
        let (onboard, sockets) = rendezvous.join(&peer_infos)?;
        let onboard = Arc::new(Mutex::new(onboard));
        let sockets = Arc::new(Mutex::new(sockets));
        let degraded = Arc::new(AtomicBool::new(false));

        let rejoin_cache = if config.enable_rejoin && config.enable_message_cache_for_rejoin {
            Some(Arc::new(Mutex::new(RejoinCache::new(
                config.rejoin_cache_capacity,
            ))))
        } else {
            None
        };

        let router = Arc::new(SessionRouter::new(
            config.clone(),
            driver.clone(),
            onboard.clone(),
            sockets.clone(),
            rejoin_cache.clone(),
            degraded.clone(),
            config.component_name.clone(),
        ));

        let rejoin = config.enable_rejoin.then(|| {
            RejoinController::spawn(
                config.clone(),
                registry.clone(),
                driver.clone(),
                peer_infos.clone(),
                onboard.clone(),
                sockets.clone(),
                rejoin_cache.clone(),
                degraded.clone(),
                router.clone(),
            )
        });

        let lifecycle = Arc::new(LifecycleHooks::new(config.clone(), registry));

        info!(
            "proxy {} joined group {} as {}",
            config.component_name, config.group_name, config.component_type
        );

        Ok(Self {
            config,
            onboard,
            sockets,
            degraded,
            router,
            rejoin,
            lifecycle,
        })
    }

    /// The session-oriented messaging API.
    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    /// Component names currently onboard for `peer_type`.
    pub fn peers(&self, peer_type: &PeerType) -> Vec<ComponentName> {
        self.onboard.lock().unwrap().names_for(peer_type).to_vec()
    }

    /// Whether the proxy is currently degraded (some peer-type's onboard
    /// count has fallen below `minimal_peers`).
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle to the shared lifecycle hooks, so a host binary can wire
    /// `SIGTERM`/`SIGINT` to [`LifecycleHooks::run`] independently of an
    /// explicit [`Proxy::shutdown`] call; both paths are idempotent and
    /// safe to invoke from either place.
    pub fn lifecycle(&self) -> Arc<LifecycleHooks> {
        self.lifecycle.clone()
    }

    /// Orderly shutdown: stop the rejoin controller's thread (if running)
    /// and deregister from the registry. Idempotent.
    pub fn shutdown(&self) {
        if let Some(rejoin) = &self.rejoin {
            rejoin.stop();
        }
        self.lifecycle.run();
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.shutdown();
    }
}
