use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as chan;
use log::{debug, error, warn};
use proxy_types::{
    Config, ComponentName, Destination, Message, OnboardSet, PeerInfo, PeerSockets, Registry,
    TransportDriver,
};

use crate::session::SessionRouter;

/// Bounded FIFO of `(destination, message)` pairs held for peers presently
/// off-roster. Oldest entry is evicted on overflow.
pub struct RejoinCache {
    capacity: usize,
    entries: VecDeque<(ComponentName, Message)>,
}

impl RejoinCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enqueue `message` for `destination`, evicting the oldest entry first
    /// if the cache is already at capacity.
    pub fn push(&mut self, destination: ComponentName, message: Message) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((destination, message));
    }

    /// Remove and return every entry targeting `name`, in FIFO order,
    /// leaving entries for other destinations untouched and in order.
    pub fn drain_for(&mut self, name: &ComponentName) -> Vec<Message> {
        let mut drained = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.entries.len());
        for (dest, message) in self.entries.drain(..) {
            if &dest == name {
                drained.push(message);
            } else {
                remaining.push_back((dest, message));
            }
        }
        self.entries = remaining;
        drained
    }
}

/// Per-peer-type name/address delta computed by one reconcile pass.
struct Delta {
    new: Vec<(ComponentName, String)>,
    restarted: Vec<(ComponentName, String, String)>,
    exited: Vec<(ComponentName, String)>,
}

/// Periodically reconciles the local onboard view with the registry,
/// running on its own thread so it shares the membership/cache structures
/// with the caller thread(s) behind a mutex rather than blocking send-class
/// calls.
pub struct RejoinController {
    shutdown: chan::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RejoinController {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: Arc<Config>,
        registry: Arc<dyn Registry>,
        driver: Arc<dyn TransportDriver>,
        peer_infos: Vec<PeerInfo>,
        onboard: Arc<Mutex<OnboardSet>>,
        sockets: Arc<Mutex<PeerSockets>>,
        rejoin_cache: Option<Arc<Mutex<RejoinCache>>>,
        degraded: Arc<AtomicBool>,
        router: Arc<SessionRouter>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = chan::bounded(0);
        let worker = Worker {
            config,
            registry,
            driver,
            peer_infos,
            onboard,
            sockets,
            rejoin_cache,
            degraded,
            router,
        };
        let handle = std::thread::Builder::new()
            .name("rejoin-controller".into())
            .spawn(move || worker.run(shutdown_rx))
            .expect("failed to spawn rejoin-controller thread");
        Self {
            shutdown: shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the reconcile loop and join its thread. Idempotent: calling this
    /// more than once is a no-op after the first call.
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().unwrap().take() else {
            return;
        };
        // The worker may already have observed shutdown via a closed
        // channel; ignore a send error, it just means it got there first.
        let _ = self.shutdown.send(());
        let _ = handle.join();
    }
}

impl Drop for RejoinController {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    config: Arc<Config>,
    registry: Arc<dyn Registry>,
    driver: Arc<dyn TransportDriver>,
    peer_infos: Vec<PeerInfo>,
    onboard: Arc<Mutex<OnboardSet>>,
    sockets: Arc<Mutex<PeerSockets>>,
    rejoin_cache: Option<Arc<Mutex<RejoinCache>>>,
    degraded: Arc<AtomicBool>,
    router: Arc<SessionRouter>,
}

impl Worker {
    fn run(self, shutdown: chan::Receiver<()>) {
        let tick = chan::tick(self.config.peer_update_frequency);
        loop {
            chan::select! {
                recv(shutdown) -> _ => {
                    debug!("rejoin-controller: shutdown requested");
                    return;
                }
                recv(tick) -> _ => {
                    self.reconcile();
                }
            }
        }
    }

    /// One reconcile pass. Transient registry read errors are logged
    /// and the affected peer-type is skipped for this tick rather than
    /// aborting the whole pass.
    fn reconcile(&self) {
        let mut to_drain = Vec::new();
        for info in &self.peer_infos {
            let registry_view = match self.registry.hgetall(&info.registry_key) {
                Ok(pairs) => pairs,
                Err(err) => {
                    error!(
                        "rejoin: failed to read registry for peer-type {}: {err}",
                        info.peer_type
                    );
                    continue;
                }
            };
            let mut decoded = HashMap::with_capacity(registry_view.len());
            for (name, raw_address) in registry_view {
                match serde_json::from_str::<String>(&raw_address) {
                    Ok(address) => {
                        decoded.insert(ComponentName::from(name), address);
                    }
                    Err(err) => {
                        error!("rejoin: undecodable address for peer {name}: {err}");
                    }
                }
            }
            let delta = self.compute_delta(&info.peer_type, &decoded);
            to_drain.extend(self.apply_delta(&info.peer_type, delta));
        }

        // Recompute `degraded` before replaying cached sends, so a peer that
        // reconnects this tick doesn't have its own buffered messages
        // rejected by a degraded flag that this same reconcile pass clears.
        self.enforce_minimal_peers();

        for name in to_drain {
            self.drain_and_dispatch(&name);
        }
    }

    fn compute_delta(
        &self,
        peer_type: &proxy_types::PeerType,
        registry_view: &HashMap<ComponentName, String>,
    ) -> Delta {
        let onboard = self.onboard.lock().unwrap();
        let sockets = self.sockets.lock().unwrap();
        let onboard_names = onboard.names_for(peer_type);

        let mut new = Vec::new();
        let mut restarted = Vec::new();
        for (name, address) in registry_view {
            if !onboard.contains(name) {
                new.push((name.clone(), address.clone()));
            } else if sockets.get(name) != Some(address.as_str()) {
                let old = sockets.get(name).unwrap_or_default().to_owned();
                restarted.push((name.clone(), old, address.clone()));
            }
        }

        let mut exited = Vec::new();
        for name in onboard_names {
            if !registry_view.contains_key(name) {
                let old = sockets.get(name).unwrap_or_default().to_owned();
                exited.push((name.clone(), old));
            }
        }

        Delta {
            new,
            restarted,
            exited,
        }
    }

    /// Apply a peer-type's delta and return the names whose rejoin cache
    /// should be drained. Draining itself is deferred to the caller, which
    /// runs it only after `enforce_minimal_peers` has recomputed `degraded`
    /// for this tick.
    fn apply_delta(&self, peer_type: &proxy_types::PeerType, delta: Delta) -> Vec<ComponentName> {
        let mut to_drain = Vec::new();

        for (name, address) in delta.new {
            let mut peers = HashMap::with_capacity(1);
            peers.insert(name.clone(), address.clone());
            if let Err(err) = self.driver.connect(&peers) {
                error!("rejoin: failed to connect to new peer {name}: {err}");
                continue;
            }
            debug!("rejoin: peer {name} ({peer_type}) joined at {address}");
            self.onboard
                .lock()
                .unwrap()
                .insert(peer_type.clone(), name.clone());
            self.sockets
                .lock()
                .unwrap()
                .insert(name.clone(), address.clone());
            to_drain.push(name);
        }

        // Connect to the new address and drain the cache before tearing
        // down the old connection, so a burst of buffered sends survives
        // even if `disconnect` later fails.
        for (name, old_address, new_address) in delta.restarted {
            let mut new_peers = HashMap::with_capacity(1);
            new_peers.insert(name.clone(), new_address.clone());
            if let Err(err) = self.driver.connect(&new_peers) {
                error!("rejoin: failed to reconnect restarted peer {name}: {err}");
                continue;
            }
            debug!("rejoin: peer {name} ({peer_type}) restarted at {new_address}");
            self.sockets
                .lock()
                .unwrap()
                .insert(name.clone(), new_address.clone());
            to_drain.push(name.clone());

            let mut old_peers = HashMap::with_capacity(1);
            old_peers.insert(name.clone(), old_address);
            if let Err(err) = self.driver.disconnect(&old_peers) {
                error!("rejoin: failed to disconnect stale session for {name}: {err}");
            }
        }

        for (name, address) in delta.exited {
            let mut peers = HashMap::with_capacity(1);
            peers.insert(name.clone(), address);
            if let Err(err) = self.driver.disconnect(&peers) {
                error!("rejoin: failed to disconnect exited peer {name}: {err}");
            }
            debug!("rejoin: peer {name} ({peer_type}) exited");
            self.onboard.lock().unwrap().remove(&name);
            self.sockets.lock().unwrap().remove(&name);
        }

        to_drain
    }

    /// Drain the rejoin cache for `name` (if configured) and dispatch the
    /// buffered messages via the shared `SessionRouter`, now that the peer
    /// is onboard and the gate will let them through.
    fn drain_and_dispatch(&self, name: &ComponentName) {
        let Some(cache) = &self.rejoin_cache else {
            return;
        };
        let drained = cache.lock().unwrap().drain_for(name);
        if drained.is_empty() {
            return;
        }
        debug!(
            "rejoin: dispatching {} cached message(s) for {name}",
            drained.len()
        );
        for message in drained {
            debug_assert!(matches!(&message.destination, Destination::Peer(d) if d == name));
            if let Err(err) = self.router.isend(message) {
                warn!("rejoin: failed to dispatch cached message to {name}: {err}");
            }
        }
    }

    /// Enforce `minimal_peers`: if any peer-type's onboard count has
    /// fallen below its minimum, mark the proxy degraded so send-class
    /// operations fail fast; clear the flag once every peer-type
    /// recovers.
    fn enforce_minimal_peers(&self) {
        let onboard = self.onboard.lock().unwrap();
        let mut breached = None;
        for info in &self.peer_infos {
            let minimum = self.config.minimal_peers_for(&info.peer_type);
            let count = onboard.count(&info.peer_type);
            if count < minimum {
                breached = Some((info.peer_type.clone(), count, minimum));
                break;
            }
        }
        drop(onboard);

        match breached {
            Some((peer_type, count, minimum)) => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    warn!(
                        "rejoin: proxy degraded, peer-type {peer_type} has {count}/{minimum} minimal peers"
                    );
                }
            }
            None => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    debug!("rejoin: proxy recovered above minimal_peers thresholds");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_types::{SessionId, SessionStage, SessionType, Tag};

    fn message(dest: &str, sid: &str) -> Message {
        Message {
            tag: Tag::new("t"),
            source: ComponentName::new("self"),
            destination: Destination::Peer(ComponentName::new(dest)),
            session_id: SessionId::new(sid),
            session_type: SessionType::Task,
            session_stage: SessionStage::Request,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut cache = RejoinCache::new(2);
        cache.push(ComponentName::new("a1"), message("a1", "1"));
        cache.push(ComponentName::new("a1"), message("a1", "2"));
        cache.push(ComponentName::new("a1"), message("a1", "3"));
        assert_eq!(cache.len(), 2);
        let drained = cache.drain_for(&ComponentName::new("a1"));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].session_id.as_str(), "2");
        assert_eq!(drained[1].session_id.as_str(), "3");
    }

    #[test]
    fn drain_only_targets_requested_destination() {
        let mut cache = RejoinCache::new(8);
        cache.push(ComponentName::new("a1"), message("a1", "1"));
        cache.push(ComponentName::new("a2"), message("a2", "2"));
        cache.push(ComponentName::new("a1"), message("a1", "3"));
        let drained = cache.drain_for(&ComponentName::new("a1"));
        assert_eq!(drained.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[quickcheck_macros::quickcheck]
    fn capacity_never_exceeded(pushes: Vec<u8>) -> bool {
        let mut cache = RejoinCache::new(4);
        for (i, byte) in pushes.iter().enumerate() {
            cache.push(ComponentName::new(format!("p{byte}")), message("x", &i.to_string()));
            if cache.len() > 4 {
                return false;
            }
        }
        true
    }
}
