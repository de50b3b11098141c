use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::warn;
use proxy_types::{
    Config, ComponentName, Destination, DriverError, Message, OnboardSet, Payload, PeerSockets,
    ProxyError, SessionId, SessionStage, SessionType, Tag, TransportDriver,
};

use crate::rejoin::RejoinCache;

/// Outcome of the peer-existence gate for a single send-class operation.
enum Gate {
    /// The peer is onboard (or the destination is the broadcast wildcard);
    /// proceed to call the driver.
    Proceed,
    /// The peer was absent but rejoin + the RejoinCache are enabled; the
    /// message was buffered and the caller should return its session id
    /// without touching the driver.
    Buffered(SessionId),
}

/// Send/scatter/broadcast with session correlation, backed by an
/// out-of-order message cache.
pub struct SessionRouter {
    config: Arc<Config>,
    driver: Arc<dyn TransportDriver>,
    onboard: Arc<Mutex<OnboardSet>>,
    #[allow(dead_code)]
    sockets: Arc<Mutex<PeerSockets>>,
    rejoin_cache: Option<Arc<Mutex<RejoinCache>>>,
    degraded: Arc<AtomicBool>,
    message_cache: Mutex<HashMap<SessionId, Vec<Message>>>,
    // `fastrand::Rng` is not `Sync`; wrap it so `SessionRouter` can be
    // shared (via `Arc`) between caller threads and the rejoin controller.
    rng: Mutex<fastrand::Rng>,
    self_name: ComponentName,
}

impl SessionRouter {
    pub fn new(
        config: Arc<Config>,
        driver: Arc<dyn TransportDriver>,
        onboard: Arc<Mutex<OnboardSet>>,
        sockets: Arc<Mutex<PeerSockets>>,
        rejoin_cache: Option<Arc<Mutex<RejoinCache>>>,
        degraded: Arc<AtomicBool>,
        self_name: ComponentName,
    ) -> Self {
        Self {
            config,
            driver,
            onboard,
            sockets,
            rejoin_cache,
            degraded,
            message_cache: Mutex::new(HashMap::new()),
            rng: Mutex::new(fastrand::Rng::new()),
            self_name,
        }
    }

    /// Fresh session id generator, exposed so callers can pre-allocate an
    /// id shared across a scatter/broadcast before any message is built.
    pub fn generate_session_id(&self) -> SessionId {
        SessionId::generate(&self.rng.lock().unwrap())
    }

    fn gate(&self, message: &Message) -> Result<Gate, ProxyError> {
        if self.degraded.load(Ordering::Acquire) {
            warn!(
                "proxy degraded (minimal_peers breached); rejecting send to {}",
                message.destination
            );
            return Err(ProxyError::PeersMiss(
                "proxy degraded: onboard count below minimal_peers".into(),
            ));
        }

        let Destination::Peer(name) = &message.destination else {
            return Ok(Gate::Proceed);
        };

        if self.onboard.lock().unwrap().contains(name) {
            return Ok(Gate::Proceed);
        }

        if !self.config.enable_rejoin {
            return Err(ProxyError::PeersMiss(format!("peer {name} is not onboard")));
        }

        if let Some(cache) = &self.rejoin_cache {
            cache.lock().unwrap().push(name.clone(), message.clone());
            return Ok(Gate::Buffered(message.session_id.clone()));
        }

        // No cache configured: poll the onboard view until the peer
        // reappears or the wait budget is exhausted.
        let deadline = Instant::now() + self.config.max_wait_time_for_rejoin;
        loop {
            if self.onboard.lock().unwrap().contains(name) {
                return Ok(Gate::Proceed);
            }
            if Instant::now() >= deadline {
                return Err(ProxyError::PeersMiss(format!(
                    "timed out after {:?} waiting for {name} to rejoin",
                    self.config.max_wait_time_for_rejoin
                )));
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Fire-and-forget unicast. Returns whatever session ids the driver
    /// reports, or `[message.session_id]` if the driver returns none.
    pub fn isend(&self, message: Message) -> Result<Vec<SessionId>, ProxyError> {
        match self.gate(&message)? {
            Gate::Buffered(sid) => return Ok(vec![sid]),
            Gate::Proceed => {}
        }
        let fallback = message.session_id.clone();
        let ids = self.driver.send(message)?;
        if ids.is_empty() {
            Ok(vec![fallback])
        } else {
            Ok(ids)
        }
    }

    /// Unicast and wait for the reply (or replies) sharing the sent
    /// session id.
    ///
    /// Caveat: if the driver returns an empty id list, this waits on
    /// `[message.session_id]`; a peer that replies under a different
    /// session id will never satisfy that wait and this call will hang.
    pub fn send(&self, message: Message) -> Result<Vec<Message>, ProxyError> {
        let ids = self.isend(message)?;
        self.receive_by_id(&ids)
    }

    /// For each `(dest, payload)` pair, build a message under `sid` (or a
    /// fresh one) and `isend` it. Returns the flattened list of returned
    /// session ids.
    pub fn iscatter(
        &self,
        tag: Tag,
        session_type: SessionType,
        pairs: Vec<(ComponentName, Payload)>,
        session_id: Option<SessionId>,
    ) -> Result<Vec<SessionId>, ProxyError> {
        let sid = session_id.unwrap_or_else(|| self.generate_session_id());
        let mut ids = Vec::with_capacity(pairs.len());
        for (dest, payload) in pairs {
            let message = Message::new(
                tag.clone(),
                self.self_name.clone(),
                Destination::Peer(dest),
                Some(sid.clone()),
                session_type,
                SessionStage::Request,
                payload,
                &self.rng.lock().unwrap(),
            );
            ids.extend(self.isend(message)?);
        }
        Ok(ids)
    }

    /// As `iscatter`, then waits for one reply per outstanding id.
    pub fn scatter(
        &self,
        tag: Tag,
        session_type: SessionType,
        pairs: Vec<(ComponentName, Payload)>,
        session_id: Option<SessionId>,
    ) -> Result<Vec<Message>, ProxyError> {
        let ids = self.iscatter(tag, session_type, pairs, session_id)?;
        self.receive_by_id(&ids)
    }

    /// Build a wildcard-destination message, tell the driver to broadcast
    /// it, and return the session id once per currently-onboard peer (the
    /// caller uses the count to know how many replies to expect).
    pub fn ibroadcast(
        &self,
        tag: Tag,
        session_type: SessionType,
        session_id: Option<SessionId>,
        payload: Payload,
    ) -> Result<Vec<SessionId>, ProxyError> {
        if self.degraded.load(Ordering::Acquire) {
            warn!("proxy degraded; rejecting broadcast");
            return Err(ProxyError::PeersMiss(
                "proxy degraded: onboard count below minimal_peers".into(),
            ));
        }
        let sid = session_id.unwrap_or_else(|| self.generate_session_id());
        let message = Message::new(
            tag,
            self.self_name.clone(),
            Destination::Broadcast,
            Some(sid.clone()),
            session_type,
            SessionStage::Request,
            payload,
            &self.rng.lock().unwrap(),
        );
        self.driver.broadcast(message)?;
        let count = self.onboard.lock().unwrap().all_names().count();
        Ok(std::iter::repeat(sid).take(count).collect())
    }

    /// As `ibroadcast`, then waits for one reply per onboard peer sharing
    /// `sid`.
    pub fn broadcast(
        &self,
        tag: Tag,
        session_type: SessionType,
        session_id: Option<SessionId>,
        payload: Payload,
    ) -> Result<Vec<Message>, ProxyError> {
        let ids = self.ibroadcast(tag, session_type, session_id, payload)?;
        self.receive_by_id(&ids)
    }

    /// Build a response to `orig`: destination = `orig.source`, same
    /// session id, stage RECEIVE if `ack` (or the original session is a
    /// NOTIFICATION) else COMPLETE.
    pub fn reply(
        &self,
        orig: &Message,
        tag: Option<Tag>,
        payload: Option<Payload>,
        ack: bool,
    ) -> Result<Vec<SessionId>, ProxyError> {
        let stage = if ack || matches!(orig.session_type, SessionType::Notification) {
            SessionStage::Receive
        } else {
            SessionStage::Complete
        };
        let message = Message {
            tag: tag.unwrap_or_else(|| orig.tag.clone()),
            source: self.self_name.clone(),
            destination: Destination::Peer(orig.source.clone()),
            session_id: orig.session_id.clone(),
            session_type: orig.session_type,
            session_stage: stage,
            payload: payload.unwrap_or_else(|| orig.payload.clone()),
        };
        self.isend(message)
    }

    /// Build a message with `orig`'s session id and stage but a new
    /// destination, optionally overriding tag/payload.
    pub fn forward(
        &self,
        orig: &Message,
        destination: ComponentName,
        tag: Option<Tag>,
        payload: Option<Payload>,
    ) -> Result<Vec<SessionId>, ProxyError> {
        let message = Message {
            tag: tag.unwrap_or_else(|| orig.tag.clone()),
            source: self.self_name.clone(),
            destination: Destination::Peer(destination),
            session_id: orig.session_id.clone(),
            session_type: orig.session_type,
            session_stage: orig.session_stage,
            payload: payload.unwrap_or_else(|| orig.payload.clone()),
        };
        self.isend(message)
    }

    /// Delegate to the driver's receive stream. Single-shot unless
    /// `continuous`.
    pub fn receive(&self, continuous: bool) -> Receive<'_> {
        Receive {
            router: self,
            continuous,
            done: false,
        }
    }

    /// Wait for exactly the given (possibly repeated) session ids,
    /// draining the message cache first.
    pub fn receive_by_id(&self, ids: &[SessionId]) -> Result<Vec<Message>, ProxyError> {
        let mut pending: HashMap<SessionId, usize> = HashMap::new();
        for id in ids {
            *pending.entry(id.clone()).or_insert(0) += 1;
        }
        let mut results = Vec::with_capacity(ids.len());

        {
            let mut cache = self.message_cache.lock().unwrap();
            let keys: Vec<SessionId> = pending.keys().cloned().collect();
            for id in keys {
                if let Some(mut queued) = cache.remove(&id) {
                    let want = pending[&id];
                    let take = want.min(queued.len());
                    results.extend(queued.drain(..take));
                    let still_pending = want - take;
                    if still_pending == 0 {
                        pending.remove(&id);
                    } else {
                        pending.insert(id.clone(), still_pending);
                    }
                    if !queued.is_empty() {
                        cache.insert(id, queued);
                    }
                }
            }
        }

        while pending.values().any(|&count| count > 0) {
            let message = self.driver.recv(None)?.ok_or_else(|| {
                ProxyError::DriverSendFailure(DriverError::Send(
                    "receive stream ended before all session ids were satisfied".into(),
                ))
            })?;
            match pending.get_mut(&message.session_id) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    let done = *count == 0;
                    if done {
                        pending.remove(&message.session_id);
                    }
                    results.push(message);
                }
                _ => {
                    let mut cache = self.message_cache.lock().unwrap();
                    cache.entry(message.session_id.clone()).or_default().push(message);
                }
            }
        }

        Ok(results)
    }
}

/// Lazy, possibly-infinite sequence of inbound messages returned by
/// [`SessionRouter::receive`].
pub struct Receive<'a> {
    router: &'a SessionRouter,
    continuous: bool,
    done: bool,
}

impl<'a> Iterator for Receive<'a> {
    type Item = Result<Message, ProxyError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.continuous {
            self.done = true;
        }
        match self.router.driver.recv(None) {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(err) => {
                self.done = true;
                Some(Err(err.into()))
            }
        }
    }
}
