use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel as chan;
use proxy_types::{ComponentName, Destination, DriverError, Message, SessionId, TransportDriver};

/// Shared in-process "wire" joining a set of [`ChannelDriver`]s, standing in
/// for a real ZeroMQ-style transport. Each driver registers its inbox under
/// its own address; `send`/`broadcast` look peers up here.
#[derive(Default)]
pub struct Network {
    directory: Arc<Mutex<HashMap<String, chan::Sender<Message>>>>,
    next_address: AtomicUsize,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh address and a driver bound to it, registered on
    /// this network.
    pub fn driver(&self) -> ChannelDriver {
        let address = format!("inproc://{}", self.next_address.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = chan::unbounded();
        self.directory.lock().unwrap().insert(address.clone(), tx);
        ChannelDriver {
            local_address: address,
            inbox: rx,
            directory: self.directory.clone(),
            peers: Mutex::new(HashMap::new()),
        }
    }
}

/// In-process [`TransportDriver`] fake backed by `crossbeam_channel`. Not a
/// real network client: messages are handed over in-process via the shared
/// [`Network`] directory rather than serialized onto a wire.
pub struct ChannelDriver {
    local_address: String,
    inbox: chan::Receiver<Message>,
    directory: Arc<Mutex<HashMap<String, chan::Sender<Message>>>>,
    peers: Mutex<HashMap<ComponentName, String>>,
}

impl ChannelDriver {
    fn sender_for(&self, address: &str) -> Result<chan::Sender<Message>, DriverError> {
        self.directory
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| DriverError::Send(format!("no inbox registered at {address}")))
    }
}

impl TransportDriver for ChannelDriver {
    fn address(&self) -> String {
        self.local_address.clone()
    }

    fn connect(&self, peers: &HashMap<ComponentName, String>) -> Result<(), DriverError> {
        self.peers.lock().unwrap().extend(peers.clone());
        Ok(())
    }

    fn disconnect(&self, peers: &HashMap<ComponentName, String>) -> Result<(), DriverError> {
        let mut current = self.peers.lock().unwrap();
        for name in peers.keys() {
            current.remove(name);
        }
        Ok(())
    }

    fn send(&self, message: Message) -> Result<Vec<SessionId>, DriverError> {
        let Destination::Peer(name) = &message.destination else {
            return Err(DriverError::Send(
                "send called with a broadcast destination; use broadcast instead".into(),
            ));
        };
        let address = self
            .peers
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::Send(format!("peer {name} is not connected")))?;
        let session_id = message.session_id.clone();
        self.sender_for(&address)?
            .send(message)
            .map_err(|err| DriverError::Send(err.to_string()))?;
        Ok(vec![session_id])
    }

    fn broadcast(&self, message: Message) -> Result<(), DriverError> {
        let addresses: Vec<String> = self.peers.lock().unwrap().values().cloned().collect();
        for address in addresses {
            self.sender_for(&address)?
                .send(message.clone())
                .map_err(|err| DriverError::Send(err.to_string()))?;
        }
        Ok(())
    }

    fn recv(&self, timeout: Option<Duration>) -> Result<Option<Message>, DriverError> {
        match timeout {
            Some(duration) => match self.inbox.recv_timeout(duration) {
                Ok(message) => Ok(Some(message)),
                Err(chan::RecvTimeoutError::Timeout) => Ok(None),
                Err(chan::RecvTimeoutError::Disconnected) => Ok(None),
            },
            None => match self.inbox.recv() {
                Ok(message) => Ok(Some(message)),
                Err(_) => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxy_types::{SessionStage, SessionType, Tag};

    fn message(source: &str, dest: &str, sid: &str) -> Message {
        Message {
            tag: Tag::new("t"),
            source: ComponentName::new(source),
            destination: Destination::Peer(ComponentName::new(dest)),
            session_id: SessionId::new(sid),
            session_type: SessionType::Task,
            session_stage: SessionStage::Request,
            payload: serde_json::Value::Null,
        }
    }

    #[test]
    fn send_delivers_to_connected_peer() {
        let network = Network::new();
        let a = network.driver();
        let b = network.driver();

        let mut peers = HashMap::new();
        peers.insert(ComponentName::new("b"), b.address());
        a.connect(&peers).unwrap();

        a.send(message("a", "b", "s1")).unwrap();
        let received = b.recv(Some(Duration::from_secs(1))).unwrap().unwrap();
        assert_eq!(received.session_id.as_str(), "s1");
    }

    #[test]
    fn send_to_unconnected_peer_fails() {
        let network = Network::new();
        let a = network.driver();
        assert!(a.send(message("a", "ghost", "s1")).is_err());
    }
}
