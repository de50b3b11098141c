use std::collections::HashMap;

use crate::names::{ComponentName, GroupName, PeerType};

/// Static description of one expected peer-type: its registry hash-map
/// name and its expected census. Immutable after construction.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub peer_type: PeerType,
    pub registry_key: String,
    pub expected_count: usize,
}

impl PeerInfo {
    pub fn new(group: &GroupName, peer_type: PeerType, expected_count: usize) -> Self {
        let registry_key = group.roster_key(&peer_type);
        Self {
            peer_type,
            registry_key,
            expected_count,
        }
    }
}

/// Mapping from peer-type to the ordered collection of peer component
/// names currently connected. Mutated only by `Rendezvous` (at join) and
/// `RejoinController` (on reconcile).
#[derive(Debug, Default, Clone)]
pub struct OnboardSet(HashMap<PeerType, Vec<ComponentName>>);

impl OnboardSet {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn names_for(&self, peer_type: &PeerType) -> &[ComponentName] {
        self.0.get(peer_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, peer_type: &PeerType) -> usize {
        self.0.get(peer_type).map_or(0, Vec::len)
    }

    pub fn contains(&self, name: &ComponentName) -> bool {
        self.0.values().any(|names| names.contains(name))
    }

    pub fn peer_type_of(&self, name: &ComponentName) -> Option<&PeerType> {
        self.0
            .iter()
            .find(|(_, names)| names.contains(name))
            .map(|(peer_type, _)| peer_type)
    }

    /// Insert `name` as onboard under `peer_type`. No-op if already present.
    pub fn insert(&mut self, peer_type: PeerType, name: ComponentName) {
        let names = self.0.entry(peer_type).or_default();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    /// Remove `name` from whichever peer-type roster holds it. Returns the
    /// peer-type it was removed from, if any.
    pub fn remove(&mut self, name: &ComponentName) -> Option<PeerType> {
        for (peer_type, names) in self.0.iter_mut() {
            if let Some(pos) = names.iter().position(|n| n == name) {
                names.remove(pos);
                return Some(peer_type.clone());
            }
        }
        None
    }

    pub fn all_names(&self) -> impl Iterator<Item = &ComponentName> {
        self.0.values().flatten()
    }

    pub fn peer_types(&self) -> impl Iterator<Item = &PeerType> {
        self.0.keys()
    }
}

/// Mapping from component name to opaque transport address. Mirrors
/// `OnboardSet`; mutated with it.
#[derive(Debug, Default, Clone)]
pub struct PeerSockets(HashMap<ComponentName, String>);

impl PeerSockets {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, name: &ComponentName) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &ComponentName) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: ComponentName, address: String) -> Option<String> {
        self.0.insert(name, address)
    }

    pub fn remove(&mut self, name: &ComponentName) -> Option<String> {
        self.0.remove(name)
    }

    pub fn as_map(&self) -> &HashMap<ComponentName, String> {
        &self.0
    }
}

/// Check that every name in `onboard` has an entry in `sockets` and vice
/// versa.
pub fn onboard_sockets_consistent(onboard: &OnboardSet, sockets: &PeerSockets) -> bool {
    let onboard_names: std::collections::HashSet<_> = onboard.all_names().collect();
    let socket_names: std::collections::HashSet<_> = sockets.as_map().keys().collect();
    onboard_names == socket_names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut onboard = OnboardSet::new();
        let actor = PeerType::new("actor");
        onboard.insert(actor.clone(), ComponentName::new("a1"));
        onboard.insert(actor.clone(), ComponentName::new("a1"));
        assert_eq!(onboard.count(&actor), 1);
    }

    #[test]
    fn remove_reports_peer_type() {
        let mut onboard = OnboardSet::new();
        let actor = PeerType::new("actor");
        let a1 = ComponentName::new("a1");
        onboard.insert(actor.clone(), a1.clone());
        assert_eq!(onboard.remove(&a1), Some(actor));
        assert!(!onboard.contains(&a1));
    }

    #[test]
    fn consistency_check_catches_mismatch() {
        let mut onboard = OnboardSet::new();
        let sockets = PeerSockets::new();
        onboard.insert(PeerType::new("actor"), ComponentName::new("a1"));
        assert!(!onboard_sockets_consistent(&onboard, &sockets));
    }

    // Any sequence of mirrored insert/remove operations on OnboardSet and
    // PeerSockets (the two maps SessionRouter and RejoinController always
    // update together) leaves their key sets equal.
    #[cfg(feature = "quickcheck")]
    #[quickcheck_macros::quickcheck]
    fn mirrored_mutations_preserve_key_set_equality(
        ops: Vec<(PeerType, ComponentName, bool)>,
    ) -> bool {
        let mut onboard = OnboardSet::new();
        let mut sockets = PeerSockets::new();
        for (peer_type, name, is_insert) in ops {
            if is_insert {
                onboard.insert(peer_type, name.clone());
                sockets.insert(name, format!("tcp://{name}"));
            } else {
                onboard.remove(&name);
                sockets.remove(&name);
            }
        }
        onboard_sockets_consistent(&onboard, &sockets)
    }
}
