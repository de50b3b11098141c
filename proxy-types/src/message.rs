use std::fmt;

use serde::{Deserialize, Serialize};

use crate::names::ComponentName;

/// Opaque payload carried by a [`Message`]. Transports serialize this as
/// they see fit; the core never inspects it beyond moving it around.
pub type Payload = serde_json::Value;

/// Free-form message label. Accepts either a plain string or a symbolic
/// enumerant (anything implementing [`fmt::Display`]) but always carries the
/// normalized string form internally, per the single-normalization-point
/// design in the component notes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Normalize a symbolic enumerant (or anything `Display`-able) into a
    /// tag. This is the one place tag normalization happens.
    pub fn from_enum(value: impl fmt::Display) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Opaque, process-lifetime-unique identifier correlating a request with its
/// replies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh, practically-unique session id from the given
    /// source of entropy. Used whenever a caller omits `session_id`.
    pub fn generate(rng: &fastrand::Rng) -> Self {
        let mut raw = [0u8; 16];
        for byte in raw.iter_mut() {
            *byte = rng.u8(..);
        }
        Self(raw.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Destination of a message: a concrete peer, or the broadcast wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Peer(ComponentName),
    Broadcast,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer(name) => write!(f, "{name}"),
            Self::Broadcast => write!(f, "*"),
        }
    }
}

impl From<ComponentName> for Destination {
    fn from(name: ComponentName) -> Self {
        Self::Peer(name)
    }
}

/// Whether a session is a request/response exchange (`Task`) or a
/// fire-and-forget announcement (`Notification`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Task,
    Notification,
}

/// Lifecycle marker on a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStage {
    Request,
    /// Acknowledgment that a message was received, without completing the
    /// session (valid for both `Task` and `Notification` sessions).
    Receive,
    /// Final reply of a `Task` session. Not valid for `Notification`.
    Complete,
}

impl SessionStage {
    /// Whether this stage is a legal pairing with the given session type,
    /// per the REQUEST|RECEIVE|COMPLETE (Task) vs REQUEST|RECEIVE
    /// (Notification) rule.
    pub fn is_valid_for(&self, session_type: SessionType) -> bool {
        !matches!(
            (session_type, self),
            (SessionType::Notification, SessionStage::Complete)
        )
    }
}

/// Immutable record exchanged between proxies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub tag: Tag,
    pub source: ComponentName,
    pub destination: Destination,
    pub session_id: SessionId,
    pub session_type: SessionType,
    pub session_stage: SessionStage,
    pub payload: Payload,
}

impl Message {
    /// Build a new outbound message. `session_id` is auto-generated from
    /// `rng` if `None`, per the SessionRouter contract.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tag: Tag,
        source: ComponentName,
        destination: Destination,
        session_id: Option<SessionId>,
        session_type: SessionType,
        session_stage: SessionStage,
        payload: Payload,
        rng: &fastrand::Rng,
    ) -> Self {
        Self {
            tag,
            source,
            destination,
            session_id: session_id.unwrap_or_else(|| SessionId::generate(rng)),
            session_type,
            session_stage,
            payload,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.destination, Destination::Broadcast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_normalizes_enumerants() {
        #[derive(Debug)]
        enum Kind {
            Ping,
        }
        impl fmt::Display for Kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "ping")
            }
        }
        assert_eq!(Tag::from_enum(Kind::Ping).as_str(), "ping");
        assert_eq!(Tag::from("ping").as_str(), "ping");
    }

    #[test]
    fn session_stage_rejects_complete_notification() {
        assert!(!SessionStage::Complete.is_valid_for(SessionType::Notification));
        assert!(SessionStage::Complete.is_valid_for(SessionType::Task));
        assert!(SessionStage::Receive.is_valid_for(SessionType::Notification));
    }

    #[test]
    fn generated_session_ids_are_distinct() {
        let rng = fastrand::Rng::new();
        let a = SessionId::generate(&rng);
        let b = SessionId::generate(&rng);
        assert_ne!(a, b);
    }

    #[quickcheck_macros::quickcheck]
    fn tag_round_trips_through_display(s: String) -> bool {
        Tag::new(s.clone()).as_str() == s
    }
}
