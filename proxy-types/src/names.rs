use std::fmt;

/// Logical distributed job namespace. All proxies in one group share a
/// registry namespace keyed by this name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct GroupName(String);

/// Role within a group, e.g. `learner` or `actor`. The unit at which census
/// and minimal-peer thresholds are expressed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PeerType(String);

/// Name of a single component instance within a group, e.g. `actor-1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ComponentName(String);

macro_rules! newtype_str {
    ($ty:ident) => {
        impl $ty {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_str!(GroupName);
newtype_str!(PeerType);
newtype_str!(ComponentName);

impl GroupName {
    /// Registry hash-map key for the peer-type roster of `peer_type` within
    /// this group, i.e. `"{group}:{peer_type}"`.
    pub fn roster_key(&self, peer_type: &PeerType) -> String {
        format!("{}:{}", self.0, peer_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_key_matches_registry_convention() {
        let group = GroupName::new("g");
        let actor = PeerType::new("actor");
        assert_eq!(group.roster_key(&actor), "g:actor");
    }
}
