use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Participant identity assigned by the relay for one signaling session.
///
/// Opaque to the coordinator apart from its total order, which breaks offer glare.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First characters of the identity, for compact log lines and labels.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(5)
            .map_or(self.0.len(), |(idx, _)| idx);
        &self.0[..end]
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
