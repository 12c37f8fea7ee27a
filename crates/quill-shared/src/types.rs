use serde::{Deserialize, Serialize};

/// An addressable remote entity (user or group chat) the UI may need
/// metadata for. Peer ids are the numeric ids assigned by the remote
/// service; negative ids denote group chats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub i64);

impl PeerId {
    pub fn is_chat(&self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PeerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Authentication state of the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    LoggedOut,
    SignedIn {
        user_id: i64,
    },
}

impl AuthState {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            AuthState::SignedIn { user_id } => Some(*user_id),
            AuthState::LoggedOut => None,
        }
    }
}
