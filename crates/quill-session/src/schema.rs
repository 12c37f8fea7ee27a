//! Canonical state schema.
//!
//! The session snapshot is a fixed set of named fields, each persisted
//! under its own durable-store key so individual mutations never rewrite
//! the whole snapshot. [`StateField`] enumerates the schema;
//! [`StateSnapshot`] is the in-memory mirror.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use quill_shared::AuthState;

use crate::error::{Result, StateError};

/// Current schema version, stamped into every loaded snapshot.
pub const STATE_VERSION: u32 = 7;

/// Snapshots older than this are partially reset on load.
pub const REFRESH_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

/// Pre-migration session marker key. Read during load only; not part of
/// the canonical schema.
pub const LEGACY_AUTH_KEY: &str = "user_auth";

// ---------------------------------------------------------------------------
// Field enumeration
// ---------------------------------------------------------------------------

/// One top-level field of the snapshot, doubling as its durable-store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    Version,
    StateCreatedTime,
    AuthState,
    Settings,
    Dialogs,
    Messages,
    Users,
    Chats,
    Contacts,
    HistoryOffsets,
    UpdateCursors,
    MaxSeenMsgId,
    Filters,
    TopPeers,
    RecentSearches,
}

impl StateField {
    /// Every canonical field, in load order.
    pub const ALL: [StateField; 15] = [
        StateField::Version,
        StateField::StateCreatedTime,
        StateField::AuthState,
        StateField::Settings,
        StateField::Dialogs,
        StateField::Messages,
        StateField::Users,
        StateField::Chats,
        StateField::Contacts,
        StateField::HistoryOffsets,
        StateField::UpdateCursors,
        StateField::MaxSeenMsgId,
        StateField::Filters,
        StateField::TopPeers,
        StateField::RecentSearches,
    ];

    /// Fields reset to defaults once the snapshot exceeds its freshness
    /// window. Users and chats are curated rather than dropped wholesale:
    /// entries referenced by the surviving recent-search list are kept.
    pub const REFRESHABLE: [StateField; 10] = [
        StateField::Dialogs,
        StateField::Messages,
        StateField::Users,
        StateField::Chats,
        StateField::Contacts,
        StateField::HistoryOffsets,
        StateField::UpdateCursors,
        StateField::MaxSeenMsgId,
        StateField::Filters,
        StateField::TopPeers,
    ];

    /// The durable-store key for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateField::Version => "version",
            StateField::StateCreatedTime => "state_created_time",
            StateField::AuthState => "auth_state",
            StateField::Settings => "settings",
            StateField::Dialogs => "dialogs",
            StateField::Messages => "messages",
            StateField::Users => "users",
            StateField::Chats => "chats",
            StateField::Contacts => "contacts",
            StateField::HistoryOffsets => "history_offsets",
            StateField::UpdateCursors => "update_cursors",
            StateField::MaxSeenMsgId => "max_seen_msg_id",
            StateField::Filters => "filters",
            StateField::TopPeers => "top_peers",
            StateField::RecentSearches => "recent_searches",
        }
    }
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// One entry of the dialog (conversation) list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Dialog {
    pub peer_id: i64,
    pub top_message: i64,
    pub unread_count: i32,
    pub pinned: bool,
}

/// A cached message stub, enough for list rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Message {
    pub id: i64,
    pub peer_id: i64,
    pub from_id: Option<i64>,
    pub date: i64,
    pub text: String,
}

/// A known remote user.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// A known group chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Chat {
    pub id: i64,
    pub title: String,
}

/// A user-defined dialog filter (folder).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DialogFilter {
    pub id: i32,
    pub title: String,
    pub pinned_peers: Vec<i64>,
}

/// A frequently-contacted peer with its usage rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopPeer {
    pub peer_id: i64,
    pub rating: f64,
}

/// Cursors into the remote update stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpdateCursors {
    pub pts: i32,
    pub qts: i32,
    pub seq: i32,
    pub date: i64,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A chat background.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Background {
    pub slug: String,
    pub blur: bool,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationSettings {
    pub sound: bool,
    pub desktop: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            sound: true,
            desktop: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendShortcut {
    #[default]
    Enter,
    CtrlEnter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatSettings {
    pub messages_text_size: i32,
    pub animations_enabled: bool,
    pub send_shortcut: SendShortcut,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            messages_text_size: 16,
            animations_enabled: true,
            send_shortcut: SendShortcut::Enter,
        }
    }
}

/// User-facing settings. Every nested group is always present; missing
/// persisted groups fall back to their defaults on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub notifications: NotificationSettings,
    pub chat: ChatSettings,
    /// Active theme name ("day" / "night"). `None` until chosen or migrated.
    pub theme: Option<String>,
    /// Chat background per theme name.
    pub backgrounds: HashMap<String, Background>,
    /// Legacy single background, superseded by `backgrounds`.
    pub background: Option<Background>,
    /// Legacy night-theme flag, superseded by `theme`.
    pub night_mode: Option<bool>,
}

impl Settings {
    /// The theme name writes should target: the chosen theme, else one
    /// derived from the legacy night flag.
    pub fn active_theme(&self) -> String {
        self.theme.clone().unwrap_or_else(|| {
            if self.night_mode == Some(true) {
                "night".to_string()
            } else {
                "day".to_string()
            }
        })
    }
}

/// A typed write to one settings leaf.
///
/// This is the closed set of mutations the UI can issue; each applies a
/// single leaf and broadcasts exactly one `settings_updated` signal with
/// the leaf's dotted path.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsUpdate {
    NotificationsSound(bool),
    NotificationsDesktop(bool),
    MessagesTextSize(i32),
    AnimationsEnabled(bool),
    SendShortcut(SendShortcut),
    Theme(String),
    Background { theme: String, background: Background },
}

impl SettingsUpdate {
    /// Dotted path of the leaf this update writes.
    pub fn path(&self) -> String {
        match self {
            SettingsUpdate::NotificationsSound(_) => "notifications.sound".to_string(),
            SettingsUpdate::NotificationsDesktop(_) => "notifications.desktop".to_string(),
            SettingsUpdate::MessagesTextSize(_) => "chat.messages_text_size".to_string(),
            SettingsUpdate::AnimationsEnabled(_) => "chat.animations_enabled".to_string(),
            SettingsUpdate::SendShortcut(_) => "chat.send_shortcut".to_string(),
            SettingsUpdate::Theme(_) => "theme".to_string(),
            SettingsUpdate::Background { theme, .. } => format!("backgrounds.{theme}"),
        }
    }

    /// The new leaf value, as broadcast on the signal bus.
    pub fn value(&self) -> serde_json::Value {
        match self {
            SettingsUpdate::NotificationsSound(v) => serde_json::json!(v),
            SettingsUpdate::NotificationsDesktop(v) => serde_json::json!(v),
            SettingsUpdate::MessagesTextSize(v) => serde_json::json!(v),
            SettingsUpdate::AnimationsEnabled(v) => serde_json::json!(v),
            SettingsUpdate::SendShortcut(v) => {
                serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
            }
            SettingsUpdate::Theme(v) => serde_json::json!(v),
            SettingsUpdate::Background { background, .. } => {
                serde_json::to_value(background).unwrap_or(serde_json::Value::Null)
            }
        }
    }

    /// Apply the update to an in-memory settings record.
    pub fn apply(&self, settings: &mut Settings) {
        match self {
            SettingsUpdate::NotificationsSound(v) => settings.notifications.sound = *v,
            SettingsUpdate::NotificationsDesktop(v) => settings.notifications.desktop = *v,
            SettingsUpdate::MessagesTextSize(v) => settings.chat.messages_text_size = *v,
            SettingsUpdate::AnimationsEnabled(v) => settings.chat.animations_enabled = *v,
            SettingsUpdate::SendShortcut(v) => settings.chat.send_shortcut = *v,
            SettingsUpdate::Theme(v) => settings.theme = Some(v.clone()),
            SettingsUpdate::Background { theme, background } => {
                settings
                    .backgrounds
                    .insert(theme.clone(), background.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The full in-memory session state mirrored to durable storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateSnapshot {
    pub version: u32,
    pub state_created_time: i64,
    pub auth_state: AuthState,
    pub settings: Settings,
    pub dialogs: Vec<Dialog>,
    pub messages: HashMap<i64, Message>,
    pub users: HashMap<i64, User>,
    pub chats: HashMap<i64, Chat>,
    pub contacts: Vec<i64>,
    pub history_offsets: HashMap<i64, i64>,
    pub update_cursors: UpdateCursors,
    pub max_seen_msg_id: i64,
    pub filters: HashMap<i32, DialogFilter>,
    pub top_peers: Vec<TopPeer>,
    pub recent_searches: Vec<i64>,
}

impl StateSnapshot {
    /// Serialize one field for persistence.
    pub fn field_value(&self, field: StateField) -> Result<serde_json::Value> {
        let value = match field {
            StateField::Version => serde_json::to_value(self.version)?,
            StateField::StateCreatedTime => serde_json::to_value(self.state_created_time)?,
            StateField::AuthState => serde_json::to_value(&self.auth_state)?,
            StateField::Settings => serde_json::to_value(&self.settings)?,
            StateField::Dialogs => serde_json::to_value(&self.dialogs)?,
            StateField::Messages => serde_json::to_value(&self.messages)?,
            StateField::Users => serde_json::to_value(&self.users)?,
            StateField::Chats => serde_json::to_value(&self.chats)?,
            StateField::Contacts => serde_json::to_value(&self.contacts)?,
            StateField::HistoryOffsets => serde_json::to_value(&self.history_offsets)?,
            StateField::UpdateCursors => serde_json::to_value(&self.update_cursors)?,
            StateField::MaxSeenMsgId => serde_json::to_value(self.max_seen_msg_id)?,
            StateField::Filters => serde_json::to_value(&self.filters)?,
            StateField::TopPeers => serde_json::to_value(&self.top_peers)?,
            StateField::RecentSearches => serde_json::to_value(&self.recent_searches)?,
        };
        Ok(value)
    }

    /// Hydrate one field from its persisted value.
    pub fn apply_field(&mut self, field: StateField, value: serde_json::Value) -> Result<()> {
        let decode = |source| StateError::Decode {
            field: field.as_str(),
            source,
        };
        match field {
            StateField::Version => self.version = serde_json::from_value(value).map_err(decode)?,
            StateField::StateCreatedTime => {
                self.state_created_time = serde_json::from_value(value).map_err(decode)?
            }
            StateField::AuthState => {
                self.auth_state = serde_json::from_value(value).map_err(decode)?
            }
            StateField::Settings => self.settings = serde_json::from_value(value).map_err(decode)?,
            StateField::Dialogs => self.dialogs = serde_json::from_value(value).map_err(decode)?,
            StateField::Messages => self.messages = serde_json::from_value(value).map_err(decode)?,
            StateField::Users => self.users = serde_json::from_value(value).map_err(decode)?,
            StateField::Chats => self.chats = serde_json::from_value(value).map_err(decode)?,
            StateField::Contacts => self.contacts = serde_json::from_value(value).map_err(decode)?,
            StateField::HistoryOffsets => {
                self.history_offsets = serde_json::from_value(value).map_err(decode)?
            }
            StateField::UpdateCursors => {
                self.update_cursors = serde_json::from_value(value).map_err(decode)?
            }
            StateField::MaxSeenMsgId => {
                self.max_seen_msg_id = serde_json::from_value(value).map_err(decode)?
            }
            StateField::Filters => self.filters = serde_json::from_value(value).map_err(decode)?,
            StateField::TopPeers => self.top_peers = serde_json::from_value(value).map_err(decode)?,
            StateField::RecentSearches => {
                self.recent_searches = serde_json::from_value(value).map_err(decode)?
            }
        }
        Ok(())
    }
}

/// Validate a snapshot against the canonical schema: every field the
/// default snapshot declares must be present, recursively through nested
/// records. A violation is fatal for the load.
pub fn validate(snapshot: &StateSnapshot) -> Result<()> {
    let expected = serde_json::to_value(StateSnapshot::default())?;
    let actual = serde_json::to_value(snapshot)?;
    validate_shape(&expected, &actual, "")
}

fn validate_shape(expected: &serde_json::Value, actual: &serde_json::Value, path: &str) -> Result<()> {
    let serde_json::Value::Object(expected) = expected else {
        return Ok(());
    };
    let serde_json::Value::Object(actual) = actual else {
        return Err(StateError::Validation(path.to_string()));
    };
    for (key, child) in expected {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        match actual.get(key) {
            Some(value) => validate_shape(child, value, &child_path)?,
            None => return Err(StateError::Validation(child_path)),
        }
    }
    Ok(())
}
