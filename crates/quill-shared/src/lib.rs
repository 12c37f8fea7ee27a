//! # quill-shared
//!
//! Types shared between the session and media layers: peer identifiers,
//! the authentication-state tag, and the in-process signal bus that the
//! UI layer subscribes to.

pub mod events;
pub mod types;

pub use events::{EventBus, SessionEvent};
pub use types::{AuthState, PeerId};
