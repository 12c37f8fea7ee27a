//! # quill-session
//!
//! Client-side session persistence: a versioned snapshot of session state
//! kept durable across restarts, reconciled against a refresh policy on
//! load, plus the reference-counted registry of peers the UI currently
//! needs.
//!
//! Durable storage itself is abstracted behind [`store::KeyValueStore`];
//! the canonical layout is one store entry per schema field, so
//! mutations persist only the field they touched.

pub mod demand;
pub mod migrations;
pub mod schema;
pub mod session;
pub mod state;
pub mod store;

mod error;

pub use demand::PeerDemandTracker;
pub use error::{Result, StateError};
pub use schema::{Settings, SettingsUpdate, StateField, StateSnapshot};
pub use session::Session;
pub use state::StateStore;
pub use store::{KeyValueStore, MemoryStore};
