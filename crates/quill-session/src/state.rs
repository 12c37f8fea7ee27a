//! Versioned state container.
//!
//! [`StateStore`] mirrors the canonical snapshot in memory and keeps it
//! durable through a [`KeyValueStore`]. The first `load()` performs the
//! full hydration sequence (parallel field reads, defaulting, refresh
//! policy, migrations, validation, version stamping, auth restoration);
//! later calls reuse the same result. Mutations apply to the in-memory
//! snapshot synchronously and enqueue a fire-and-forget write of just the
//! touched field, in call order, so persistence is last-write-wins per
//! key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::try_join_all;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use quill_shared::{AuthState, EventBus, SessionEvent};

use crate::error::Result;
use crate::migrations;
use crate::schema::{
    self, StateField, StateSnapshot, SettingsUpdate, LEGACY_AUTH_KEY, REFRESH_INTERVAL_MS,
    STATE_VERSION,
};
use crate::store::KeyValueStore;

type PersistBatch = Vec<(String, serde_json::Value)>;

/// The versioned, partially-refreshable session state container.
pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    snapshot: Mutex<StateSnapshot>,
    loaded: OnceCell<()>,
    persist_tx: mpsc::UnboundedSender<PersistBatch>,
    load_deps: Mutex<Vec<JoinHandle<()>>>,
}

impl StateStore {
    /// Create the container and spawn its persister task. Loading is lazy;
    /// nothing is read until the first [`StateStore::load`] /
    /// [`StateStore::get_state`] call.
    pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Arc<Self> {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_loop(store.clone(), persist_rx));

        Arc::new(Self {
            store,
            bus,
            snapshot: Mutex::new(StateSnapshot::default()),
            loaded: OnceCell::new(),
            persist_tx,
            load_deps: Mutex::new(Vec::new()),
        })
    }

    /// Load the snapshot from durable storage. Idempotent: concurrent and
    /// repeat callers share the first load's outcome.
    pub async fn load(&self) -> Result<StateSnapshot> {
        self.loaded.get_or_try_init(|| self.load_inner()).await?;
        Ok(self.lock_snapshot().clone())
    }

    /// Return the snapshot, triggering the load if it has not run yet.
    pub async fn get_state(&self) -> Result<StateSnapshot> {
        self.load().await
    }

    /// Register an additional asynchronous prerequisite for
    /// [`StateStore::fully_loaded`]. Failures are logged and swallowed;
    /// they never fail the overall load.
    pub fn add_load_dependency<F>(&self, dep: F)
    where
        F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = dep.await {
                warn!(error = %e, "load dependency failed");
            }
        });
        self.lock_deps().push(handle);
    }

    /// Await the load plus every registered dependency, then return the
    /// snapshot. Always resolves, even if dependencies failed.
    pub async fn fully_loaded(&self) -> Result<StateSnapshot> {
        self.load().await?;
        let handles: Vec<_> = self.lock_deps().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "load dependency panicked");
            }
        }
        Ok(self.lock_snapshot().clone())
    }

    /// Mutate one top-level field in place and persist just that key.
    /// The in-memory snapshot reflects the write immediately; the store
    /// write is queued and not awaited.
    pub fn update_field<F>(&self, field: StateField, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut StateSnapshot),
    {
        let value = {
            let mut snapshot = self.lock_snapshot();
            mutate(&mut snapshot);
            snapshot.field_value(field)?
        };
        self.enqueue_persist(vec![(field.as_str().to_string(), value)]);
        Ok(())
    }

    /// Apply a typed settings write: mutate the leaf, broadcast exactly one
    /// `settings_updated` signal with the leaf's path and value, persist
    /// the `settings` field.
    pub fn apply_settings(&self, update: SettingsUpdate) -> Result<()> {
        let path = update.path();
        let value = update.value();
        let settings_value = {
            let mut snapshot = self.lock_snapshot();
            update.apply(&mut snapshot.settings);
            snapshot.field_value(StateField::Settings)?
        };

        debug!(path = %path, "settings updated");
        self.bus
            .broadcast(SessionEvent::SettingsUpdated { path, value });
        self.enqueue_persist(vec![(
            StateField::Settings.as_str().to_string(),
            settings_value,
        )]);
        Ok(())
    }

    async fn load_inner(&self) -> Result<()> {
        // 1. Read every canonical field plus the legacy auth marker, in
        //    parallel.
        let mut reads = Vec::with_capacity(StateField::ALL.len() + 1);
        for field in StateField::ALL {
            reads.push(self.store.get(field.as_str()));
        }
        reads.push(self.store.get(LEGACY_AUTH_KEY));
        let mut values = try_join_all(reads).await?;
        let legacy_auth = values.pop().unwrap_or(None);

        // 2. Stored values win when present; absence (not falsiness) falls
        //    back to the default.
        let mut snapshot = StateSnapshot::default();
        let mut touched = Vec::new();
        for (field, value) in StateField::ALL.into_iter().zip(values) {
            if let Some(value) = value {
                snapshot.apply_field(field, value)?;
            }
        }

        // 3. Refresh policy: stale snapshots lose their refreshable fields,
        //    keeping only users/chats the recent-search list still points at.
        let now = Utc::now().timestamp_millis();
        if snapshot.state_created_time + REFRESH_INTERVAL_MS < now {
            refresh(&mut snapshot);
            snapshot.state_created_time = now;
            touched.extend(StateField::REFRESHABLE);
            touched.push(StateField::StateCreatedTime);
            info!(
                kept_users = snapshot.users.len(),
                kept_chats = snapshot.chats.len(),
                "stale snapshot refreshed"
            );
        }

        // 4. One-shot migrations.
        if migrations::migrate_settings(&mut snapshot.settings) {
            touched.push(StateField::Settings);
        }

        // 5. Schema validation, fatal on violation.
        schema::validate(&snapshot)?;

        // 6. Stamp the running schema version and announce the settings.
        if snapshot.version != STATE_VERSION {
            snapshot.version = STATE_VERSION;
            touched.push(StateField::Version);
        }
        self.bus.broadcast(SessionEvent::SettingsUpdated {
            path: "settings".to_string(),
            value: serde_json::to_value(&snapshot.settings)?,
        });

        // 7. Restore the authenticated identity, honouring pre-migration
        //    session markers.
        let legacy_id = legacy_auth
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(serde_json::Value::as_i64);
        if let Some(user_id) = legacy_id.or_else(|| snapshot.auth_state.user_id()) {
            if snapshot.auth_state.user_id() != Some(user_id) {
                snapshot.auth_state = AuthState::SignedIn { user_id };
                touched.push(StateField::AuthState);
            }
            self.bus.broadcast(SessionEvent::UserAuth { user_id });
        }

        // Persist everything the load sequence touched.
        touched.sort_by_key(StateField::as_str);
        touched.dedup();
        let mut batch = PersistBatch::with_capacity(touched.len());
        for field in touched {
            batch.push((field.as_str().to_string(), snapshot.field_value(field)?));
        }
        self.enqueue_persist(batch);

        info!(version = snapshot.version, "session state loaded");
        *self.lock_snapshot() = snapshot;
        Ok(())
    }

    fn enqueue_persist(&self, batch: PersistBatch) {
        if batch.is_empty() {
            return;
        }
        if self.persist_tx.send(batch).is_err() {
            error!("state persister task is gone, write dropped");
        }
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, StateSnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deps(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.load_deps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drain queued field writes sequentially, preserving call order so the
/// last write for a key is the one that sticks.
async fn persist_loop(
    store: Arc<dyn KeyValueStore>,
    mut rx: mpsc::UnboundedReceiver<PersistBatch>,
) {
    while let Some(batch) = rx.recv().await {
        if let Err(e) = store.set(batch).await {
            error!(error = %e, "failed to persist state fields");
        }
    }
}

/// Reset refreshable fields to their defaults, preserving users and chats
/// referenced by the surviving recent-search list.
fn refresh(snapshot: &mut StateSnapshot) {
    let keep: std::collections::HashSet<i64> = snapshot.recent_searches.iter().copied().collect();

    snapshot.users.retain(|id, _| keep.contains(id));
    snapshot.chats.retain(|id, _| keep.contains(id));

    snapshot.dialogs = Vec::new();
    snapshot.messages = Default::default();
    snapshot.contacts = Vec::new();
    snapshot.history_offsets = Default::default();
    snapshot.update_cursors = Default::default();
    snapshot.max_seen_msg_id = 0;
    snapshot.filters = Default::default();
    snapshot.top_peers = Vec::new();
}
