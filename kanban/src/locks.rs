//! Advisory edit locks.
//!
//! [`EditLockChannel`] mirrors which entities other users are editing, as
//! announced over the push channel, and produces the outbound events for the
//! local user's own editors. Locks only warn: nothing here stops a request
//! from being sent.
//!
//! Every remote lock is a lease. It stays live for [`LockConfig::lease`]
//! after the last `item_locked` for its key and is ignored afterwards, so a
//! holder that vanished without `stop_edit` cannot block an entity forever.
//! While the local user keeps an editor open, [`EditLockChannel::renewals_due`]
//! re-announces it every [`LockConfig::renew_interval`].
//!
//! All methods take `now` explicitly; the channel never reads the clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use kanban_proto::board::UserId;
use kanban_proto::push::{EntityKey, LockNotice, PushEvent};

/// Lease timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// How long a remote lock stays live without renewal.
    pub lease: Duration,
    /// How often the local user's open editors are re-announced.
    pub renew_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(30),
            renew_interval: Duration::from_secs(10),
        }
    }
}

/// Reasons an editor may not be opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Someone already announced an edit of this entity.
    #[error("{key} is being edited by {holder}")]
    Held {
        /// The contested entity.
        key: EntityKey,
        /// User currently holding it.
        holder: UserId,
    },
}

#[derive(Debug, Clone)]
struct Lease {
    holder: UserId,
    refreshed_at: Instant,
}

/// Local view of who is editing what.
#[derive(Debug)]
pub struct EditLockChannel {
    local_user: UserId,
    config: LockConfig,
    held: HashMap<EntityKey, Lease>,
    /// Local editors, with the time each was last announced.
    editing: HashMap<EntityKey, Instant>,
}

impl EditLockChannel {
    /// Creates an empty channel for `local_user`.
    #[must_use]
    pub fn new(local_user: UserId, config: LockConfig) -> Self {
        Self {
            local_user,
            config,
            held: HashMap::new(),
            editing: HashMap::new(),
        }
    }

    /// The user this channel announces edits for.
    #[must_use]
    pub const fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Lease timing in use.
    #[must_use]
    pub const fn config(&self) -> LockConfig {
        self.config
    }

    fn is_live(&self, lease: &Lease, now: Instant) -> bool {
        now.saturating_duration_since(lease.refreshed_at) < self.config.lease
    }

    /// Asks to open an editor for `key`.
    ///
    /// Returns the `start_edit` event to send. Nothing waits for an answer:
    /// two users starting within one round trip can both get through.
    ///
    /// # Errors
    ///
    /// [`LockError::Held`] if any live lock exists for `key`, whoever holds
    /// it.
    pub fn begin_edit(&mut self, key: EntityKey, now: Instant) -> Result<PushEvent, LockError> {
        if let Some(holder) = self.holder(&key, now) {
            let holder = holder.clone();
            tracing::info!(%key, %holder, "edit blocked by existing lock");
            return Err(LockError::Held { key, holder });
        }
        let event = PushEvent::StartEdit(LockNotice::new(&key, self.local_user.clone()));
        self.editing.insert(key, now);
        Ok(event)
    }

    /// Closes the local editor for `key`. Always yields `stop_edit`, even if
    /// this channel never recorded the edit.
    pub fn end_edit(&mut self, key: &EntityKey) -> PushEvent {
        self.editing.remove(key);
        PushEvent::StopEdit(LockNotice::new(key, self.local_user.clone()))
    }

    /// Applies an inbound event. `item_locked` inserts or refreshes the
    /// lease, `item_unlocked` removes it whoever held it. Outbound events are
    /// ignored.
    ///
    /// Returns whether the lock map changed.
    pub fn apply(&mut self, event: &PushEvent, now: Instant) -> bool {
        match event {
            PushEvent::ItemLocked(notice) => {
                let key = notice.key();
                tracing::debug!(%key, holder = %notice.user_id, "lock announced");
                self.held.insert(
                    key,
                    Lease {
                        holder: notice.user_id.clone(),
                        refreshed_at: now,
                    },
                );
                true
            }
            PushEvent::ItemUnlocked(notice) => {
                let key = notice.key();
                tracing::debug!(%key, "lock released");
                self.held.remove(&key).is_some()
            }
            PushEvent::StartEdit(_) | PushEvent::StopEdit(_) => false,
        }
    }

    /// Holder of a live lock on `key`.
    #[must_use]
    pub fn holder(&self, key: &EntityKey, now: Instant) -> Option<&UserId> {
        self.held
            .get(key)
            .filter(|lease| self.is_live(lease, now))
            .map(|lease| &lease.holder)
    }

    /// Whether `key` has a live lock.
    #[must_use]
    pub fn is_locked(&self, key: &EntityKey, now: Instant) -> bool {
        self.holder(key, now).is_some()
    }

    /// Number of entries in the lock map, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether the lock map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Drops expired leases, returning their keys.
    pub fn prune_expired(&mut self, now: Instant) -> Vec<EntityKey> {
        let lease = self.config.lease;
        let mut expired = Vec::new();
        self.held.retain(|key, entry| {
            let live = now.saturating_duration_since(entry.refreshed_at) < lease;
            if !live {
                expired.push(key.clone());
            }
            live
        });
        for key in &expired {
            tracing::debug!(%key, "lock lease expired");
        }
        expired
    }

    /// Keys the local user is editing.
    pub fn editing(&self) -> impl Iterator<Item = &EntityKey> {
        self.editing.keys()
    }

    /// `start_edit` renewals for local editors not announced within the
    /// renew interval.
    pub fn renewals_due(&mut self, now: Instant) -> Vec<PushEvent> {
        let interval = self.config.renew_interval;
        let mut due = Vec::new();
        for (key, announced) in &mut self.editing {
            if now.saturating_duration_since(*announced) >= interval {
                *announced = now;
                due.push(PushEvent::StartEdit(LockNotice::new(key, self.local_user.clone())));
            }
        }
        due
    }

    /// The push connection dropped: nothing it announced can be trusted any
    /// more, so every remote lock is forgotten. Local editors stay tracked.
    pub fn on_disconnect(&mut self) {
        let dropped = self.held.len();
        self.held.clear();
        tracing::debug!(dropped, "lock map cleared on disconnect");
    }

    /// The push connection is back: re-announce every open local editor.
    pub fn on_reconnect(&mut self, now: Instant) -> Vec<PushEvent> {
        self.editing
            .iter_mut()
            .map(|(key, announced)| {
                *announced = now;
                PushEvent::StartEdit(LockNotice::new(key, self.local_user.clone()))
            })
            .collect()
    }
}
