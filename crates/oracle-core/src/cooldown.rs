//! Per-user cooldown tracking.
//!
//! Every accepted request stamps the user's entry with the request time; a
//! request arriving before `window` has elapsed since that stamp is blocked
//! and leaves the stamp untouched.
//!
//! The in-process store is backed by [`DashMap`], whose `entry` API holds a
//! shard write lock for the whole read-modify-write.  Two concurrent requests
//! from the same user therefore serialize and at most one of them is
//! accepted per window, while different users proceed in parallel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Opaque user identifier.  Transports render their native ids to strings.
pub type UserId = String;

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    /// The request is accepted and the user's timestamp was updated.
    Allowed,
    /// The request falls inside the window.
    Blocked { remaining_seconds: u64 },
}

impl CooldownDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Storage for per-user last-request timestamps.
///
/// Implementations must make `check_and_mark` atomic per user id.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Check whether `user_id` may issue a request at `now` and, if so,
    /// record `now` as their last accepted request.
    async fn check_and_mark(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CooldownDecision;

    /// Number of users with a recorded timestamp.
    async fn tracked_users(&self) -> usize;
}

/// Process-lifetime cooldown store.  Entries are never evicted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCooldownStore {
    inner: Arc<DashMap<UserId, DateTime<Utc>>>,
}

impl InMemoryCooldownStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's last accepted request time.
    pub fn last_request_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.inner.get(user_id).map(|e| *e.value())
    }

    /// Synchronous form of [`CooldownStore::check_and_mark`].
    pub fn check_and_mark_sync(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CooldownDecision {
        match self.inner.entry(user_id.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                CooldownDecision::Allowed
            }
            Entry::Occupied(mut slot) => {
                let last = *slot.get();
                let decision = evaluate(last, now, window);
                if decision.is_allowed() {
                    slot.insert(now);
                } else {
                    tracing::debug!(user_id, ?decision, "request inside cooldown window");
                }
                decision
            }
        }
    }
}

#[async_trait]
impl CooldownStore for InMemoryCooldownStore {
    async fn check_and_mark(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> CooldownDecision {
        self.check_and_mark_sync(user_id, now, window)
    }

    async fn tracked_users(&self) -> usize {
        self.inner.len()
    }
}

/// Decide for a user whose last accepted request was at `last`.
///
/// A `now` earlier than `last` counts as zero elapsed time, which keeps the
/// stored timestamp non-decreasing.
fn evaluate(last: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> CooldownDecision {
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed >= window {
        return CooldownDecision::Allowed;
    }

    let remaining = window - elapsed;
    CooldownDecision::Blocked {
        remaining_seconds: ceil_secs(remaining),
    }
}

fn ceil_secs(d: Duration) -> u64 {
    if d.subsec_nanos() > 0 {
        d.as_secs() + 1
    } else {
        d.as_secs()
    }
}
