//! Conversation store.
//!
//! Each conversation lives in its own slot behind a `tokio::sync::Mutex`,
//! so at most one turn runs per conversation id while different
//! conversations proceed independently. Every successful write bumps the
//! state's version. Idle slots expire after the configured TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use evidence_harness_core::ConversationState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown conversation: {0}")]
    NotFound(String),
    #[error("conversation {id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: String, expected: u64, found: u64 },
}

struct Slot {
    state: Arc<AsyncMutex<ConversationState>>,
    last_used: Instant,
}

pub struct ConversationStore {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &str) -> Result<Arc<AsyncMutex<ConversationState>>, StoreError> {
        let mut slots = self.slots.lock().unwrap();
        let slot = slots
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        slot.last_used = Instant::now();
        Ok(slot.state.clone())
    }

    /// Insert or replace a conversation. Returns the stored version.
    pub fn put(&self, mut state: ConversationState) -> u64 {
        state.bump_version();
        let version = state.version();
        let id = state.conversation_id.clone();
        self.slots.lock().unwrap().insert(
            id,
            Slot {
                state: Arc::new(AsyncMutex::new(state)),
                last_used: Instant::now(),
            },
        );
        version
    }

    /// A snapshot of the conversation. Waits for any in-flight turn.
    pub async fn get(&self, id: &str) -> Result<ConversationState, StoreError> {
        let slot = self.slot(id)?;
        let state = slot.lock().await;
        Ok(state.clone())
    }

    /// Exclusive access for a whole turn.
    pub async fn lock(&self, id: &str) -> Result<OwnedMutexGuard<ConversationState>, StoreError> {
        Ok(self.slot(id)?.lock_owned().await)
    }

    /// Replace the stored state only if it is still at `expected`.
    /// Returns the new version.
    pub async fn compare_and_swap(
        &self,
        expected: u64,
        mut state: ConversationState,
    ) -> Result<u64, StoreError> {
        let slot = self.slot(&state.conversation_id)?;
        let mut current = slot.lock().await;
        if current.version() != expected {
            return Err(StoreError::VersionConflict {
                id: state.conversation_id.clone(),
                expected,
                found: current.version(),
            });
        }
        state.set_version(expected + 1);
        *current = state;
        Ok(expected + 1)
    }

    /// Drop conversations idle for longer than the TTL. Slots with a turn
    /// in flight are kept. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.last_used.elapsed() < self.ttl || slot.state.try_lock().is_err()
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, remaining = slots.len(), "evicted idle conversations");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str) -> ConversationState {
        ConversationState::new(id, "LOT_A 불량 원인", 3)
    }

    #[tokio::test]
    async fn test_put_get_and_versions() {
        let store = ConversationStore::new(Duration::from_secs(60));
        assert_eq!(store.put(state("c1")), 1);
        let snap = store.get("c1").await.unwrap();
        assert_eq!(snap.version(), 1);
        assert_eq!(
            store.get("nope").await.unwrap_err(),
            StoreError::NotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_stale_writes() {
        let store = ConversationStore::new(Duration::from_secs(60));
        store.put(state("c1"));

        let mut first = store.get("c1").await.unwrap();
        let second = store.get("c1").await.unwrap();
        first.pending_user_question = Some("which line?".into());

        assert_eq!(store.compare_and_swap(1, first).await.unwrap(), 2);
        let err = store.compare_and_swap(1, second).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                id: "c1".into(),
                expected: 1,
                found: 2
            }
        );
        let stored = store.get("c1").await.unwrap();
        assert_eq!(stored.pending_user_question.as_deref(), Some("which line?"));
    }

    #[tokio::test]
    async fn test_lock_serializes_turns() {
        let store = Arc::new(ConversationStore::new(Duration::from_secs(60)));
        store.put(state("c1"));

        let mut guard = store.lock("c1").await.unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.get("c1").await.unwrap().loop_count() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(guard.begin_iteration());
        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_eviction_skips_locked_slots() {
        let store = ConversationStore::new(Duration::ZERO);
        store.put(state("idle"));
        store.put(state("busy"));

        let guard = store.lock("busy").await.unwrap();
        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.len(), 1);
        drop(guard);
        assert_eq!(store.evict_expired(), 1);
        assert!(store.is_empty());
    }
}
