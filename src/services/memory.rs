use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::PendingState;

/// Per-process short-term memory: at most one pending state per
/// conversation id. Entries expire after the configured TTL so abandoned
/// flows do not pile up; lost on restart by design.
pub struct ConversationMemory {
    ttl: Duration,
    inner: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    state: PendingState,
    expires_at: Instant,
}

impl ConversationMemory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the pending state at the start of a turn. One-shot states are
    /// consumed here; choice-list states stay for the next turn.
    pub fn begin_turn(&self, conversation_id: &str) -> Option<PendingState> {
        let mut map = self.inner.lock().unwrap();

        match map.get(conversation_id) {
            None => None,
            Some(entry) if entry.expires_at <= Instant::now() => {
                map.remove(conversation_id);
                None
            }
            Some(entry) => {
                let state = entry.state.clone();
                if state.is_one_shot() {
                    map.remove(conversation_id);
                }
                Some(state)
            }
        }
    }

    /// Sets the pending state, overwriting whatever was there.
    pub fn set(&self, conversation_id: &str, state: PendingState) {
        let mut map = self.inner.lock().unwrap();
        map.insert(
            conversation_id.to_string(),
            Entry {
                state,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Non-consuming peek, honoring expiry.
    pub fn current(&self, conversation_id: &str) -> Option<PendingState> {
        let map = self.inner.lock().unwrap();
        map.get(conversation_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.state.clone())
    }

    /// Drops every expired entry. Called from a periodic task.
    pub fn sweep(&self) -> usize {
        let mut map = self.inner.lock().unwrap();
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, entry| entry.expires_at > now);
        before - map.len()
    }
}
