use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use telassist_core::{ConversationState, SessionId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type SharedConversation = Arc<AsyncMutex<ConversationState>>;

struct SessionEntry {
    conversation: SharedConversation,
    last_used: Instant,
}

impl SessionEntry {
    /// Held or awaited by a query right now. The map owns one reference.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.conversation) > 1
    }
}

/// Conversation histories keyed by session.
///
/// Each session sits behind its own async lock so queries within one session
/// run one at a time while different sessions proceed independently. The
/// outer map lock is only held long enough to find or insert an entry.
///
/// Opening a new session first drops sessions idle longer than `idle_ttl`,
/// then, while the store is at `max_sessions`, the least recently used
/// session no query is currently holding.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
    max_sessions: usize,
    idle_ttl: Option<Duration>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(usize::MAX, None)
    }
}

impl SessionStore {
    pub fn new(max_sessions: usize, idle_ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    /// Waits for exclusive access to the session, creating it on first use.
    pub async fn lock(&self, session_id: &SessionId) -> OwnedMutexGuard<ConversationState> {
        let conversation = self.entry(session_id);
        conversation.lock_owned().await
    }

    /// Copy of the session's current history, if the session exists.
    pub async fn snapshot(&self, session_id: &SessionId) -> Option<ConversationState> {
        let conversation =
            self.with_map(|sessions| sessions.get(session_id).map(|e| e.conversation.clone()))?;
        let state = conversation.lock().await;
        Some(state.clone())
    }

    /// Discards the session. Returns whether it existed.
    pub fn end(&self, session_id: &SessionId) -> bool {
        self.with_map(|sessions| sessions.remove(session_id).is_some())
    }

    pub fn len(&self) -> usize {
        self.with_map(|sessions| sessions.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, session_id: &SessionId) -> SharedConversation {
        let now = Instant::now();
        self.with_map(|sessions| {
            if let Some(entry) = sessions.get_mut(session_id) {
                entry.last_used = now;
                return entry.conversation.clone();
            }

            self.evict(sessions, now);
            let conversation =
                Arc::new(AsyncMutex::new(ConversationState::new(session_id.clone())));
            sessions.insert(
                session_id.clone(),
                SessionEntry { conversation: conversation.clone(), last_used: now },
            );
            conversation
        })
    }

    fn evict(&self, sessions: &mut HashMap<SessionId, SessionEntry>, now: Instant) {
        if let Some(ttl) = self.idle_ttl {
            let before = sessions.len();
            sessions.retain(|_, entry| entry.in_use() || now.duration_since(entry.last_used) < ttl);
            let expired = before - sessions.len();
            if expired > 0 {
                debug!(event_name = "session.expired", expired, "idle sessions dropped");
            }
        }

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            let Some(oldest) = oldest else {
                break;
            };
            sessions.remove(&oldest);
            debug!(event_name = "session.evicted", session_id = %oldest, "session store full");
        }
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<SessionId, SessionEntry>) -> T) -> T {
        match self.sessions.lock() {
            Ok(mut sessions) => f(&mut sessions),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use telassist_core::{Category, Query, Role, SanitizedResponse, SessionId};

    use super::SessionStore;

    #[tokio::test]
    async fn sessions_are_created_on_first_lock_and_ended_explicitly() {
        let store = SessionStore::default();
        let session = SessionId::new("s-1");
        assert!(store.snapshot(&session).await.is_none());

        {
            let mut state = store.lock(&session).await;
            state.record(
                Query::new("hi", session.clone(), Role::Customer),
                SanitizedResponse { text: "hello".to_string(), category: Category::Fallback },
                10,
            );
        }

        assert_eq!(store.snapshot(&session).await.map(|state| state.len()), Some(1));
        assert_eq!(store.len(), 1);
        assert!(store.end(&session));
        assert!(!store.end(&session));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn second_lock_on_a_session_waits_for_the_first() {
        let store = SessionStore::default();
        let session = SessionId::new("busy");
        let guard = store.lock(&session).await;

        let waiting = tokio::time::timeout(Duration::from_millis(50), store.lock(&session)).await;
        assert!(waiting.is_err());

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock(&SessionId::new("other")),
        )
        .await;
        assert!(other.is_ok());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(50), store.lock(&session))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn full_store_evicts_the_least_recently_used_session() {
        let store = SessionStore::new(2, None);
        for name in ["a", "b"] {
            drop(store.lock(&SessionId::new(name)).await);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(store.lock(&SessionId::new("a")).await);

        drop(store.lock(&SessionId::new("c")).await);

        assert_eq!(store.len(), 2);
        assert!(store.snapshot(&SessionId::new("a")).await.is_some());
        assert!(store.snapshot(&SessionId::new("b")).await.is_none());
        assert!(store.snapshot(&SessionId::new("c")).await.is_some());
    }

    #[tokio::test]
    async fn sessions_in_use_are_never_evicted() {
        let store = SessionStore::new(1, None);
        let held = store.lock(&SessionId::new("held")).await;

        drop(store.lock(&SessionId::new("other")).await);

        assert_eq!(store.len(), 2);
        drop(held);
        drop(store.lock(&SessionId::new("third")).await);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn idle_sessions_expire_when_a_new_session_opens() {
        let store = SessionStore::new(100, Some(Duration::from_millis(30)));
        drop(store.lock(&SessionId::new("stale")).await);
        tokio::time::sleep(Duration::from_millis(60)).await;

        drop(store.lock(&SessionId::new("fresh")).await);

        assert_eq!(store.len(), 1);
        assert!(store.snapshot(&SessionId::new("stale")).await.is_none());
    }
}
