use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use threadline_core::domain::chat::ChatTurn;

/// Conversation with one sender. Held behind its own async mutex so turns
/// from the same sender run one at a time.
#[derive(Debug)]
pub struct ChatSession {
    sender: String,
    history: Vec<ChatTurn>,
    last_active: Instant,
}

impl ChatSession {
    fn new(sender: &str) -> Self {
        Self { sender: sender.to_string(), history: Vec::new(), last_active: Instant::now() }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    /// Drops every turn after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.history.truncate(len);
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }
}

pub type SessionGuard = OwnedMutexGuard<ChatSession>;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<AsyncMutex<ChatSession>>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<ChatSession>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up or creates the sender's session and waits for exclusive use of it.
    pub async fn acquire(&self, sender: &str) -> SessionGuard {
        let slot = {
            let mut sessions = self.map();
            Arc::clone(
                sessions
                    .entry(sender.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(ChatSession::new(sender)))),
            )
        };

        let mut session = slot.lock_owned().await;
        session.touch();
        session
    }

    pub fn remove(&self, sender: &str) -> bool {
        self.map().remove(sender).is_some()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Removes sessions idle longer than the TTL and returns how many went.
    /// A session someone holds, or is waiting on, is never removed: the map's
    /// reference is then not the only one.
    pub fn evict_expired(&self) -> usize {
        let mut sessions = self.map();
        let before = sessions.len();
        sessions.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => session.idle_for() <= self.ttl,
                Err(_) => true,
            }
        });
        before - sessions.len()
    }

    /// Runs `evict_expired` every `every` until the returned task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = store.evict_expired();
                if evicted > 0 {
                    debug!(
                        event_name = "agent.sessions.evicted",
                        evicted,
                        remaining = store.len(),
                        "evicted idle chat sessions"
                    );
                }
            }
        })
    }
}
