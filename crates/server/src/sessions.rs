use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use shelfmate_agent::session::ConversationSession;
use shelfmate_core::config::ServerConfig;
use shelfmate_core::domain::mode::Mode;
use shelfmate_core::domain::session::SessionId;

pub type SharedSession = Arc<Mutex<ConversationSession>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle_ttl: Duration,
}

impl SessionLimits {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            max_sessions: server.max_sessions.max(1),
            idle_ttl: Duration::from_secs(server.session_idle_secs),
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { max_sessions: 10_000, idle_ttl: Duration::from_secs(1800) }
    }
}

struct Entry {
    session: SharedSession,
    touched: Instant,
}

/// In-process session registry. Each session has its own lock, so turns of one
/// session run one at a time while other sessions proceed.
///
/// Idle sessions expire after `idle_ttl`. Opening beyond `max_sessions` evicts the
/// least recently used one.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Entry>>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self { sessions: Arc::default(), limits }
    }

    pub async fn open(&self, mode: Mode, user_id: Option<String>) -> (SessionId, &'static str) {
        let session = ConversationSession::open(mode, user_id);
        let id = session.id().clone();
        let greeting = session.greeting();
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.touched) < self.limits.idle_ttl);
        let expired = before - sessions.len();

        let mut evicted = 0;
        while sessions.len() >= self.limits.max_sessions.max(1) {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.touched)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    sessions.remove(&oldest);
                    evicted += 1;
                }
                None => break,
            }
        }

        if expired > 0 || evicted > 0 {
            debug!(
                event_name = "session.store.pruned",
                expired,
                evicted,
                remaining = sessions.len(),
                "pruned conversation sessions"
            );
        }

        sessions.insert(id.clone(), Entry { session: Arc::new(Mutex::new(session)), touched: now });
        (id, greeting)
    }

    /// Looks a session up and marks it as used. Expired sessions are dropped and not returned.
    pub async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(id) {
            Some(entry) if now.duration_since(entry.touched) < self.limits.idle_ttl => {
                entry.touched = now;
                return Some(entry.session.clone());
            }
            Some(_) => {}
            None => return None,
        }
        sessions.remove(id);
        None
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
