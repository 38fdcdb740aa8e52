//! In-memory store of live consultations.
//!
//! Each session sits behind its own mutex, so two actions for the same
//! session are applied one after the other while different sessions proceed
//! independently. Sessions nobody has touched for a while are swept by
//! `spawn_expiry_task`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::controller::FlowController;
use super::generators::{AdviceGenerator, QuestionGenerator};

/// A shared handle to one consultation.
pub type SessionHandle = Arc<Mutex<FlowController>>;

/// How often the expiry task sweeps the store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct SessionEntry {
    handle: SessionHandle,
    last_active: Instant,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    questions: Arc<dyn QuestionGenerator>,
    advice: Arc<dyn AdviceGenerator>,
    max_questions: usize,
}

impl SessionStore {
    pub fn new(
        questions: Arc<dyn QuestionGenerator>,
        advice: Arc<dyn AdviceGenerator>,
        max_questions: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            questions,
            advice,
            max_questions,
        })
    }

    /// A controller wired to this store's generators, not registered.
    pub fn new_controller(&self) -> FlowController {
        FlowController::new(
            Arc::clone(&self.questions),
            Arc::clone(&self.advice),
            self.max_questions,
        )
    }

    /// Start a new session on the specialty menu.
    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let handle = Arc::new(Mutex::new(self.new_controller()));
        let entry = SessionEntry {
            handle: Arc::clone(&handle),
            last_active: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        info!(session_id = %id, "Consultation session created");
        (id, handle)
    }

    /// Look a session up and mark it active.
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_active = Instant::now();
        Some(Arc::clone(&entry.handle))
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Consultation session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many were removed.
    ///
    /// A request already holding a handle keeps working on it; the session
    /// just can no longer be looked up.
    pub async fn expire_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let idle = entry.last_active.elapsed();
            if idle < ttl {
                return true;
            }
            debug!(session_id = %id, idle_secs = idle.as_secs(), "Consultation session expired");
            false
        });
        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired, remaining = sessions.len(), "Expired idle sessions");
        }
        expired
    }
}

/// Spawn a background task that periodically drops idle sessions.
pub fn spawn_expiry_task(store: Arc<SessionStore>, ttl: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            store.expire_idle(ttl).await;
        }
    })
}
