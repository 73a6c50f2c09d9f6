// src/services/session_store.rs
use crate::errors::ReshapeError;
use crate::session::{Session, SessionPolicy};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory sessions. Nothing outlives the process.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    policy: SessionPolicy,
}

impl SessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn create(&self) -> (Uuid, SessionHandle) {
        let session = Session::new(self.policy);
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().insert(id, handle.clone());
        log::info!("Created session {}", id);
        (id, handle)
    }

    pub fn get(&self, id: &Uuid) -> Result<SessionHandle, ReshapeError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ReshapeError::SessionNotFound(id.to_string()))
    }

    /// Tears a session down. Uploads and their previews are released right
    /// away even if a request still holds the handle.
    pub fn remove(&self, id: &Uuid) -> Result<(), ReshapeError> {
        let handle = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| ReshapeError::SessionNotFound(id.to_string()))?;
        handle.lock().reset();
        log::info!("Removed session {}", id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
