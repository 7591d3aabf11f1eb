use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::{SessionStore, StageRecord, StoreError};
use crate::models::StageName;

/// Process-local store keyed by session id.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Vec<StageRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> Result<usize, StoreError> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.len())
    }
}

impl SessionStore for InMemorySessionStore {
    fn append(&self, record: StageRecord) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| StoreError::LockPoisoned)?;
        sessions.entry(record.session_id).or_default().push(record);
        Ok(())
    }

    fn latest(
        &self,
        session_id: &Uuid,
        stage: StageName,
    ) -> Result<Option<StageRecord>, StoreError> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions
            .get(session_id)
            .and_then(|records| records.iter().rev().find(|r| r.stage == stage))
            .cloned())
    }

    fn history(&self, session_id: &Uuid) -> Result<Vec<StageRecord>, StoreError> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn remove(&self, session_id: &Uuid) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.remove(session_id).map_or(0, |records| records.len()))
    }
}
