//! Session-keyed storage of stage results.
//!
//! A session id is minted when the intake stage starts and threads through
//! every later stage. Records are append-only; a whole session can be
//! removed at once.

pub mod journal;
pub mod memory;

pub use journal::JsonlJournal;
pub use memory::InMemorySessionStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{StageInput, StageName};
use crate::pipeline::orchestrator::FallbackRecord;
use crate::pipeline::StageResult;

/// Provenance tag written with every record.
pub const RECORD_SOURCE: &str = "user_generated";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store lock poisoned")]
    LockPoisoned,

    #[error("Session store task failed: {0}")]
    TaskFailed(String),

    #[error("No {stage} result stored for session {session_id}")]
    MissingStage { session_id: Uuid, stage: StageName },
}

/// Identity of one patient flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    /// Mint a fresh session (UUID v4).
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One persisted stage outcome (one JSONL line in the journal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub stage: StageName,
    pub input: StageInput,
    pub output: StageResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackRecord>,
    pub source: String,
}

impl StageRecord {
    pub fn new(
        session_id: Uuid,
        input: StageInput,
        output: StageResult,
        fallback: Option<FallbackRecord>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            stage: output.stage(),
            input,
            output,
            fallback,
            source: RECORD_SOURCE.to_string(),
        }
    }
}

/// Append-only, session-keyed record store. Implementations are internally
/// synchronized and shared as `Arc<dyn SessionStore>`.
pub trait SessionStore: Send + Sync {
    fn append(&self, record: StageRecord) -> Result<(), StoreError>;

    /// Most recent record of `stage` for the session, if any.
    fn latest(&self, session_id: &Uuid, stage: StageName)
        -> Result<Option<StageRecord>, StoreError>;

    /// Every record of the session, oldest first.
    fn history(&self, session_id: &Uuid) -> Result<Vec<StageRecord>, StoreError>;

    /// Drop every record of the session. Returns how many were removed.
    fn remove(&self, session_id: &Uuid) -> Result<usize, StoreError>;
}


#[cfg(test)]
mod tests {
    use super::fixtures::treatment_record;
    use super::*;
    use crate::pipeline::ErrorCategory;

    #[test]
    fn sessions_get_distinct_v4_ids() {
        let a = SessionContext::new();
        let b = SessionContext::new();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.get_version_num(), 4);
    }

    #[test]
    fn record_serializes_with_source_and_optional_fallback() {
        let id = Uuid::new_v4();
        let record = treatment_record(id, "mobility");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source"], "user_generated");
        assert_eq!(json["stage"], "treatment_plan");
        assert_eq!(json["session_id"], id.to_string());
        assert!(json.get("fallback").is_none());

        let mut with_fallback = record;
        with_fallback.fallback = Some(FallbackRecord {
            category: ErrorCategory::ModelUnavailable,
            reason: "connection refused".into(),
        });
        let json = serde_json::to_value(&with_fallback).unwrap();
        assert_eq!(json["fallback"]["category"], "model_unavailable");
    }
}
