//! Append-only JSONL journal of stage records.
//!
//! One JSON object per line. An in-memory index maps each session id to the
//! byte offsets of its lines, so lookups read only that session's records.
//! The index is built on first use and catches up with lines appended by
//! other writers.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use uuid::Uuid;

use super::{SessionStore, StageRecord, StoreError};
use crate::models::StageName;

/// The part of a record the index needs.
#[derive(Deserialize)]
struct RecordKey {
    session_id: Uuid,
    stage: StageName,
}

#[derive(Default)]
struct Index {
    /// Bytes of the file already indexed.
    covered: u64,
    entries: HashMap<Uuid, Vec<(StageName, u64)>>,
}

impl Index {
    /// Index complete lines past `covered`. A trailing partial line is left
    /// for the next call.
    fn catch_up(&mut self, file: &mut File) -> Result<(), StoreError> {
        let len = file.metadata()?.len();
        if len < self.covered {
            *self = Index::default();
        }
        if len == self.covered {
            return Ok(());
        }

        file.seek(SeekFrom::Start(self.covered))?;
        let mut reader = BufReader::new(&mut *file);
        let mut offset = self.covered;
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 || line.last() != Some(&b'\n') {
                break;
            }
            if !line.trim_ascii().is_empty() {
                match serde_json::from_slice::<RecordKey>(&line) {
                    Ok(key) => self
                        .entries
                        .entry(key.session_id)
                        .or_default()
                        .push((key.stage, offset)),
                    Err(e) => {
                        tracing::warn!(offset, error = %e, "Skipping unreadable journal line");
                    }
                }
            }
            offset += read as u64;
        }
        self.covered = offset;
        Ok(())
    }
}

pub struct JsonlJournal {
    path: PathBuf,
    /// Serializes writers and guards the index.
    index: Mutex<Option<Index>>,
}

impl JsonlJournal {
    /// Open (creating parent directories) a journal at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            index: Mutex::new(None),
        })
    }

    /// Journal at the configured default location.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(crate::config::journal_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offsets of the session's lines, optionally of one stage, oldest first.
    /// `None` when the journal file does not exist yet.
    fn offsets(
        &self,
        session_id: &Uuid,
        stage: Option<StageName>,
    ) -> Result<Option<(File, Vec<u64>)>, StoreError> {
        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                *index = None;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let index = index.get_or_insert_with(Index::default);
        index.catch_up(&mut file)?;
        let offsets = index
            .entries
            .get(session_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(s, _)| stage.map_or(true, |want| *s == want))
                    .map(|(_, offset)| *offset)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some((file, offsets)))
    }

    /// The record on the line starting at `offset`, if it parses and belongs
    /// to `session_id`.
    fn read_at(
        file: &mut File,
        offset: u64,
        session_id: &Uuid,
    ) -> Result<Option<StageRecord>, StoreError> {
        file.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        BufReader::new(&mut *file).read_until(b'\n', &mut line)?;
        match serde_json::from_slice::<StageRecord>(&line) {
            Ok(record) if record.session_id == *session_id => Ok(Some(record)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(offset, error = %e, "Skipping unreadable journal line");
                Ok(None)
            }
        }
    }
}

impl SessionStore for JsonlJournal {
    fn append(&self, record: StageRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let offset = file.metadata()?.len();
        file.write_all(line.as_bytes())?;
        file.flush()?;

        if let Some(index) = index.as_mut().filter(|i| i.covered == offset) {
            index
                .entries
                .entry(record.session_id)
                .or_default()
                .push((record.stage, offset));
            index.covered = offset + line.len() as u64;
        }

        tracing::debug!(
            session_id = %record.session_id,
            stage = %record.stage,
            offset,
            "Stage record journaled"
        );
        Ok(())
    }

    fn latest(
        &self,
        session_id: &Uuid,
        stage: StageName,
    ) -> Result<Option<StageRecord>, StoreError> {
        let Some((mut file, offsets)) = self.offsets(session_id, Some(stage))? else {
            return Ok(None);
        };
        for offset in offsets.into_iter().rev() {
            if let Some(record) = Self::read_at(&mut file, offset, session_id)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn history(&self, session_id: &Uuid) -> Result<Vec<StageRecord>, StoreError> {
        let Some((mut file, offsets)) = self.offsets(session_id, None)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(offsets.len());
        for offset in offsets {
            out.extend(Self::read_at(&mut file, offset, session_id)?);
        }
        Ok(out)
    }

    /// Rewrite the journal without the session's lines. Lines that are not
    /// stage records are kept as they are.
    fn remove(&self, session_id: &Uuid) -> Result<usize, StoreError> {
        let mut index = self.index.lock().map_err(|_| StoreError::LockPoisoned)?;
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut kept = Vec::new();
        let mut removed = 0;
        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        while reader.read_until(b'\n', &mut line)? > 0 {
            let matches = serde_json::from_slice::<RecordKey>(&line)
                .is_ok_and(|key| key.session_id == *session_id);
            if matches {
                removed += 1;
            } else {
                kept.extend_from_slice(&line);
            }
            line.clear();
        }
        if removed == 0 {
            return Ok(0);
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, &kept)?;
        fs::rename(&tmp, &self.path)?;
        *index = None;

        tracing::info!(session_id = %session_id, removed, "Session removed from journal");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageResult;
    use crate::session::fixtures::treatment_record;
    use std::sync::Arc;

    fn focus(record: &StageRecord) -> &str {
        match &record.output {
            StageResult::Treatment(plan) => &plan.treatment_focus,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::open(dir.path().join("raw/stage_responses.jsonl")).unwrap();
        let id = Uuid::new_v4();

        journal.append(treatment_record(id, "first")).unwrap();
        journal.append(treatment_record(id, "second")).unwrap();

        let content = fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["source"], "user_generated");
            assert_eq!(value["session_id"], id.to_string());
        }
    }

    #[test]
    fn latest_finds_session_and_stage() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::open(dir.path().join("j.jsonl")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        journal.append(treatment_record(a, "a-1")).unwrap();
        journal.append(treatment_record(b, "b-1")).unwrap();
        journal.append(treatment_record(a, "a-2")).unwrap();

        let latest = journal.latest(&a, StageName::Treatment).unwrap().unwrap();
        assert_eq!(focus(&latest), "a-2");
        assert_eq!(journal.history(&b).unwrap().len(), 1);
        assert!(journal.latest(&a, StageName::Refinement).unwrap().is_none());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::open(dir.path().join("absent.jsonl")).unwrap();
        assert!(journal.history(&Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn foreign_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let id = Uuid::new_v4();
        let journal = JsonlJournal::open(&path).unwrap();
        journal.append(treatment_record(id, "kept")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"not\": \"a stage record\"}}").unwrap();
        writeln!(file, "garbage").unwrap();

        let history = journal.history(&id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(focus(&history[0]), "kept");
    }

    #[test]
    fn index_picks_up_lines_from_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let id = Uuid::new_v4();
        let journal = JsonlJournal::open(&path).unwrap();
        journal.append(treatment_record(id, "ours")).unwrap();
        assert_eq!(journal.history(&id).unwrap().len(), 1);

        let other = JsonlJournal::open(&path).unwrap();
        other.append(treatment_record(id, "theirs")).unwrap();
        journal.append(treatment_record(id, "ours again")).unwrap();

        let history = journal.history(&id).unwrap();
        let foci: Vec<&str> = history.iter().map(focus).collect();
        assert_eq!(foci, vec!["ours", "theirs", "ours again"]);
        let latest = journal.latest(&id, StageName::Treatment).unwrap().unwrap();
        assert_eq!(focus(&latest), "ours again");
    }

    #[test]
    fn partial_trailing_line_is_read_once_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let id = Uuid::new_v4();
        let journal = JsonlJournal::open(&path).unwrap();
        journal.append(treatment_record(id, "first")).unwrap();

        let line = serde_json::to_string(&treatment_record(id, "second")).unwrap();
        let (head, tail) = line.split_at(line.len() / 2);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{head}").unwrap();
        assert_eq!(journal.history(&id).unwrap().len(), 1);

        writeln!(file, "{tail}").unwrap();
        let latest = journal.latest(&id, StageName::Treatment).unwrap().unwrap();
        assert_eq!(focus(&latest), "second");
    }

    #[test]
    fn remove_rewrites_without_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("j.jsonl");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let journal = JsonlJournal::open(&path).unwrap();
        journal.append(treatment_record(a, "a-1")).unwrap();
        journal.append(treatment_record(b, "b-1")).unwrap();
        journal.append(treatment_record(a, "a-2")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "garbage").unwrap();
        assert_eq!(journal.history(&a).unwrap().len(), 2);

        assert_eq!(journal.remove(&a).unwrap(), 2);
        assert!(journal.history(&a).unwrap().is_empty());
        assert!(journal.latest(&a, StageName::Treatment).unwrap().is_none());
        let rest = journal.history(&b).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(focus(&rest[0]), "b-1");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with("garbage\n"));
        assert_eq!(journal.remove(&a).unwrap(), 0);
    }

    #[test]
    fn remove_on_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let journal = JsonlJournal::open(dir.path().join("absent.jsonl")).unwrap();
        assert_eq!(journal.remove(&Uuid::new_v4()).unwrap(), 0);
    }

    #[test]
    fn concurrent_appends_produce_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(JsonlJournal::open(dir.path().join("j.jsonl")).unwrap());
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let journal = journal.clone();
                std::thread::spawn(move || {
                    journal.append(treatment_record(id, &format!("plan {i}"))).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(journal.history(&id).unwrap().len(), 10);
    }
}
