//! File-backed context store.
//!
//! Storage layout under the store directory:
//! - `contexts.json`: every candidate record, keyed by candidate id
//! - `audit_log.jsonl`: one JSON-encoded [`AuditEntry`] per line
//!
//! Both files are loaded on open, so reads are served from memory. A write
//! appends its new audit lines, then replaces `contexts.json` through a
//! temporary file. The in-memory state only changes once both steps succeed;
//! a failed write leaves memory and disk as they were.

use async_trait::async_trait;
use chrono::Utc;
use compagent_core::audit::AuditEntry;
use compagent_core::candidate::{CandidateContext, ContextPatch};
use compagent_core::error::StoreError;
use compagent_core::store::ContextStore;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::state::ContextState;

const CONTEXTS_FILE: &str = "contexts.json";
const CONTEXTS_TMP: &str = "contexts.json.tmp";
const AUDIT_FILE: &str = "audit_log.jsonl";

/// A context store persisted as JSON files.
pub struct FileContextStore {
    dir: PathBuf,
    state: Arc<RwLock<ContextState>>,
}

impl FileContextStore {
    /// Open (or start) a store in `dir`. Expired records are dropped on load.
    pub fn open(dir: &Path, retention_days: u32) -> Result<Self, StoreError> {
        let contexts = Self::load_contexts(&dir.join(CONTEXTS_FILE))?;
        let audit = Self::load_audit(&dir.join(AUDIT_FILE))?;

        let mut state = ContextState::with_records(contexts, audit, retention_days);
        let purged = state.purge_expired(Utc::now());
        if purged > 0 {
            info!(purged, "Dropped expired candidate records");
        }
        debug!(
            dir = %dir.display(),
            records = state.contexts.len(),
            audit_entries = state.audit.len(),
            "File context store loaded"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            state: Arc::new(RwLock::new(state)),
        })
    }

    fn load_contexts(path: &Path) -> Result<HashMap<String, CandidateContext>, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
    }

    /// Unreadable lines are skipped here but stay in the file, since writes
    /// only ever append to it.
    fn load_audit(path: &Path) -> Result<Vec<AuditEntry>, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", path.display()))),
        };

        let entries = bytes
            .split(|b| *b == b'\n')
            .enumerate()
            .filter_map(|(index, raw)| {
                let line = String::from_utf8_lossy(raw);
                if line.trim().is_empty() {
                    return None;
                }
                match serde_json::from_str::<AuditEntry>(&line) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(line = index + 1, error = %e, "Skipping corrupted audit entry");
                        None
                    }
                }
            })
            .collect();
        Ok(entries)
    }

    /// Run `change` against a copy of the state, persist the result, and
    /// only then make it visible.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut ContextState) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let known = next.audit.len();
        let out = change(&mut next);
        self.flush(&next, &next.audit[known..])?;
        *state = next;
        Ok(out)
    }

    /// Append `new_entries` to the audit log and replace the contexts file.
    /// If the contexts file cannot be replaced the appended lines are cut
    /// off again.
    fn flush(&self, state: &ContextState, new_entries: &[AuditEntry]) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Io(format!("Failed to create store directory: {e}")))?;

        let contexts = serde_json::to_string_pretty(&state.contexts)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut lines = String::new();
        for entry in new_entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let audit_path = self.dir.join(AUDIT_FILE);
        let appended_at = if lines.is_empty() {
            None
        } else {
            Some(append_lines(&audit_path, &lines)?)
        };

        if let Err(e) = self.replace_contexts(&contexts) {
            if let Some(len) = appended_at {
                truncate(&audit_path, len);
            }
            return Err(e);
        }
        Ok(())
    }

    fn replace_contexts(&self, contexts: &str) -> Result<(), StoreError> {
        let tmp = self.dir.join(CONTEXTS_TMP);
        std::fs::write(&tmp, contexts)
            .map_err(|e| StoreError::Io(format!("Failed to write contexts: {e}")))?;
        if let Err(e) = std::fs::rename(&tmp, self.dir.join(CONTEXTS_FILE)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::Io(format!("Failed to replace contexts: {e}")));
        }
        Ok(())
    }
}

/// Append to the audit log, starting a fresh line if the file does not end
/// with one. Returns the file length before the append.
fn append_lines(path: &Path, lines: &str) -> Result<u64, StoreError> {
    let io_err = |e: std::io::Error| StoreError::Io(format!("Failed to append audit log: {e}"));
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();

    let mut needs_newline = false;
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1)).map_err(io_err)?;
        file.read_exact(&mut last).map_err(io_err)?;
        needs_newline = last[0] != b'\n';
    }

    let result = (|| {
        if needs_newline {
            file.write_all(b"\n")?;
        }
        file.write_all(lines.as_bytes())?;
        file.sync_data()
    })();
    if let Err(e) = result {
        truncate(path, len);
        return Err(io_err(e));
    }
    Ok(len)
}

fn truncate(path: &Path, len: u64) {
    let result = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(len));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "Failed to roll back audit append");
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, candidate_id: &str) -> Result<Option<CandidateContext>, StoreError> {
        Ok(self.state.read().await.get(candidate_id, Utc::now()).cloned())
    }

    async fn put(
        &self,
        context: CandidateContext,
        user: &str,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        self.commit(|state| state.put(context, user, Utc::now()))
            .await
    }

    async fn apply(
        &self,
        candidate_id: &str,
        patch: &ContextPatch,
        user: &str,
    ) -> Result<CandidateContext, StoreError> {
        let (ctx, entries) = self
            .commit(|state| state.apply(candidate_id, patch, user, Utc::now()))
            .await?;
        debug!(candidate_id, changes = entries.len(), "Context patched");
        Ok(ctx)
    }

    async fn append_audit(
        &self,
        _candidate_id: &str,
        entries: Vec<AuditEntry>,
    ) -> Result<(), StoreError> {
        self.commit(|state| state.append_audit(entries)).await
    }

    async fn audit_log(&self, candidate_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.state.read().await.audit_log(candidate_id))
    }

    async fn list_active(&self, user: &str) -> Result<Vec<CandidateContext>, StoreError> {
        debug!(user, "Listing active candidates");
        Ok(self.state.read().await.list_active(Utc::now()))
    }

    async fn list_closed(&self) -> Result<Vec<CandidateContext>, StoreError> {
        Ok(self.state.read().await.list_closed(Utc::now()))
    }

    async fn reset(&self, candidate_id: &str, user: &str) -> Result<bool, StoreError> {
        self.commit(|state| state.reset(candidate_id, user, Utc::now()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use compagent_core::candidate::{JobLevel, Location};
    use std::io::Write;

    #[tokio::test]
    async fn records_and_audit_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileContextStore::open(dir.path(), 60).unwrap();
            let patch = ContextPatch {
                job_title: Some("Software Engineer".into()),
                job_level: Some(JobLevel::P3),
                ..Default::default()
            };
            store.apply("CAND-001", &patch, "comp@example.com").await.unwrap();
        }

        let store = FileContextStore::open(dir.path(), 60).unwrap();
        let ctx = store.get("CAND-001").await.unwrap().unwrap();
        assert_eq!(ctx.job_level, Some(JobLevel::P3));
        assert_eq!(store.audit_log("CAND-001").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn audit_timestamps_continue_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let last = {
            let store = FileContextStore::open(dir.path(), 60).unwrap();
            store.apply("CAND-1", &ContextPatch::default(), "a").await.unwrap();
            store.audit_log("CAND-1").await.unwrap().last().unwrap().timestamp
        };

        let store = FileContextStore::open(dir.path(), 60).unwrap();
        let patch = ContextPatch {
            location: Some(Location::Sin),
            ..Default::default()
        };
        store.apply("CAND-1", &patch, "a").await.unwrap();
        let log = store.audit_log("CAND-1").await.unwrap();
        assert!(log.last().unwrap().timestamp > last);
    }

    #[tokio::test]
    async fn expired_records_are_purged_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileContextStore::open(dir.path(), 60).unwrap();
            let mut ctx = CandidateContext::new("CAND-OLD", "a", Utc::now());
            ctx.updated_at = Utc::now() - Duration::days(90);
            store.put(ctx, "a").await.unwrap();
        }

        let store = FileContextStore::open(dir.path(), 60).unwrap();
        assert!(store.get("CAND-OLD").await.unwrap().is_none());
        assert!(!store.audit_log("CAND-OLD").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_audit_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileContextStore::open(dir.path(), 60).unwrap();
            store.apply("CAND-1", &ContextPatch::default(), "a").await.unwrap();
        }
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(AUDIT_FILE))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        let store = FileContextStore::open(dir.path(), 60).unwrap();
        assert_eq!(store.audit_log("CAND-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_audit_lines_survive_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileContextStore::open(dir.path(), 60).unwrap();
            let patch = ContextPatch {
                job_level: Some(JobLevel::P3),
                ..Default::default()
            };
            store.apply("CAND-1", &patch, "a").await.unwrap();
        }
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(AUDIT_FILE))
            .unwrap();
        file.write_all(b"\xff\xfe garbage").unwrap();
        drop(file);

        let store = FileContextStore::open(dir.path(), 60).unwrap();
        assert_eq!(store.audit_log("CAND-1").await.unwrap().len(), 2);
        let patch = ContextPatch {
            location: Some(Location::Sea),
            ..Default::default()
        };
        store.apply("CAND-1", &patch, "a").await.unwrap();

        let bytes = std::fs::read(dir.path().join(AUDIT_FILE)).unwrap();
        assert!(bytes.windows(2).any(|w| w == b"\xff\xfe"));

        let reopened = FileContextStore::open(dir.path(), 60).unwrap();
        let log = reopened.audit_log("CAND-1").await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.last().unwrap().field, "location");
    }

    #[tokio::test]
    async fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContextStore::open(dir.path(), 60).unwrap();
        let p3 = ContextPatch {
            job_level: Some(JobLevel::P3),
            ..Default::default()
        };
        store.apply("CAND-1", &p3, "a").await.unwrap();
        let audit_before = std::fs::read(dir.path().join(AUDIT_FILE)).unwrap();

        // A directory in place of the contexts file makes the replace fail.
        std::fs::remove_file(dir.path().join(CONTEXTS_FILE)).unwrap();
        std::fs::create_dir(dir.path().join(CONTEXTS_FILE)).unwrap();
        std::fs::write(dir.path().join(CONTEXTS_FILE).join("keep"), "x").unwrap();

        let p5 = ContextPatch {
            job_level: Some(JobLevel::P5),
            ..Default::default()
        };
        assert!(matches!(
            store.apply("CAND-1", &p5, "a").await,
            Err(StoreError::Io(_))
        ));

        let ctx = store.get("CAND-1").await.unwrap().unwrap();
        assert_eq!(ctx.job_level, Some(JobLevel::P3));
        assert_eq!(store.audit_log("CAND-1").await.unwrap().len(), 2);
        assert_eq!(std::fs::read(dir.path().join(AUDIT_FILE)).unwrap(), audit_before);
        assert!(!dir.path().join(CONTEXTS_TMP).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_audit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(AUDIT_FILE)).unwrap();
        assert!(matches!(
            FileContextStore::open(dir.path(), 60),
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn corrupted_contexts_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONTEXTS_FILE), "[oops").unwrap();
        assert!(matches!(
            FileContextStore::open(dir.path(), 60),
            Err(StoreError::Serialization(_))
        ));
    }
}
