//! Append-only candidate store shared by every task of a pipeline.
//!
//! Writers serialize on a single mutex guarding the append path (and the
//! on-disk log). Readers never take that mutex: they clone an `Arc` to the
//! current snapshot, which is replaced copy-on-write on every append.

use super::types::{Candidate, CandidateId, NewCandidate};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// File name of the log inside a database directory
pub const LOG_FILE_NAME: &str = "candidates.jsonl";

/// A set of candidates marked active by a filtering task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub task: String,
    pub candidates: Vec<CandidateId>,
}

/// Immutable view of the database at one point in time
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    candidates: Vec<Arc<Candidate>>,
    selections: Vec<Arc<Selection>>,
}

impl Snapshot {
    pub fn candidates(&self) -> &[Arc<Candidate>] {
        &self.candidates
    }

    pub fn selections(&self) -> &[Arc<Selection>] {
        &self.selections
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: CandidateId) -> Option<&Arc<Candidate>> {
        // ids are dense and assigned in insertion order
        self.candidates
            .get(usize::try_from(id.0).ok()?)
            .filter(|c| c.id() == id)
    }

    fn best(&self, k: usize) -> Vec<Arc<Candidate>> {
        let mut scored: Vec<(f64, &Arc<Candidate>)> = self
            .candidates
            .iter()
            .filter_map(|c| c.merit().map(|m| (m, c)))
            .collect();
        // stable sort keeps insertion order among equal merits
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.into_iter().take(k).map(|(_, c)| Arc::clone(c)).collect()
    }
}

/// Lazy, restartable filtered view over a snapshot
pub struct Query<P> {
    snapshot: Arc<Snapshot>,
    predicate: P,
}

impl<P> Query<P>
where
    P: Fn(&Candidate) -> bool,
{
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Candidate>> + '_ {
        self.snapshot.candidates.iter().filter(move |c| {
            let candidate: &Candidate = c;
            (self.predicate)(candidate)
        })
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn to_vec(&self) -> Vec<Arc<Candidate>> {
        self.iter().cloned().collect()
    }
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogEntry<'a> {
    Candidate(&'a Candidate),
    Selection(&'a Selection),
}

#[derive(Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogRecord {
    Candidate(Candidate),
    Selection(Selection),
}

struct Writer {
    next_id: u64,
    log: Option<BufWriter<File>>,
}

impl Writer {
    /// Persistence failures never fail an append; memory stays authoritative
    fn persist(&mut self, entry: &LogEntry<'_>) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        let result = serde_json::to_writer(&mut *log, entry)
            .map_err(Error::from)
            .and_then(|()| log.write_all(b"\n").map_err(Error::from))
            .and_then(|()| log.flush().map_err(Error::from));
        if let Err(e) = result {
            error!(error = %e, "failed to persist database record");
        }
    }
}

/// Candidate database shared by all tasks of a pipeline
pub struct CandidateDatabase {
    writer: Mutex<Writer>,
    snapshot: RwLock<Arc<Snapshot>>,
    path: Option<PathBuf>,
}

impl CandidateDatabase {
    /// Database that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            writer: Mutex::new(Writer { next_id: 0, log: None }),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            path: None,
        }
    }

    /// Open (or create) a database directory. Existing records are replayed
    /// so the history continues where the previous run stopped.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);

        let mut snapshot = Snapshot::default();
        if path.exists() {
            let text = fs::read_to_string(&path)?;
            let lines: Vec<&str> = text.split_inclusive('\n').collect();
            let mut valid_len = 0;
            for (index, raw) in lines.iter().enumerate() {
                let line = raw.trim();
                if !line.is_empty() {
                    match serde_json::from_str::<LogRecord>(line) {
                        Ok(LogRecord::Candidate(c)) => snapshot.candidates.push(Arc::new(c)),
                        Ok(LogRecord::Selection(s)) => snapshot.selections.push(Arc::new(s)),
                        // a run killed mid-write leaves a torn last record
                        Err(e) if index + 1 == lines.len() => {
                            warn!(path = %path.display(), error = %e, "dropping incomplete last record");
                            break;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                valid_len += raw.len();
            }
            if valid_len < text.len() {
                OpenOptions::new().write(true).open(&path)?.set_len(valid_len as u64)?;
            }
            info!(
                path = %path.display(),
                candidates = snapshot.candidates.len(),
                selections = snapshot.selections.len(),
                "replayed candidate database"
            );
        }

        let next_id = snapshot
            .candidates
            .iter()
            .map(|c| c.id().0 + 1)
            .max()
            .unwrap_or(0);
        let log = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: Mutex::new(Writer {
                next_id,
                log: Some(BufWriter::new(log)),
            }),
            snapshot: RwLock::new(Arc::new(snapshot)),
            path: Some(path),
        })
    }

    /// Location of the on-disk log, if persisted
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_writer(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in a new snapshot; only called with the writer lock held
    fn publish(&self, update: impl FnOnce(&mut Snapshot)) {
        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        update(Arc::make_mut(&mut current));
    }

    /// Current stable snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Record one candidate and return its fresh id
    pub fn append(&self, candidate: NewCandidate) -> CandidateId {
        self.append_batch(vec![candidate])[0]
    }

    /// Record a batch contiguously, preserving its order
    pub fn append_batch(&self, batch: Vec<NewCandidate>) -> Vec<CandidateId> {
        let mut writer = self.lock_writer();
        let mut records = Vec::with_capacity(batch.len());
        for new in batch {
            let id = CandidateId(writer.next_id);
            writer.next_id += 1;
            let candidate = Arc::new(Candidate::new(id, new));
            writer.persist(&LogEntry::Candidate(&candidate));
            records.push(candidate);
        }
        let ids: Vec<CandidateId> = records.iter().map(|c| c.id()).collect();
        self.publish(|snapshot| snapshot.candidates.extend(records));
        debug!(count = ids.len(), "appended candidates");
        ids
    }

    /// Append a selection marking `candidates` active for later tasks
    pub fn mark_active(&self, task: impl Into<String>, candidates: Vec<CandidateId>) {
        let mut writer = self.lock_writer();
        let selection = Arc::new(Selection {
            task: task.into(),
            candidates,
        });
        writer.persist(&LogEntry::Selection(&selection));
        self.publish(|snapshot| snapshot.selections.push(selection));
    }

    /// Lazy view of every candidate matching `predicate`, in insertion order
    pub fn query<P>(&self, predicate: P) -> Query<P>
    where
        P: Fn(&Candidate) -> bool,
    {
        Query {
            snapshot: self.snapshot(),
            predicate,
        }
    }

    /// Up to `k` scored candidates by ascending merit, earlier insertion first on ties
    pub fn best(&self, k: usize) -> Vec<Arc<Candidate>> {
        self.snapshot().best(k)
    }

    pub fn get(&self, id: CandidateId) -> Option<Arc<Candidate>> {
        self.snapshot().get(id).cloned()
    }

    /// Candidates of the most recent selection, in selection order
    pub fn active(&self) -> Vec<Arc<Candidate>> {
        let snapshot = self.snapshot();
        snapshot
            .selections
            .last()
            .map(|s| s.candidates.iter().filter_map(|&id| snapshot.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn selections(&self) -> Vec<Arc<Selection>> {
        self.snapshot().selections.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CandidateDatabase {
    fn default() -> Self {
        Self::in_memory()
    }
}
