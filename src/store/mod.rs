//! File-backed repository: an append-only journal of ledger ops plus a
//! periodic checkpoint of the folded state.
//!
//! A directory holds three files:
//!
//! - `ledger.jsonl`, one serialized write per line, never rewritten;
//! - `ledger.snapshot.json`, the state as of a journal byte offset;
//! - `ledger.lock`, held exclusively while a [`FileRepository`] is open.
//!
//! Opening loads the checkpoint, checks it still matches the journal and
//! folds in whatever was appended after it.

mod checkpoint;
mod journal;

use crate::error::StoreResult;
use crate::memory::{DEFAULT_BATCH_LIMIT, LedgerOp, LedgerState};
use crate::model::{
    BatchUpdate, EventId, EventKind, EventPatch, EventRecord, StoredEvent, Vehicle, VehicleId,
    VehicleUpdate,
};
use crate::repository::EventRepository;
use checkpoint::Checkpoint;
use fs2::FileExt;
use journal::Journal;
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const JOURNAL_FILE: &str = "ledger.jsonl";
const CHECKPOINT_FILE: &str = "ledger.snapshot.json";
const LOCK_FILE: &str = "ledger.lock";

/// Writes between automatic checkpoints when none is configured.
pub const DEFAULT_CHECKPOINT_EVERY: usize = 256;

enum CheckpointValidity {
    Valid,
    OffsetBeyondEof,
    HashMismatch,
}

/// Durable [`EventRepository`] over a directory on disk.
///
/// Every write is one synced journal line, so a batch either lands whole
/// or not at all. Only one `FileRepository` may hold a directory at a time.
///
/// # Examples
///
/// ```
/// use fleetfold::{EventRepository, FileRepository, Vehicle, VehicleId};
///
/// let dir = tempfile::tempdir().unwrap();
/// {
///     let mut repo = FileRepository::open(dir.path()).unwrap();
///     repo.insert_vehicle(Vehicle::new("van-1", "Transit", 80.0, 0.0, 40.0)).unwrap();
/// }
/// let repo = FileRepository::open(dir.path()).unwrap();
/// assert!(repo.get_vehicle(&VehicleId::from("van-1")).is_ok());
/// ```
pub struct FileRepository {
    dir: PathBuf,
    journal: Journal,
    checkpoint_path: PathBuf,
    _lock: File,
    state: LedgerState,
    offset: u64,
    hash: String,
    batch_limit: usize,
    checkpoint_every: usize,
    since_checkpoint: usize,
}

impl std::fmt::Debug for FileRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRepository")
            .field("dir", &self.dir)
            .field("offset", &self.offset)
            .field("vehicles", &self.state.vehicle_count())
            .finish()
    }
}

/// Builder for [`FileRepository`].
#[derive(Debug, Clone)]
pub struct FileRepositoryBuilder {
    dir: PathBuf,
    batch_limit: usize,
    checkpoint_every: usize,
}

impl FileRepositoryBuilder {
    /// Largest batch accepted by `batch_update`. Clamped to at least 1.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Save a checkpoint after this many writes. 0 disables automatic
    /// checkpoints; [`FileRepository::checkpoint`] still works.
    pub fn checkpoint_every(mut self, writes: usize) -> Self {
        self.checkpoint_every = writes;
        self
    }

    /// Open the directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::AlreadyExists`] if another repository
    /// holds the lock, or with [`io::ErrorKind::InvalidData`] if a complete
    /// journal line cannot be parsed.
    pub fn open(self) -> StoreResult<FileRepository> {
        fs::create_dir_all(&self.dir)?;
        let lock = acquire_lock(&self.dir.join(LOCK_FILE))?;
        let mut journal = Journal::open(self.dir.join(JOURNAL_FILE))?;
        let checkpoint_path = self.dir.join(CHECKPOINT_FILE);

        let (mut state, mut offset, mut hash) =
            match checkpoint::load::<LedgerState>(&checkpoint_path)? {
                Some(cp) => match verify(&journal, &cp)? {
                    CheckpointValidity::Valid => (cp.state, cp.offset, cp.hash),
                    CheckpointValidity::OffsetBeyondEof => {
                        warn!(
                            "checkpoint offset {} is beyond journal EOF in {}, rebuilding",
                            cp.offset,
                            self.dir.display()
                        );
                        (LedgerState::default(), 0, String::new())
                    }
                    CheckpointValidity::HashMismatch => {
                        warn!(
                            "checkpoint hash mismatch in {}, rebuilding",
                            self.dir.display()
                        );
                        (LedgerState::default(), 0, String::new())
                    }
                },
                None => (LedgerState::default(), 0, String::new()),
            };

        let mut folded = 0usize;
        for item in journal.read_from(offset)? {
            let (op, next_offset, line_hash) = item?;
            state.apply(op)?;
            offset = next_offset;
            hash = line_hash;
            folded += 1;
        }

        let len = journal.len()?;
        if len > offset {
            warn!(
                "discarding {} bytes of incomplete journal tail in {}",
                len - offset,
                journal.path().display()
            );
            journal.truncate(offset)?;
        }

        info!(
            "opened ledger at {}: {} vehicles, {} journal ops folded on open",
            self.dir.display(),
            state.vehicle_count(),
            folded
        );

        Ok(FileRepository {
            dir: self.dir,
            journal,
            checkpoint_path,
            _lock: lock,
            state,
            offset,
            hash,
            batch_limit: self.batch_limit,
            checkpoint_every: self.checkpoint_every,
            since_checkpoint: folded,
        })
    }
}

fn acquire_lock(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive().map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("another writer holds the lock on {}", path.display()),
        )
    })?;
    Ok(file)
}

fn verify(journal: &Journal, cp: &Checkpoint<LedgerState>) -> io::Result<CheckpointValidity> {
    if cp.offset == 0 {
        return Ok(CheckpointValidity::Valid);
    }
    if cp.offset > journal.len()? {
        return Ok(CheckpointValidity::OffsetBeyondEof);
    }
    match journal.line_hash_before(cp.offset)? {
        Some(h) if h == cp.hash => Ok(CheckpointValidity::Valid),
        _ => Ok(CheckpointValidity::HashMismatch),
    }
}

impl FileRepository {
    /// Open `dir` with default settings.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        Self::builder(dir).open()
    }

    /// Start configuring a repository over `dir`.
    pub fn builder(dir: impl AsRef<Path>) -> FileRepositoryBuilder {
        FileRepositoryBuilder {
            dir: dir.as_ref().to_path_buf(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }

    /// The directory holding the journal, checkpoint and lock.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Byte length of the journal folded into the current state.
    pub fn journal_offset(&self) -> u64 {
        self.offset
    }

    /// Persist the current state so the next open skips the journal prefix.
    ///
    /// Automatic checkpoints call this after a write; their failures are
    /// logged rather than returned, since the write itself already landed.
    pub fn checkpoint(&mut self) -> StoreResult<()> {
        let cp = Checkpoint::new(&self.state, self.offset, self.hash.clone());
        checkpoint::save(&self.checkpoint_path, &cp)?;
        self.since_checkpoint = 0;
        info!("checkpoint saved at journal offset {}", self.offset);
        Ok(())
    }

    fn commit(&mut self, op: LedgerOp) -> StoreResult<()> {
        let appended = self.journal.append(&op)?;
        self.state.apply(op)?;
        self.offset = appended.end_offset;
        self.hash = appended.line_hash;
        self.since_checkpoint += 1;
        // The op is already durable; a failed checkpoint is retried on the
        // next write.
        if self.checkpoint_every > 0 && self.since_checkpoint >= self.checkpoint_every {
            if let Err(e) = self.checkpoint() {
                warn!(
                    "automatic checkpoint failed in {}: {e}",
                    self.dir.display()
                );
            }
        }
        Ok(())
    }
}

impl EventRepository for FileRepository {
    fn get_vehicle(&self, id: &VehicleId) -> StoreResult<Vehicle> {
        self.state.vehicle(id).cloned()
    }

    fn insert_vehicle(&mut self, vehicle: Vehicle) -> StoreResult<()> {
        let op = self.state.plan_insert_vehicle(vehicle)?;
        self.commit(op)
    }

    fn update_vehicle(&mut self, id: &VehicleId, update: &VehicleUpdate) -> StoreResult<Vehicle> {
        let op = self.state.plan_update_vehicle(id, update)?;
        self.commit(op)?;
        self.get_vehicle(id)
    }

    fn list_events(&self, vehicle: &VehicleId, kind: EventKind) -> StoreResult<Vec<StoredEvent>> {
        self.state.events(vehicle, kind)
    }

    fn append_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
    ) -> StoreResult<EventId> {
        let (id, op) = self.state.plan_append(vehicle, kind, record, None)?;
        self.commit(op)?;
        Ok(id)
    }

    fn append_event_if(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        record: EventRecord,
        expected_version: u64,
    ) -> StoreResult<EventId> {
        let (id, op) = self
            .state
            .plan_append(vehicle, kind, record, Some(expected_version))?;
        self.commit(op)?;
        Ok(id)
    }

    fn update_event(
        &mut self,
        vehicle: &VehicleId,
        kind: EventKind,
        id: EventId,
        patch: &EventPatch,
    ) -> StoreResult<()> {
        let op = self.state.plan_update_event(vehicle, kind, id, patch)?;
        self.commit(op)
    }

    fn delete_event(&mut self, vehicle: &VehicleId, kind: EventKind, id: EventId) -> StoreResult<()> {
        let op = self.state.plan_delete_event(vehicle, kind, id)?;
        self.commit(op)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }

    fn batch_update(&mut self, updates: &[BatchUpdate]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let op = self.state.plan_batch(updates, self.batch_limit)?;
        self.commit(op)
    }
}

