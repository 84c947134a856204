//! Persistent job store.
//!
//! Jobs and their history live in SQLite. The store is the only component
//! that writes persisted state; every status change is validated against the
//! transition table, compare-and-swapped on the expected current status and
//! committed together with the history entry that explains it.

use crate::classify::DiscType;
use crate::jobs::{current_timestamp_ms, HistoryEntry, HistoryLevel, Job, JobStatus};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened, read or written.
    #[error("Job store unavailable: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A job already owns this output.
    #[error("A job already targets {path} title {title_index}")]
    Duplicate { path: PathBuf, title_index: u32 },

    /// The requested transition is not in the table.
    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    /// Another writer changed the job since the handle was read.
    #[error("Job {job_id} was expected in status {expected} but is {actual}")]
    StaleStatus {
        job_id: i64,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("Job {0} not found")]
    NotFound(i64),

    /// A stored value does not map onto the model.
    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    #[error("Job store lock poisoned")]
    Poisoned,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS videos (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    disc_title   TEXT    NOT NULL,
    path         TEXT    NOT NULL,
    disc_type    TEXT    NOT NULL,
    title_index  INTEGER NOT NULL,
    filename     TEXT,
    post_process INTEGER NOT NULL DEFAULT 0,
    status       TEXT    NOT NULL,
    created_at   INTEGER NOT NULL,
    updated_at   INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_videos_output
    ON videos(path, title_index)
    WHERE status <> 'rip_failed';

CREATE INDEX IF NOT EXISTS idx_videos_status
    ON videos(status, created_at);

CREATE TABLE IF NOT EXISTS history (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id  INTEGER NOT NULL REFERENCES videos(id),
    message   TEXT    NOT NULL,
    level     TEXT    NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_video
    ON history(video_id, id);

CREATE TRIGGER IF NOT EXISTS history_no_update
    BEFORE UPDATE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;

CREATE TRIGGER IF NOT EXISTS history_no_delete
    BEFORE DELETE ON history
BEGIN
    SELECT RAISE(ABORT, 'history is append-only');
END;
";

const JOB_COLUMNS: &str = "id, disc_title, path, disc_type, title_index, filename, post_process, status, created_at, updated_at";

/// SQLite-backed store of jobs and history.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore").finish_non_exhaustive()
    }
}

impl JobStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened job store");
        Self::with_connection(conn)
    }

    /// Open an existing database without writing to it (self-check mode).
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .and_then(|result| {
                if result == "ok" {
                    Ok(())
                } else {
                    Err(rusqlite::Error::InvalidQuery)
                }
            })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Create a job in `Created` status with its first history entry.
    ///
    /// Fails with [`StoreError::Duplicate`] if a job (other than a failed rip)
    /// already targets the same folder and title index.
    pub fn insert_job(
        &self,
        disc_title: &str,
        disc_path: &Path,
        disc_type: DiscType,
        title_index: u32,
        post_process: bool,
    ) -> Result<Job, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let path_str = path_to_db(disc_path);

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM videos WHERE path = ?1 AND title_index = ?2 AND status <> 'rip_failed'",
                params![path_str, title_index],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::Duplicate {
                path: disc_path.to_path_buf(),
                title_index,
            });
        }

        let now = current_timestamp_ms();
        tx.execute(
            "INSERT INTO videos (disc_title, path, disc_type, title_index, filename, post_process, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?7)",
            params![
                disc_title,
                path_str,
                disc_type.as_str(),
                title_index,
                post_process,
                JobStatus::Created.as_str(),
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_history_tx(&tx, id, "Video added to database", HistoryLevel::Info)?;
        tx.commit()?;

        debug!(job_id = id, disc_title, title_index, "job created");
        Ok(Job {
            id,
            disc_title: disc_title.to_string(),
            disc_path: disc_path.to_path_buf(),
            disc_type,
            title_index,
            filename: None,
            post_process,
            status: JobStatus::Created,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move `job` to `new_status`, optionally recording a new filename.
    ///
    /// The transition must be listed in [`JobStatus::allowed_next`] and the
    /// persisted status must still equal `job.status`. The `reason` becomes
    /// the transition's history entry. On success `job` is updated in place;
    /// on error neither the row nor the handle changes.
    pub fn update_status(
        &self,
        job: &mut Job,
        new_status: JobStatus,
        new_filename: Option<&str>,
        reason: &str,
        level: HistoryLevel,
    ) -> Result<(), StoreError> {
        if !job.status.can_transition_to(new_status) {
            return Err(StoreError::IllegalTransition {
                job_id: job.id,
                from: job.status,
                to: new_status,
            });
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = current_timestamp_ms();
        let changed = tx.execute(
            "UPDATE videos SET status = ?1, filename = COALESCE(?2, filename), updated_at = MAX(updated_at, ?3)
             WHERE id = ?4 AND status = ?5",
            params![
                new_status.as_str(),
                new_filename,
                now,
                job.id,
                job.status.as_str()
            ],
        )?;

        if changed == 0 {
            let actual: Option<String> = tx
                .query_row(
                    "SELECT status FROM videos WHERE id = ?1",
                    params![job.id],
                    |row| row.get(0),
                )
                .optional()?;
            return match actual {
                None => Err(StoreError::NotFound(job.id)),
                Some(actual) => Err(StoreError::StaleStatus {
                    job_id: job.id,
                    expected: job.status,
                    actual: parse_status(&actual)?,
                }),
            };
        }

        insert_history_tx(&tx, job.id, reason, level)?;
        let updated_at: i64 = tx.query_row(
            "SELECT updated_at FROM videos WHERE id = ?1",
            params![job.id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        debug!(job_id = job.id, from = %job.status, to = %new_status, "status updated");
        job.status = new_status;
        job.updated_at = updated_at;
        if let Some(name) = new_filename {
            job.filename = Some(name.to_string());
        }
        Ok(())
    }

    /// Append an informational history entry that is not a transition.
    pub fn append_history(
        &self,
        job: &Job,
        message: &str,
        level: HistoryLevel,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert_history_tx(&tx, job.id, message, level)?;
        tx.commit()?;
        Ok(())
    }

    /// Jobs in `Ripped` or `CompressFailed`, oldest first.
    pub fn list_jobs_ready_for_compression(&self) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos WHERE status IN (?1, ?2) ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                JobStatus::Ripped.as_str(),
                JobStatus::CompressFailed.as_str()
            ],
            job_from_row,
        )?;
        collect_jobs(rows)
    }

    /// Every job, oldest first.
    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM videos ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map([], job_from_row)?;
        collect_jobs(rows)
    }

    pub fn get_job(&self, id: i64) -> Result<Job, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM videos WHERE id = ?1", JOB_COLUMNS),
                params![id],
                job_from_row,
            )
            .optional()?;
        match raw {
            Some(raw) => raw.into_job(),
            None => Err(StoreError::NotFound(id)),
        }
    }

    /// History of a job in the order it was written.
    pub fn history(&self, job_id: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, video_id, message, level, timestamp FROM history WHERE video_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, job_id, message, level, timestamp) = row?;
            entries.push(HistoryEntry {
                id,
                job_id,
                message,
                level: level.parse().map_err(StoreError::Corrupt)?,
                timestamp,
            });
        }
        Ok(entries)
    }

    /// Move jobs a crashed run left in progress to their failure status.
    ///
    /// `Ripping` becomes `RipFailed`, `Compressing` becomes `CompressFailed`
    /// (which keeps it in the compression queue). Returns the recovered jobs.
    pub fn recover_interrupted(&self) -> Result<Vec<Job>, StoreError> {
        let stuck: Vec<Job> = self
            .list_jobs()?
            .into_iter()
            .filter(|job| job.status.is_in_progress())
            .collect();

        let mut recovered = Vec::with_capacity(stuck.len());
        for mut job in stuck {
            let (next, what) = match job.status {
                JobStatus::Ripping => (JobStatus::RipFailed, "rip"),
                _ => (JobStatus::CompressFailed, "compression"),
            };
            let reason = format!("Previous run was interrupted during {}", what);
            match self.update_status(&mut job, next, None, &reason, HistoryLevel::Warning) {
                Ok(()) => {
                    info!(job_id = job.id, status = %job.status, "recovered interrupted job");
                    recovered.push(job);
                }
                Err(StoreError::StaleStatus { .. }) => {
                    warn!(job_id = job.id, "job changed while recovering, leaving it alone");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(recovered)
    }
}

/// Writes one history row, never earlier than the job's previous entry.
fn insert_history_tx(
    tx: &rusqlite::Transaction<'_>,
    job_id: i64,
    message: &str,
    level: HistoryLevel,
) -> Result<(), StoreError> {
    let last: Option<i64> = tx.query_row(
        "SELECT MAX(timestamp) FROM history WHERE video_id = ?1",
        params![job_id],
        |row| row.get(0),
    )?;
    let timestamp = last.map_or(current_timestamp_ms(), |prev| {
        prev.max(current_timestamp_ms())
    });
    tx.execute(
        "INSERT INTO history (video_id, message, level, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![job_id, message, level.as_str(), timestamp],
    )?;
    Ok(())
}

/// Row as stored, before enum parsing.
struct RawJob {
    id: i64,
    disc_title: String,
    path: String,
    disc_type: String,
    title_index: u32,
    filename: Option<String>,
    post_process: bool,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl RawJob {
    fn into_job(self) -> Result<Job, StoreError> {
        Ok(Job {
            id: self.id,
            disc_title: self.disc_title,
            disc_path: PathBuf::from(self.path),
            disc_type: self
                .disc_type
                .parse()
                .map_err(|e: crate::classify::InvalidDiscType| StoreError::Corrupt(e.to_string()))?,
            title_index: self.title_index,
            filename: self.filename,
            post_process: self.post_process,
            status: parse_status(&self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        disc_title: row.get(1)?,
        path: row.get(2)?,
        disc_type: row.get(3)?,
        title_index: row.get(4)?,
        filename: row.get(5)?,
        post_process: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn collect_jobs(
    rows: impl Iterator<Item = rusqlite::Result<RawJob>>,
) -> Result<Vec<Job>, StoreError> {
    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row?.into_job()?);
    }
    Ok(jobs)
}

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    s.parse().map_err(StoreError::Corrupt)
}

fn path_to_db(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn store() -> JobStore {
        JobStore::open_in_memory().expect("in-memory store")
    }

    fn insert(store: &JobStore, title: &str, index: u32) -> Job {
        store
            .insert_job(
                title,
                &PathBuf::from(format!("/srv/rips/{}", title)),
                DiscType::Movie,
                index,
                false,
            )
            .expect("insert")
    }

    fn advance(store: &JobStore, job: &mut Job, path: &[JobStatus]) {
        for status in path {
            store
                .update_status(job, *status, None, "step", HistoryLevel::Info)
                .expect("legal step");
        }
    }

    #[test]
    fn test_insert_creates_job_and_history() {
        let store = store();
        let job = insert(&store, "Heat", 0);

        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.disc_path, PathBuf::from("/srv/rips/Heat"));
        let history = store.history(job.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "Video added to database");
        assert_eq!(store.get_job(job.id).unwrap(), job);
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let store = store();
        let job = insert(&store, "Heat", 0);

        let dup = store.insert_job("Heat", &job.disc_path, DiscType::Movie, 0, false);
        assert!(matches!(dup, Err(StoreError::Duplicate { title_index: 0, .. })));
        assert_eq!(store.list_jobs().unwrap().len(), 1);

        // Another title of the same disc is a different output
        insert(&store, "Heat", 1);
        assert_eq!(store.list_jobs().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_rip_does_not_block_new_job() {
        let store = store();
        let mut job = insert(&store, "Heat", 0);
        advance(&store, &mut job, &[JobStatus::Ripping, JobStatus::RipFailed]);

        let again = store.insert_job("Heat", &job.disc_path, DiscType::Movie, 0, false);
        assert!(again.is_ok());
    }

    #[test]
    fn test_illegal_transition_rejected_and_not_applied() {
        let store = store();
        let mut job = insert(&store, "Heat", 0);
        advance(
            &store,
            &mut job,
            &[
                JobStatus::Ripping,
                JobStatus::Ripped,
                JobStatus::Compressing,
                JobStatus::Compressed,
            ],
        );

        let err = store
            .update_status(&mut job, JobStatus::Ripping, None, "again", HistoryLevel::Info)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: JobStatus::Compressed,
                to: JobStatus::Ripping,
                ..
            }
        ));
        assert_eq!(job.status, JobStatus::Compressed);
        assert_eq!(store.get_job(job.id).unwrap().status, JobStatus::Compressed);
        // Insert + four transitions, nothing for the rejected one
        assert_eq!(store.history(job.id).unwrap().len(), 5);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let store = store();
        let mut first = insert(&store, "Heat", 0);
        let mut second = first.clone();

        advance(&store, &mut first, &[JobStatus::Ripping]);
        let err = store
            .update_status(&mut second, JobStatus::Ripping, None, "race", HistoryLevel::Info)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleStatus {
                expected: JobStatus::Created,
                actual: JobStatus::Ripping,
                ..
            }
        ));
    }

    #[test]
    fn test_update_status_records_filename() {
        let store = store();
        let mut job = insert(&store, "Heat", 3);
        store
            .update_status(
                &mut job,
                JobStatus::Ripping,
                Some("Heat_t03.mkv"),
                "Video submitted to MakeMKV",
                HistoryLevel::Info,
            )
            .unwrap();

        assert_eq!(job.filename.as_deref(), Some("Heat_t03.mkv"));
        let stored = store.get_job(job.id).unwrap();
        assert_eq!(stored.filename.as_deref(), Some("Heat_t03.mkv"));

        // No filename keeps the recorded one
        advance(&store, &mut job, &[JobStatus::Ripped]);
        assert_eq!(
            store.get_job(job.id).unwrap().filename.as_deref(),
            Some("Heat_t03.mkv")
        );
    }

    #[test]
    fn test_ready_queue_is_fifo_and_filtered() {
        let store = store();
        let mut a = insert(&store, "A", 0);
        let mut b = insert(&store, "B", 0);
        let mut c = insert(&store, "C", 0);
        let mut d = insert(&store, "D", 0);

        advance(&store, &mut c, &[JobStatus::Ripping, JobStatus::Ripped]);
        advance(
            &store,
            &mut a,
            &[
                JobStatus::Ripping,
                JobStatus::Ripped,
                JobStatus::Compressing,
                JobStatus::CompressFailed,
            ],
        );
        advance(&store, &mut b, &[JobStatus::Ripping, JobStatus::RipFailed]);
        advance(
            &store,
            &mut d,
            &[
                JobStatus::Ripping,
                JobStatus::Ripped,
                JobStatus::SkippedCompression,
            ],
        );

        let ready: Vec<i64> = store
            .list_jobs_ready_for_compression()
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ready, vec![a.id, c.id]);
    }

    #[test]
    fn test_recover_interrupted() {
        let store = store();
        let mut ripping = insert(&store, "A", 0);
        let mut compressing = insert(&store, "B", 0);
        let untouched = insert(&store, "C", 0);
        advance(&store, &mut ripping, &[JobStatus::Ripping]);
        advance(
            &store,
            &mut compressing,
            &[JobStatus::Ripping, JobStatus::Ripped, JobStatus::Compressing],
        );

        let recovered = store.recover_interrupted().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(store.get_job(ripping.id).unwrap().status, JobStatus::RipFailed);
        assert_eq!(
            store.get_job(compressing.id).unwrap().status,
            JobStatus::CompressFailed
        );
        assert_eq!(store.get_job(untouched.id).unwrap().status, JobStatus::Created);

        // Second call finds nothing to do
        assert!(store.recover_interrupted().unwrap().is_empty());
    }

    #[test]
    fn test_history_cannot_be_edited() {
        let store = store();
        let job = insert(&store, "Heat", 0);
        let conn = store.lock().unwrap();
        assert!(conn
            .execute("UPDATE history SET message = 'x' WHERE video_id = ?1", params![job.id])
            .is_err());
        assert!(conn
            .execute("DELETE FROM history WHERE video_id = ?1", params![job.id])
            .is_err());
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/jobs.sqlite");

        let job_id = {
            let store = JobStore::open(&db_path).unwrap();
            let mut job = insert(&store, "Heat", 0);
            advance(&store, &mut job, &[JobStatus::Ripping, JobStatus::Ripped]);
            job.id
        };

        let reopened = JobStore::open(&db_path).unwrap();
        assert_eq!(reopened.get_job(job_id).unwrap().status, JobStatus::Ripped);
        assert_eq!(reopened.history(job_id).unwrap().len(), 3);

        let read_only = JobStore::open_read_only(&db_path).unwrap();
        assert_eq!(read_only.list_jobs().unwrap().len(), 1);
    }

    #[test]
    fn test_read_only_open_fails_for_missing_db() {
        let temp_dir = TempDir::new().unwrap();
        assert!(JobStore::open_read_only(temp_dir.path().join("absent.sqlite")).is_err());
    }

    #[test]
    fn test_uncreatable_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = JobStore::open(blocker.join("db").join("autorip.sqlite"));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        proptest::sample::select(JobStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        // Random walks: only listed transitions are ever persisted, every
        // persisted one adds exactly one history entry, and history
        // timestamps never go backwards.
        #[test]
        fn prop_random_walk_respects_table(steps in prop::collection::vec(status_strategy(), 1..20)) {
            let store = store();
            let mut job = insert(&store, "Walk", 0);
            let mut expected_history = 1;

            for next in steps {
                let from = job.status;
                let result = store.update_status(&mut job, next, None, "walk", HistoryLevel::Debug);
                if from.can_transition_to(next) {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(job.status, next);
                    expected_history += 1;
                } else {
                    let is_illegal = matches!(result, Err(StoreError::IllegalTransition { .. }));
                    prop_assert!(is_illegal);
                    prop_assert_eq!(job.status, from);
                }
                prop_assert_eq!(store.get_job(job.id).unwrap().status, job.status);
            }

            let history = store.history(job.id).unwrap();
            prop_assert_eq!(history.len(), expected_history);
            prop_assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp && w[0].id < w[1].id));
        }
    }
}
