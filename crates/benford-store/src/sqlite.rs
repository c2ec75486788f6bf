use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use benford_core::job::{AnalysisKind, Job, JobId, JobStatus, NewJob, User, UserId};
use benford_core::store::{JobStore, StoreError};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        userid   INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        pwdhash  TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS jobs (
        jobid            INTEGER PRIMARY KEY AUTOINCREMENT,
        userid           INTEGER NOT NULL REFERENCES users(userid),
        status           TEXT NOT NULL,
        jobtype          TEXT NOT NULL,
        originaldatafile TEXT NOT NULL,
        datafilekey      TEXT NOT NULL UNIQUE,
        resultsfilekey   TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_userid ON jobs(userid);
";

const JOB_COLUMNS: &str =
    "jobid, userid, status, jobtype, originaldatafile, datafilekey, resultsfilekey";

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::backend(e)
}

/// Open a SQLite connection with WAL mode and standard pragmas.
fn open_sqlite(path: &Path) -> Result<Connection, rusqlite::Error> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(conn)
}

/// Job table backed by SQLite.
///
/// One connection behind a [`Mutex`]; every trait method is a single
/// statement, so each write is atomic and readers never see a partial row.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

/// A `jobs` row before its job type is validated.
struct RawJob {
    id: i64,
    user_id: i64,
    status: String,
    kind: String,
    original_file: String,
    data_key: String,
    results_key: String,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            kind: row.get(3)?,
            original_file: row.get(4)?,
            data_key: row.get(5)?,
            results_key: row.get(6)?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let kind = self.kind.parse::<AnalysisKind>().map_err(|_| {
            StoreError::Corrupt(format!("job {} has job type '{}'", self.id, self.kind))
        })?;
        Ok(Job {
            id: JobId(self.id),
            user_id: UserId(self.user_id),
            status: self.status,
            kind,
            original_file: self.original_file,
            data_key: self.data_key,
            results_key: self.results_key,
        })
    }
}

impl SqliteJobStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = open_sqlite(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder cannot leave a statement half-applied.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a user, returning its id. Existing usernames are left alone
    /// and their id returned.
    pub fn add_user(&self, username: &str, pwdhash: &str) -> Result<UserId, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO users (username, pwdhash) VALUES (?1, ?2)",
            params![username, pwdhash],
        )
        .map_err(db_err)?;
        let id: i64 = conn
            .query_row(
                "SELECT userid FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(UserId(id))
    }

    fn query_jobs(&self, sql: &str, param: Option<&dyn rusqlite::ToSql>) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(sql).map_err(db_err)?;
        let params: Vec<&dyn rusqlite::ToSql> = param.into_iter().collect();
        let raw = stmt
            .query_map(params.as_slice(), RawJob::from_row)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        raw.into_iter().map(RawJob::into_job).collect()
    }

    fn update_column(&self, id: JobId, column: &str, value: &str) -> Result<(), StoreError> {
        let sql = format!("UPDATE jobs SET {} = ?1 WHERE jobid = ?2", column);
        let changed = self
            .conn()
            .execute(&sql, params![value, id.0])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(StoreError::NoSuchJob(id));
        }
        Ok(())
    }
}

impl JobStore for SqliteJobStore {
    fn users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached("SELECT userid, username, pwdhash FROM users ORDER BY userid")
            .map_err(db_err)?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: UserId(row.get(0)?),
                    username: row.get(1)?,
                    pwdhash: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(users)
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.conn()
            .query_row(
                "SELECT userid, username, pwdhash FROM users WHERE userid = ?1",
                params![id.0],
                |row| {
                    Ok(User {
                        id: UserId(row.get(0)?),
                        username: row.get(1)?,
                        pwdhash: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.query_jobs(
            &format!("SELECT {} FROM jobs ORDER BY jobid", JOB_COLUMNS),
            None,
        )
    }

    fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE jobid = ?1", JOB_COLUMNS);
        Ok(self.query_jobs(&sql, Some(&id.0))?.into_iter().next())
    }

    fn job_by_data_key(&self, data_key: &str) -> Result<Option<Job>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE datafilekey = ?1", JOB_COLUMNS);
        Ok(self.query_jobs(&sql, Some(&data_key))?.into_iter().next())
    }

    fn create_job(&self, job: &NewJob) -> Result<JobId, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (userid, status, jobtype, originaldatafile, datafilekey, resultsfilekey)
             VALUES (?1, ?2, ?3, ?4, ?5, '')",
            params![
                job.user_id.0,
                JobStatus::Uploaded.to_string(),
                job.kind.as_str(),
                job.original_file,
                job.data_key,
            ],
        )
        .map_err(db_err)?;
        let id = JobId(conn.last_insert_rowid());
        tracing::debug!(job_id = %id, data_key = %job.data_key, "job row created");
        Ok(id)
    }

    fn update_status(&self, id: JobId, status: &str) -> Result<(), StoreError> {
        self.update_column(id, "status", status)
    }

    fn set_results_key(&self, id: JobId, results_key: &str) -> Result<(), StoreError> {
        self.update_column(id, "resultsfilekey", results_key)
    }

    fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM jobs WHERE jobid = ?1", params![id.0])
            .map_err(db_err)?;
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let removed = self.conn().execute("DELETE FROM jobs", []).map_err(db_err)?;
        tracing::info!(removed, "job table cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_user() -> (SqliteJobStore, UserId) {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let user = store.add_user("p_sarkar", "abc123").unwrap();
        (store, user)
    }

    fn new_job(user: UserId, key: &str) -> NewJob {
        NewJob {
            user_id: user,
            kind: AnalysisKind::Benford,
            original_file: "report.pdf".into(),
            data_key: key.into(),
        }
    }

    #[test]
    fn add_user_is_idempotent() {
        let (store, user) = store_with_user();
        assert_eq!(store.add_user("p_sarkar", "other").unwrap(), user);
        let users = store.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].pwdhash, "abc123");
        assert_eq!(store.user(user).unwrap().unwrap().username, "p_sarkar");
        assert!(store.user(UserId(999)).unwrap().is_none());
    }

    #[test]
    fn created_job_starts_uploaded() {
        let (store, user) = store_with_user();
        let id = store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        let job = store.job(id).unwrap().unwrap();
        assert_eq!(job.status, "uploaded");
        assert_eq!(job.kind, AnalysisKind::Benford);
        assert!(job.results_key.is_empty());
        assert_eq!(store.job_by_data_key("k/a.pdf").unwrap().unwrap().id, id);
        assert!(store.job_by_data_key("k/b.pdf").unwrap().is_none());
    }

    #[test]
    fn duplicate_data_key_is_rejected() {
        let (store, user) = store_with_user();
        store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        assert!(matches!(
            store.create_job(&new_job(user, "k/a.pdf")),
            Err(StoreError::Backend(_))
        ));
    }

    #[test]
    fn unknown_user_violates_foreign_key() {
        let (store, _) = store_with_user();
        assert!(store.create_job(&new_job(UserId(424242), "k/a.pdf")).is_err());
    }

    #[test]
    fn updates_target_one_row() {
        let (store, user) = store_with_user();
        let a = store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        let b = store.create_job(&new_job(user, "k/b.pdf")).unwrap();
        store.update_status(a, "processing - starting").unwrap();
        store.set_results_key(a, "k/a.txt").unwrap();

        assert_eq!(store.job(a).unwrap().unwrap().status, "processing - starting");
        assert_eq!(store.job(a).unwrap().unwrap().results_key, "k/a.txt");
        assert_eq!(store.job(b).unwrap().unwrap().status, "uploaded");
        assert!(matches!(
            store.update_status(JobId(999), "error"),
            Err(StoreError::NoSuchJob(JobId(999)))
        ));
    }

    #[test]
    fn unknown_job_type_is_reported_as_corrupt() {
        let (store, user) = store_with_user();
        let id = store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        store
            .conn()
            .execute("UPDATE jobs SET jobtype = 'ocr' WHERE jobid = ?1", params![id.0])
            .unwrap();
        assert!(matches!(store.job(id), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn delete_job_removes_only_that_row() {
        let (store, user) = store_with_user();
        let a = store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        let b = store.create_job(&new_job(user, "k/b.pdf")).unwrap();
        store.delete_job(a).unwrap();
        store.delete_job(a).unwrap();
        assert!(store.job(a).unwrap().is_none());
        assert_eq!(store.jobs().unwrap().len(), 1);
        assert_eq!(store.job(b).unwrap().unwrap().data_key, "k/b.pdf");
    }

    #[test]
    fn reset_clears_jobs_but_keeps_users() {
        let (store, user) = store_with_user();
        store.create_job(&new_job(user, "k/a.pdf")).unwrap();
        store.reset().unwrap();
        assert!(store.jobs().unwrap().is_empty());
        assert_eq!(store.users().unwrap().len(), 1);
    }
}
