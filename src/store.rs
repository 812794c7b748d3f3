// Run store
// SQLite-based window of past screening runs with optional JSON backup
//
// One row per run date holding the serialized run. Rows that fail to parse
// come back as empty runs so the consistency window never breaks.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::screener::ScreeningRun;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to serialize run: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Windowed store of past runs
pub trait RunStore {
    /// Up to `n` most recent runs, oldest first
    fn get_recent_runs(&self, n: usize) -> Result<Vec<ScreeningRun>, StoreError>;

    /// Up to `n` most recent runs dated strictly before `date`, oldest first
    fn get_runs_before(&self, date: NaiveDate, n: usize) -> Result<Vec<ScreeningRun>, StoreError>;

    /// Persist a run; a run with the same date replaces the stored one
    fn append_run(&self, run: &ScreeningRun) -> Result<(), StoreError>;
}

// =============================================================================
// SQLite
// =============================================================================

pub struct SqliteRunStore {
    conn: Mutex<Connection>,
    json_backup_path: Option<PathBuf>,
}

impl SqliteRunStore {
    pub fn open<P: AsRef<Path>>(db_path: P, json_backup_path: Option<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        // Create parent directories
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir(parent)?;
        }
        if let Some(parent) = json_backup_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
        {
            create_dir(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = SqliteRunStore {
            conn: Mutex::new(conn),
            json_backup_path,
        };
        store.create_tables()?;
        info!("Run store opened at {}", db_path.display());

        Ok(store)
    }

    /// Store without a file, for tests and dry runs
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = SqliteRunStore {
            conn: Mutex::new(Connection::open_in_memory()?),
            json_backup_path: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                run_date TEXT PRIMARY KEY,
                config_hash TEXT,
                candidate_count INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        debug!("Run store schema created/verified");
        Ok(())
    }

    pub fn run_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Newest `n` rows (optionally before `before`), returned oldest first
    fn query_runs(&self, before: Option<NaiveDate>, n: usize) -> Result<Vec<ScreeningRun>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let read_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String)> {
            Ok((row.get(0)?, row.get(1)?))
        };

        let rows: Vec<(String, String)> = match before {
            Some(date) => {
                let mut stmt = conn.prepare(
                    "SELECT run_date, payload FROM runs WHERE run_date < ?1
                     ORDER BY run_date DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![date.format("%Y-%m-%d").to_string(), limit], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT run_date, payload FROM runs ORDER BY run_date DESC LIMIT ?1")?;
                let rows = stmt
                    .query_map(params![limit], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        let mut runs: Vec<ScreeningRun> = rows
            .iter()
            .map(|(date, payload)| decode_run(date, payload))
            .collect();
        runs.reverse();

        debug!("Loaded {} stored runs (requested {})", runs.len(), n);
        Ok(runs)
    }

    /// Write every stored run to the backup file, if one is configured
    pub fn export_json(&self) -> Result<(), StoreError> {
        let Some(path) = &self.json_backup_path else {
            return Ok(());
        };
        let runs = self.get_recent_runs(usize::MAX)?;

        let state = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "runs": runs,
        });

        std::fs::write(path, serde_json::to_string_pretty(&state)?).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Runs exported to: {}", path.display());
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Decode a stored row; anything unreadable becomes an empty run
fn decode_run(run_date: &str, payload: &str) -> ScreeningRun {
    match serde_json::from_str::<ScreeningRun>(payload) {
        Ok(run) => run,
        Err(e) => {
            let date = NaiveDate::parse_from_str(run_date, "%Y-%m-%d").unwrap_or_default();
            warn!("Run {} is unreadable ({}), treating it as empty", run_date, e);
            ScreeningRun::empty(date)
        }
    }
}

impl RunStore for SqliteRunStore {
    fn get_recent_runs(&self, n: usize) -> Result<Vec<ScreeningRun>, StoreError> {
        self.query_runs(None, n)
    }

    fn get_runs_before(&self, date: NaiveDate, n: usize) -> Result<Vec<ScreeningRun>, StoreError> {
        self.query_runs(Some(date), n)
    }

    fn append_run(&self, run: &ScreeningRun) -> Result<(), StoreError> {
        let payload = serde_json::to_string(run)?;
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT OR REPLACE INTO runs (run_date, config_hash, candidate_count, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.run_date.format("%Y-%m-%d").to_string(),
                    run.config_hash,
                    run.candidates.len() as i64,
                    payload,
                ],
            )?;
        }

        info!(
            "Run saved: {} with {} candidates",
            run.run_date,
            run.candidates.len()
        );

        self.export_json()
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Run store backed by a vector, ordered by run date
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<Vec<ScreeningRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(runs: Vec<ScreeningRun>) -> Self {
        let store = Self::default();
        if let Ok(mut stored) = store.runs.lock() {
            *stored = runs;
            stored.sort_by_key(|r| r.run_date);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunStore for MemoryRunStore {
    fn get_recent_runs(&self, n: usize) -> Result<Vec<ScreeningRun>, StoreError> {
        let runs = self.runs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(runs[runs.len().saturating_sub(n)..].to_vec())
    }

    fn get_runs_before(&self, date: NaiveDate, n: usize) -> Result<Vec<ScreeningRun>, StoreError> {
        let runs = self.runs.lock().map_err(|_| StoreError::Poisoned)?;
        let earlier = runs.partition_point(|r| r.run_date < date);
        Ok(runs[earlier.saturating_sub(n)..earlier].to_vec())
    }

    fn append_run(&self, run: &ScreeningRun) -> Result<(), StoreError> {
        let mut runs = self.runs.lock().map_err(|_| StoreError::Poisoned)?;
        runs.retain(|r| r.run_date != run.run_date);
        runs.push(run.clone());
        runs.sort_by_key(|r| r.run_date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screener::tests_support::candidate;
    use chrono::Duration;

    fn run(day: i64, symbols: &[&str]) -> ScreeningRun {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() + Duration::days(day);
        let mut run = ScreeningRun::empty(date);
        run.config_hash = "abc".to_string();
        run.candidates = symbols.iter().map(|s| candidate(s, 120.0)).collect();
        run
    }

    #[test]
    fn test_sqlite_returns_recent_runs_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRunStore::open(dir.path().join("state/runs.db"), None).unwrap();

        for day in [2, 0, 1, 3] {
            store.append_run(&run(day, &["AAA"])).unwrap();
        }
        assert_eq!(store.run_count().unwrap(), 4);

        let recent = store.get_recent_runs(3).unwrap();
        let days: Vec<i64> = recent
            .iter()
            .map(|r| (r.run_date - NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).num_days())
            .collect();
        assert_eq!(days, vec![1, 2, 3]);
        assert_eq!(recent[2], run(3, &["AAA"]));
        assert!(store.get_recent_runs(0).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_same_date_replaces() {
        let store = SqliteRunStore::in_memory().unwrap();
        store.append_run(&run(0, &["AAA"])).unwrap();
        store.append_run(&run(0, &["BBB", "CCC"])).unwrap();

        let runs = store.get_recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].len(), 2);
    }

    #[test]
    fn test_malformed_row_degrades_to_empty_run() {
        let store = SqliteRunStore::in_memory().unwrap();
        store.append_run(&run(0, &["AAA"])).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO runs (run_date, config_hash, candidate_count, payload)
                 VALUES ('2024-05-02', '', 3, '{not json')",
                [],
            )
            .unwrap();

        let runs = store.get_recent_runs(7).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[1].is_empty());
        assert_eq!(runs[1].run_date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(runs[0].len(), 1);
    }

    #[test]
    fn test_json_backup_written() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup/runs.json");
        let store = SqliteRunStore::open(dir.path().join("runs.db"), Some(backup.clone())).unwrap();
        store.append_run(&run(0, &["AAA"])).unwrap();

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&backup).unwrap()).unwrap();
        assert_eq!(exported["runs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryRunStore::with_runs(vec![run(1, &["B"]), run(0, &["A"])]);
        store.append_run(&run(2, &["C"])).unwrap();
        store.append_run(&run(1, &["BB"])).unwrap();

        assert_eq!(store.len(), 3);
        let recent = store.get_recent_runs(2).unwrap();
        assert_eq!(recent[0].candidates[0].symbol.as_str(), "BB");
        assert_eq!(recent[1].candidates[0].symbol.as_str(), "C");
    }

    #[test]
    fn test_runs_before_excludes_same_and_later_dates() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteRunStore::open(dir.path().join("runs.db"), None).unwrap();
        let memory = MemoryRunStore::new();
        for day in 0..6 {
            sqlite.append_run(&run(day, &["AAA"])).unwrap();
            memory.append_run(&run(day, &["AAA"])).unwrap();
        }
        let cutoff = run(3, &[]).run_date;

        let stores: [&dyn RunStore; 2] = [&sqlite, &memory];
        for store in stores {
            let before = store.get_runs_before(cutoff, 2).unwrap();
            let dates: Vec<NaiveDate> = before.iter().map(|r| r.run_date).collect();
            assert_eq!(dates, vec![run(1, &[]).run_date, run(2, &[]).run_date]);

            assert_eq!(store.get_runs_before(cutoff, 10).unwrap().len(), 3);
            assert!(store.get_runs_before(run(0, &[]).run_date, 5).unwrap().is_empty());
            assert!(store.get_runs_before(cutoff, 0).unwrap().is_empty());
        }
    }
}
