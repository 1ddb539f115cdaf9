//! SQLite-backed statistics store.
//!
//! Rows are keyed by `(statistic_id, start)` with `start` stored as Unix
//! seconds. Imports upsert inside one transaction, so a failed import
//! leaves the table as it was.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ovolink_core::{CoreError, StatisticMetadata, StatisticPoint, StatisticsStore, STATISTIC_SOURCE};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS statistics_meta (
    statistic_id TEXT PRIMARY KEY,
    source       TEXT NOT NULL,
    name         TEXT NOT NULL,
    unit         TEXT NOT NULL,
    has_sum      INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS statistics (
    statistic_id TEXT NOT NULL,
    start_ts     INTEGER NOT NULL,
    state        REAL NOT NULL,
    sum          REAL NOT NULL,
    PRIMARY KEY (statistic_id, start_ts)
);
";

/// Statistics store over one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStatisticsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStatisticsStore {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "Opening statistics database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Task("statistics connection poisoned".to_string()))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Every point of a series, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn points(&self, statistic_id: &str) -> Result<Vec<StatisticPoint>, StoreError> {
        let statistic_id = statistic_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT start_ts, state, sum FROM statistics
                 WHERE statistic_id = ?1
                 ORDER BY start_ts ASC",
            )?;
            let points = stmt
                .query_map([&statistic_id], |row| {
                    let ts: i64 = row.get(0)?;
                    Ok(StatisticPoint {
                        start: Utc.timestamp_opt(ts, 0).single().unwrap_or_default(),
                        state: row.get(1)?,
                        sum: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(points)
        })
        .await
    }

    /// Ids of every series with metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn statistic_ids(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT statistic_id FROM statistics_meta ORDER BY statistic_id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
    }

    /// Latest sum in `[window_start, window_end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn latest_sum_in(
        &self,
        statistic_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        let statistic_id = statistic_id.to_string();
        let (start, end) = (window_start.timestamp(), window_end.timestamp());
        self.with_conn(move |conn| {
            let sum = conn
                .query_row(
                    "SELECT sum FROM statistics
                     WHERE statistic_id = ?1 AND start_ts >= ?2 AND start_ts < ?3
                     ORDER BY start_ts DESC
                     LIMIT 1",
                    params![statistic_id, start, end],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(sum)
        })
        .await
    }

    /// Upserts metadata and points in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; nothing is committed then.
    pub async fn upsert(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<usize, StoreError> {
        let metadata = metadata.clone();
        let points = points.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO statistics_meta (statistic_id, source, name, unit, has_sum)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(statistic_id) DO UPDATE SET
                    name = excluded.name, unit = excluded.unit, has_sum = excluded.has_sum",
                params![
                    metadata.statistic_id,
                    STATISTIC_SOURCE,
                    metadata.name,
                    metadata.unit,
                    metadata.has_sum
                ],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO statistics (statistic_id, start_ts, state, sum)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(statistic_id, start_ts) DO UPDATE SET
                        state = excluded.state, sum = excluded.sum",
                )?;
                for point in &points {
                    stmt.execute(params![
                        metadata.statistic_id,
                        point.start.timestamp(),
                        point.state,
                        point.sum
                    ])?;
                }
            }
            tx.commit()?;
            Ok(points.len())
        })
        .await
    }
}

#[async_trait]
impl StatisticsStore for SqliteStatisticsStore {
    #[instrument(skip(self))]
    async fn prior_sum(
        &self,
        statistic_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Option<f64>, CoreError> {
        Ok(self.latest_sum_in(statistic_id, window_start, window_end).await?)
    }

    #[instrument(skip(self, points), fields(statistic_id = %metadata.statistic_id, count = points.len()))]
    async fn import(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), CoreError> {
        let written = self.upsert(metadata, points).await?;
        debug!(written, "Statistics imported");
        Ok(())
    }
}
