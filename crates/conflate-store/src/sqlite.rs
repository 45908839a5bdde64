use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conflate_types::{
    FeatureProperties, GroupKey, KnownRecord, Point, StagedGroup, StagedModification,
};
use rusqlite::{params, Connection};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{PersistentStore, StagingStore, StoreProvider};

const LATEST_SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS persistent (
  id INTEGER PRIMARY KEY,
  version INTEGER NOT NULL,
  number TEXT NOT NULL,
  props TEXT NOT NULL,
  lon REAL NOT NULL,
  lat REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS modified (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id INTEGER NOT NULL,
  version INTEGER NOT NULL,
  props TEXT NOT NULL,
  lon REAL NOT NULL,
  lat REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_persistent_number_geom ON persistent(number, lon, lat);
CREATE INDEX IF NOT EXISTS idx_modified_group ON modified(id, version, lon, lat, seq);
";

const CANDIDATES_SQL: &str = r"
SELECT id, version, props, lon, lat FROM persistent
WHERE number = ?1
  AND lon BETWEEN ?2 - ?5 AND ?2 + ?5
  AND lat BETWEEN ?3 - ?4 AND ?3 + ?4
  AND ((lon - ?2) / ?5) * ((lon - ?2) / ?5) + ((lat - ?3) / ?4) * ((lat - ?3) / ?4) <= 1.0
ORDER BY id
";

const FIRST_KEYS_SQL: &str = r"
SELECT DISTINCT id, version, lon, lat FROM modified
ORDER BY id, version, lon, lat
LIMIT ?1
";

const NEXT_KEYS_SQL: &str = r"
SELECT DISTINCT id, version, lon, lat FROM modified
WHERE (id, version, lon, lat) > (?1, ?2, ?3, ?4)
ORDER BY id, version, lon, lat
LIMIT ?5
";

const GROUP_MEMBERS_SQL: &str = r"
SELECT id, version, lon, lat, props FROM modified
WHERE (id, version, lon, lat) >= (?1, ?2, ?3, ?4)
  AND (id, version, lon, lat) <= (?5, ?6, ?7, ?8)
ORDER BY id, version, lon, lat, seq
";

fn open_connection(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    // WAL lets workers insert while others read the persistent table.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)?;
    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    if current < 1 {
        conn.execute_batch(MIGRATION_001_SQL)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (1)", [])?;
        debug!(version = 1, "applied schema migration");
    }
    if current > LATEST_SCHEMA_VERSION {
        warn!(current, latest = LATEST_SCHEMA_VERSION, "database schema is newer than this build");
    }
    Ok(())
}

/// A bounded pool of SQLite connections for one store allocation.
///
/// Connections open lazily and are reused. Each operation runs on the
/// blocking thread pool while holding one of `max_connections` permits.
struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
}

impl ConnectionPool {
    fn new(path: PathBuf, max_connections: usize) -> Self {
        Self {
            path,
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(max_connections.max(1)),
        }
    }

    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::PoolClosed)?;

        let pooled = self.idle.lock().expect("lock poisoned").pop();
        let path = self.path.clone();

        // Connections also open on the blocking pool.
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let mut conn = match pooled {
                Some(conn) => conn,
                None => match open_connection(&path) {
                    Ok(conn) => conn,
                    Err(e) => return (None, Err(e)),
                },
            };
            let result = op(&mut conn);
            (Some(conn), result)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;

        if let Some(conn) = conn {
            self.idle.lock().expect("lock poisoned").push(conn);
        }
        result
    }
}

fn decode_point(id: i64, lon: f64, lat: f64) -> StoreResult<Point> {
    Point::new(lon, lat).map_err(|e| StoreError::CorruptRow {
        id,
        reason: e.to_string(),
    })
}

fn decode_props(id: i64, props: &str) -> StoreResult<FeatureProperties> {
    serde_json::from_str(props).map_err(|e| StoreError::CorruptRow {
        id,
        reason: e.to_string(),
    })
}

/// Persistent store reading the `persistent` table.
pub struct SqlitePersistentStore {
    pool: ConnectionPool,
}

#[async_trait]
impl PersistentStore for SqlitePersistentStore {
    async fn candidates(
        &self,
        number: &str,
        near: Point,
        within_degrees: f64,
    ) -> StoreResult<Vec<KnownRecord>> {
        let number = number.to_string();
        let lon_window = near.lon_window(within_degrees);
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare_cached(CANDIDATES_SQL)?;
                let rows = stmt.query_map(
                    params![number, near.lon, near.lat, within_degrees, lon_window],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, f64>(4)?,
                        ))
                    },
                )?;

                let mut records = Vec::new();
                for row in rows {
                    let (id, version, props, lon, lat) = row?;
                    records.push(KnownRecord {
                        id,
                        version,
                        properties: decode_props(id, &props)?,
                        geometry: decode_point(id, lon, lat)?,
                    });
                }
                Ok(records)
            })
            .await
    }
}

/// Staging store writing to the `modified` table.
pub struct SqliteStagingStore {
    pool: ConnectionPool,
}

#[async_trait]
impl StagingStore for SqliteStagingStore {
    async fn insert(&self, row: &StagedModification) -> StoreResult<()> {
        let props = serde_json::to_string(&row.properties)?;
        let (id, version, geom) = (row.target_id, row.target_version, row.geometry);
        self.pool
            .run(move |conn| {
                conn.prepare_cached(
                    "INSERT INTO modified (id, version, props, lon, lat) VALUES (?1, ?2, ?3, ?4, ?5)",
                )?
                .execute(params![id, version, props, geom.lon, geom.lat])?;
                Ok(())
            })
            .await
    }

    async fn scan_groups(
        &self,
        after: Option<&GroupKey>,
        limit: usize,
    ) -> StoreResult<Vec<StagedGroup>> {
        let after = after.copied();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.pool
            .run(move |conn| {
                let keys = page_keys(conn, after.as_ref(), limit)?;
                let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
                    return Ok(Vec::new());
                };

                let mut stmt = conn.prepare_cached(GROUP_MEMBERS_SQL)?;
                let rows = stmt.query_map(
                    params![
                        first.id,
                        first.version,
                        first.geometry.lon,
                        first.geometry.lat,
                        last.id,
                        last.version,
                        last.geometry.lon,
                        last.geometry.lat
                    ],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )?;

                let mut groups: Vec<StagedGroup> = Vec::with_capacity(keys.len());
                for row in rows {
                    let (id, version, lon, lat, props) = row?;
                    let key = GroupKey::new(id, version, decode_point(id, lon, lat)?);
                    let props = decode_props(id, &props)?;
                    match groups.last_mut() {
                        Some(group) if group.key == key => group.members.push(props),
                        _ => groups.push(StagedGroup {
                            key,
                            members: vec![props],
                        }),
                    }
                }
                Ok(groups)
            })
            .await
    }

    async fn reset(&self) -> StoreResult<()> {
        self.pool
            .run(|conn| {
                conn.execute("DELETE FROM modified", [])?;
                Ok(())
            })
            .await
    }

    async fn len(&self) -> StoreResult<usize> {
        self.pool
            .run(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM modified", [], |row| row.get(0))?;
                Ok(usize::try_from(count).unwrap_or_default())
            })
            .await
    }
}

fn key_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, f64, f64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn page_keys(conn: &Connection, after: Option<&GroupKey>, limit: i64) -> StoreResult<Vec<GroupKey>> {
    let raw: Vec<(i64, i64, f64, f64)> = match after {
        None => conn
            .prepare_cached(FIRST_KEYS_SQL)?
            .query_map(params![limit], key_columns)?
            .collect::<Result<_, _>>()?,
        Some(key) => conn
            .prepare_cached(NEXT_KEYS_SQL)?
            .query_map(
                params![key.id, key.version, key.geometry.lon, key.geometry.lat, limit],
                key_columns,
            )?
            .collect::<Result<_, _>>()?,
    };

    raw.into_iter()
        .map(|(id, version, lon, lat)| Ok(GroupKey::new(id, version, decode_point(id, lon, lat)?)))
        .collect()
}

/// Outcome of loading a persistent corpus file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

/// SQLite-backed [`StoreProvider`].
///
/// Every call to [`StoreProvider::persistent`] or [`StoreProvider::staging`]
/// creates an independent pool of at most `max_connections` connections to
/// the same database file.
pub struct SqliteProvider {
    path: PathBuf,
    max_connections: usize,
}

impl SqliteProvider {
    /// Open (or create) the database and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>, max_connections: usize) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = open_connection(&path)?;
        migrate(&conn)?;
        info!(path = %path.display(), max_connections, "opened conflation database");
        Ok(Self {
            path,
            max_connections,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load line-delimited known features into the persistent table.
    ///
    /// Runs in a single transaction followed by `ANALYZE`. Malformed lines
    /// are skipped and, when `rejects` is given, written to it as
    /// `{"line","reason","raw"}` objects. Existing ids are replaced.
    pub fn import_persistent<R: BufRead>(
        &self,
        reader: R,
        mut rejects: Option<&mut dyn Write>,
    ) -> StoreResult<ImportSummary> {
        let mut conn = open_connection(&self.path)?;
        let tx = conn.transaction()?;
        let mut summary = ImportSummary::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO persistent (id, version, number, props, lon, lat)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (idx, line) in reader.lines().enumerate() {
                let line = line?;
                let line = line.trim_matches(|c: char| c == '\u{1e}' || c.is_whitespace());
                if line.is_empty() {
                    continue;
                }
                match KnownRecord::from_json(line) {
                    Ok(record) => {
                        let props = serde_json::to_string(&record.properties)?;
                        stmt.execute(params![
                            record.id,
                            record.version,
                            record.properties.number.as_deref().unwrap_or_default(),
                            props,
                            record.geometry.lon,
                            record.geometry.lat
                        ])?;
                        summary.imported += 1;
                    }
                    Err(e) => {
                        summary.rejected += 1;
                        warn!(line = idx + 1, error = %e, "skipping persistent record");
                        if let Some(out) = rejects.as_deref_mut() {
                            let doc = serde_json::json!({
                                "line": idx + 1,
                                "reason": e.to_string(),
                                "raw": line,
                            });
                            writeln!(out, "{doc}")?;
                        }
                    }
                }
            }
        }
        tx.commit()?;
        conn.execute_batch("ANALYZE")?;
        info!(
            imported = summary.imported,
            rejected = summary.rejected,
            "persistent table loaded and optimized"
        );
        Ok(summary)
    }

    /// Number of rows in the persistent table.
    pub fn persistent_count(&self) -> StoreResult<usize> {
        let conn = open_connection(&self.path)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM persistent", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl StoreProvider for SqliteProvider {
    fn persistent(&self) -> StoreResult<Arc<dyn PersistentStore>> {
        Ok(Arc::new(SqlitePersistentStore {
            pool: ConnectionPool::new(self.path.clone(), self.max_connections),
        }))
    }

    fn staging(&self) -> StoreResult<Arc<dyn StagingStore>> {
        Ok(Arc::new(SqliteStagingStore {
            pool: ConnectionPool::new(self.path.clone(), self.max_connections),
        }))
    }
}
