use std::path::Path;

use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::errors::Result;
use crate::types::RunRecord;

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS experiments_data (
    graph_type          VARCHAR(50) NOT NULL,
    V                   INTEGER NOT NULL,
    E                   INTEGER NOT NULL,
    T                   INTEGER NOT NULL,
    build_time_ms       REAL,
    has_edge_time_ms    REAL,
    neighbours_time_ms  REAL,
    aggregate_time_ms   REAL,
    graph_rss_kb        INTEGER,
    max_rss_kb          INTEGER,
    has_edge_epochs     INTEGER,
    neighbours_epochs   INTEGER,
    aggregate_epochs    INTEGER,
    PRIMARY KEY (graph_type, V, E, T)
)";

const INSERT: &str = "
INSERT OR IGNORE INTO experiments_data VALUES
    (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

const SELECT_ALL: &str = "SELECT * FROM experiments_data ORDER BY graph_type, V, E, T";

/// Durable table of benchmark results keyed by `(graph_type, V, E, T)`.
///
/// The handle is opened explicitly and closed with [`ResultStore::close`].
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            // Let SQLite report the real error if this fails.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened result store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self { conn })
    }

    /// Insert a record. Returns `false` when the key already exists; the
    /// stored row is left untouched in that case.
    pub fn insert(&self, record: &RunRecord) -> Result<bool> {
        let changed = self.conn.execute(
            INSERT,
            params![
                record.graph_type,
                record.vertices,
                record.edges,
                record.max_time,
                record.build_time_ms,
                record.has_edge_time_ms,
                record.neighbours_time_ms,
                record.aggregate_time_ms,
                record.graph_rss_kb,
                record.max_rss_kb,
                record.has_edge_epochs,
                record.neighbours_epochs,
                record.aggregate_epochs,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn records(&self) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(SELECT_ALL)?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Column names in schema order.
    pub fn column_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info('experiments_data')")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(names.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, err)| err)?;
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        graph_type: row.get(0)?,
        vertices: row.get(1)?,
        edges: row.get(2)?,
        max_time: row.get(3)?,
        build_time_ms: row.get(4)?,
        has_edge_time_ms: row.get(5)?,
        neighbours_time_ms: row.get(6)?,
        aggregate_time_ms: row.get(7)?,
        graph_rss_kb: row.get(8)?,
        max_rss_kb: row.get(9)?,
        has_edge_epochs: row.get(10)?,
        neighbours_epochs: row.get(11)?,
        aggregate_epochs: row.get(12)?,
    })
}
