//! libSQL-backed concept and course graph.
//!
//! The [`Storage`] struct wraps a libSQL database holding concept nodes,
//! canonical concepts, alignment edges, course/slide nodes, and the run ledger.
//!
//! **Write rules:**
//! - Alignment edges and canonical concepts are written only through
//!   [`Storage::commit_cluster`], one transaction per cluster.
//! - Course graph changes go through [`Storage::apply_graph_writes`], one
//!   transaction per course.

mod concepts;
mod courses;
mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use curricula_shared::{CurriculaError, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

pub use concepts::{CanonicalWithMembers, ClusterWrite};
pub use courses::GraphWrite;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Map a libSQL error into the storage variant.
pub(crate) fn db_err(e: libsql::Error) -> CurriculaError {
    CurriculaError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CurriculaError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.enable_foreign_keys().await?;
        // Writers on other handles hold the lock for one cluster or course.
        storage.conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for inspection commands.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CurriculaError::Storage(format!(
                "graph database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn enable_foreign_keys(&self) -> Result<()> {
        self.conn
            .execute("PRAGMA foreign_keys = ON", params![])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CurriculaError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CurriculaError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Node and edge counts across the whole graph.
    pub async fn graph_counts(&self) -> Result<GraphCounts> {
        Ok(GraphCounts {
            concepts: self.count("SELECT COUNT(*) FROM concepts").await?,
            unaligned_concepts: self
                .count(
                    "SELECT COUNT(*) FROM concepts c
                     WHERE NOT EXISTS (SELECT 1 FROM aligns_to a WHERE a.concept_id = c.id)",
                )
                .await?,
            canonical_concepts: self.count("SELECT COUNT(*) FROM canonical_concepts").await?,
            alignments: self.count("SELECT COUNT(*) FROM aligns_to").await?,
            courses: self.count("SELECT COUNT(*) FROM courses").await?,
            slides: self.count("SELECT COUNT(*) FROM slides").await?,
            orphaned_nodes: self
                .count(
                    "SELECT (SELECT COUNT(*) FROM courses WHERE orphaned = 1)
                          + (SELECT COUNT(*) FROM slides WHERE orphaned = 1)",
                )
                .await?,
        })
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record the start of a harmonization or sync run. Returns the run ID.
    pub async fn insert_run(&self, kind: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO runs (id, kind, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), kind, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Mark a run finished with its summary.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, started_at, finished_at, stats_json
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(RunRecord {
                id: row.get::<String>(0).map_err(db_err)?,
                kind: row.get::<String>(1).map_err(db_err)?,
                started_at: row.get::<String>(2).map_err(db_err)?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

/// Node and edge counts for `curricula status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphCounts {
    pub concepts: u64,
    pub unaligned_concepts: u64,
    pub canonical_concepts: u64,
    pub alignments: u64,
    pub courses: u64,
    pub slides: u64,
    pub orphaned_nodes: u64,
}

/// One row of the run ledger.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}
