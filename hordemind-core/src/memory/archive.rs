//! SQLite archive for generational memory.
//!
//! One row per generation, written at `advance_generation` time, plus a
//! single index row recording the current generation and the live
//! record/cluster ids. The schema is intentionally simple:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS generations (
//!     generation    INTEGER PRIMARY KEY,
//!     data          BLOB NOT NULL,
//!     survival_rate REAL NOT NULL,
//!     achievements  TEXT NOT NULL,
//!     saved_at      TEXT NOT NULL,
//!     checksum      TEXT
//! );
//! CREATE TABLE IF NOT EXISTS archive_index (
//!     id                 INTEGER PRIMARY KEY CHECK (id = 1),
//!     current_generation INTEGER NOT NULL,
//!     record_ids         TEXT NOT NULL,
//!     cluster_ids        TEXT NOT NULL,
//!     updated_at         TEXT NOT NULL
//! );
//! ```
//!
//! JSON inside a BLOB column keeps the schema stable across record-shape
//! changes; WAL mode allows concurrent reads during gameplay; the
//! optional CRC-32 checksum detects save corruption. Corrupt data is
//! reported as `AiError::MemoryCorruption` and the store falls back to an
//! empty state — corruption is never fatal to the simulation.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{AiError, Result};
use crate::memory::{MemoryCluster, MemoryRecord};

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309 / ITU-T V.42) of `data` as a lowercase hex string.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    format!("{:08x}", !crc)
}

// ---------------------------------------------------------------------------
// Snapshot payload
// ---------------------------------------------------------------------------

/// Everything persisted for one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    /// Generation number this snapshot belongs to.
    pub generation: u32,
    /// All retained records as of the snapshot.
    pub records: Vec<MemoryRecord>,
    /// All clusters as of the snapshot.
    pub clusters: Vec<MemoryCluster>,
}

// ---------------------------------------------------------------------------
// GenerationArchive
// ---------------------------------------------------------------------------

/// Handle to the SQLite database holding generation snapshots.
pub struct GenerationArchive {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for GenerationArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationArchive")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS generations (
        generation    INTEGER PRIMARY KEY,
        data          BLOB NOT NULL,
        survival_rate REAL NOT NULL,
        achievements  TEXT NOT NULL,
        saved_at      TEXT NOT NULL,
        checksum      TEXT
    );
    CREATE TABLE IF NOT EXISTS archive_index (
        id                 INTEGER PRIMARY KEY CHECK (id = 1),
        current_generation INTEGER NOT NULL,
        record_ids         TEXT NOT NULL,
        cluster_ids        TEXT NOT NULL,
        updated_at         TEXT NOT NULL
    );";

impl GenerationArchive {
    /// Open (or create) the archive at `path`.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "generation archive opened"
        );

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory archive (useful for tests).
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Persist (upsert) a generation snapshot.
    ///
    /// # Errors
    /// Returns [`AiError::Serialization`] if JSON encoding fails, or
    /// [`AiError::Database`] on SQLite failures.
    pub fn save_generation(
        &self,
        snapshot: &GenerationSnapshot,
        survival_rate: f64,
        achievements: &[String],
    ) -> Result<()> {
        let json =
            serde_json::to_vec(snapshot).map_err(|e| AiError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let achievements_json = serde_json::to_string(achievements)
            .map_err(|e| AiError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO generations (generation, data, survival_rate, achievements, saved_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(generation) DO UPDATE SET
                data = excluded.data,
                survival_rate = excluded.survival_rate,
                achievements = excluded.achievements,
                saved_at = excluded.saved_at,
                checksum = excluded.checksum",
            params![
                snapshot.generation,
                json,
                survival_rate,
                achievements_json,
                now,
                checksum
            ],
        )?;

        debug!(
            generation = snapshot.generation,
            records = snapshot.records.len(),
            clusters = snapshot.clusters.len(),
            bytes = json.len(),
            "saved generation snapshot"
        );
        Ok(())
    }

    /// Persist the top-level index row.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn save_index(
        &self,
        current_generation: u32,
        record_ids: &[String],
        cluster_ids: &[String],
    ) -> Result<()> {
        let records = serde_json::to_string(record_ids)
            .map_err(|e| AiError::Serialization(e.to_string()))?;
        let clusters = serde_json::to_string(cluster_ids)
            .map_err(|e| AiError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO archive_index (id, current_generation, record_ids, cluster_ids, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                current_generation = excluded.current_generation,
                record_ids = excluded.record_ids,
                cluster_ids = excluded.cluster_ids,
                updated_at = excluded.updated_at",
            params![current_generation, records, clusters, now],
        )?;
        Ok(())
    }

    /// Current generation number from the index row, if any.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn current_generation(&self) -> Result<Option<u32>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT current_generation FROM archive_index WHERE id = 1")?;
        Ok(stmt.query_row([], |row| row.get(0)).optional()?)
    }

    /// Load one generation's snapshot.
    ///
    /// Returns `Ok(None)` if the generation was never saved.
    ///
    /// # Errors
    /// Returns [`AiError::MemoryCorruption`] on checksum mismatch or
    /// undecodable data, [`AiError::Database`] on SQLite failures.
    pub fn load_generation(&self, generation: u32) -> Result<Option<GenerationSnapshot>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM generations WHERE generation = ?1")?;

        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![generation], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if actual != expected {
                    return Err(AiError::MemoryCorruption {
                        reason: format!(
                            "generation {generation} checksum mismatch (stored {expected}, computed {actual})"
                        ),
                    });
                }
            }
        }

        let snapshot: GenerationSnapshot =
            serde_json::from_slice(&data).map_err(|e| AiError::MemoryCorruption {
                reason: format!("generation {generation} undecodable: {e}"),
            })?;
        Ok(Some(snapshot))
    }

    /// Load the snapshot the index points at, tolerating a missing index.
    ///
    /// # Errors
    /// Propagates corruption and database errors; the caller decides
    /// whether to fall back to an empty store.
    pub fn load_current(&self) -> Result<Option<GenerationSnapshot>> {
        match self.current_generation()? {
            Some(generation) => self.load_generation(generation),
            None => Ok(None),
        }
    }

    /// Number of persisted generations.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn generation_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM generations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Overwrite a generation row with raw bytes.
    ///
    /// Exists so tests can simulate on-disk corruption; the engine never
    /// calls it.
    ///
    /// # Errors
    /// Returns [`AiError::Database`] on SQLite failures.
    pub fn corrupt_generation_for_test(&self, generation: u32, garbage: &[u8]) -> Result<()> {
        warn!(generation, "overwriting generation data with test garbage");
        self.conn.execute(
            "UPDATE generations SET data = ?2 WHERE generation = ?1",
            params![generation, garbage],
        )?;
        Ok(())
    }
}
