//! SQL projection of per-package build metadata
//!
//! Mirrors every TINFOILHAT document of a session into a SQL table so
//! dashboards can query build metadata without touching the pool. Both
//! modes run inside one transaction per session: FULL deletes the
//! session's rows first, DELTA only inserts rows whose `(session, fname)`
//! key is new.

use std::path::Path;

use rusqlite::Connection;

use crate::pool::{FileType, PackageId, Pool};
use crate::session::Session;
use crate::{A4fError, A4fResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Delete all rows for the session, then insert everything.
    Full,
    /// Insert only rows not already present.
    Delta,
}

impl MirrorMode {
    pub fn parse(s: &str) -> A4fResult<Self> {
        match s.to_uppercase().as_str() {
            "FULL" => Ok(MirrorMode::Full),
            "DELTA" => Ok(MirrorMode::Delta),
            other => Err(A4fError::Config(format!(
                "invalid mirror mode '{other}', FULL or DELTA expected"
            ))),
        }
    }
}

pub struct Mirror {
    conn: Connection,
}

impl Mirror {
    pub fn open(db_path: &Path) -> A4fResult<Self> {
        let conn = Connection::open(db_path)?;
        let mirror = Mirror { conn };
        mirror.init_schema()?;
        Ok(mirror)
    }

    pub fn open_in_memory() -> A4fResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mirror = Mirror { conn };
        mirror.init_schema()?;
        Ok(mirror)
    }

    fn init_schema(&self) -> A4fResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tinfoilhat (
                 session TEXT NOT NULL,
                 fname   TEXT NOT NULL,
                 data    TEXT NOT NULL,
                 UNIQUE (session, fname)
             );",
        )?;
        Ok(())
    }

    /// Project the session's TINFOILHAT documents. Returns the number of
    /// rows actually inserted.
    pub fn project(
        &mut self,
        pool: &Pool,
        session: &Session,
        mode: MirrorMode,
    ) -> A4fResult<usize> {
        let session_id = session.session_id.clone();
        let ids: Vec<PackageId> = session.package_ids();

        let tx = self.conn.transaction()?;
        if mode == MirrorMode::Full {
            let deleted = tx.execute(
                "DELETE FROM tinfoilhat WHERE session = ?1",
                rusqlite::params![session_id],
            )?;
            tracing::info!("FULL mode: deleted {deleted} rows for session '{session_id}'");
        }

        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO tinfoilhat (session, fname, data)
                 VALUES (?1, ?2, ?3)",
            )?;
            for id in &ids {
                let rel = pool.path_typed(FileType::Tinfoilhat, id);
                let data = match pool.read_text(&rel) {
                    Ok(data) => data,
                    Err(A4fError::NotFound(_)) => {
                        tracing::warn!("[{id}] no tinfoilhat in pool, skipping");
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                let fname = rel.to_string_lossy().to_string();
                inserted += stmt.execute(rusqlite::params![session_id, fname, data])?;
                if inserted % 100 == 0 && inserted > 0 {
                    tracing::info!("{inserted} files processed");
                }
            }
        }
        tx.commit()?;
        tracing::info!("{inserted} rows inserted for session '{session_id}'");
        Ok(inserted)
    }

    pub fn row_count(&self, session_id: &str) -> A4fResult<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tinfoilhat WHERE session = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
