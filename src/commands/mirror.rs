//! `mirror`: project session build metadata into the SQL store

use std::path::Path;

use crate::config::Settings;
use crate::mirror::{Mirror, MirrorMode};
use crate::pool::Pool;
use crate::session::Session;
use crate::A4fResult;

pub struct MirrorCmd<'a> {
    pub pool: &'a Pool,
    pub mode: MirrorMode,
    pub dryrun: bool,
}

impl<'a> MirrorCmd<'a> {
    pub fn execute(&self, settings: &Settings, session: &Session<'_>) -> A4fResult<()> {
        if self.dryrun {
            for id in session.package_ids() {
                tracing::info!("[{id}] would mirror tinfoilhat (dry run)");
            }
            return Ok(());
        }

        let db_path = Path::new(&settings.mirror_db.dbname);
        let mut mirror = Mirror::open(db_path)?;
        let inserted = mirror.project(self.pool, session, self.mode)?;
        tracing::info!("MIRROR: {inserted} rows written to {}", db_path.display());
        Ok(())
    }
}
