//! `snapmatch`: match session packages through the Debian snapshot archive

use crate::commands::{load_alien_package, Command};
use crate::matcher::snapshot::SnapMatcher;
use crate::pool::{FileType, PackageId, Pool};
use crate::A4fResult;

pub struct SnapMatchCmd<'a> {
    pool: &'a Pool,
    matcher: SnapMatcher<'a>,
}

impl<'a> SnapMatchCmd<'a> {
    pub fn new(pool: &'a Pool) -> A4fResult<Self> {
        Ok(SnapMatchCmd {
            pool,
            matcher: SnapMatcher::new(pool)?,
        })
    }
}

impl Command for SnapMatchCmd<'_> {
    fn name(&self) -> &'static str {
        "snapmatch"
    }

    fn hint(&self) -> &'static str {
        "add"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let group = PackageId::new(&id.name, &id.version);
        let result_rel = self.pool.path_typed(FileType::Snapmatch, &group);
        if self.pool.is_cached(&result_rel) {
            tracing::debug!("[{id}] snapmatch result exists, skipping");
            return Ok(());
        }
        let mut package = load_alien_package(self.pool, id)?;
        let model = self.matcher.run(&mut package)?;
        self.matcher.write_result(&model)?;
        Ok(())
    }
}
