//! `match`: match session packages against the current Debian index

use crate::commands::{load_alien_package, Command};
use crate::matcher::current::AlienMatcher;
use crate::pool::{FileType, PackageId, Pool};
use crate::A4fResult;

pub struct MatchCmd<'a> {
    pool: &'a Pool,
    matcher: AlienMatcher<'a>,
}

impl<'a> MatchCmd<'a> {
    pub fn new(pool: &'a Pool) -> A4fResult<Self> {
        Ok(MatchCmd {
            pool,
            matcher: AlienMatcher::new(pool)?,
        })
    }
}

impl Command for MatchCmd<'_> {
    fn name(&self) -> &'static str {
        "match"
    }

    fn hint(&self) -> &'static str {
        "add"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let group = PackageId::new(&id.name, &id.version);
        let result_rel = self.pool.path_typed(FileType::Alienmatcher, &group);
        if self.pool.is_cached(&result_rel) {
            tracing::debug!("[{id}] match result exists, skipping");
            return Ok(());
        }
        let mut package = load_alien_package(self.pool, id)?;
        let model = self.matcher.run(&mut package)?;
        self.matcher.write_result(&model)?;
        Ok(())
    }
}
