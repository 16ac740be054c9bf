//! `delta`: classify the file-level delta between Debian and alien scans

use crate::commands::{load_recorded_match, Command};
use crate::deltacode::compare_reports;
use crate::pool::{FileType, IfExists, PackageId, Pool, Relationship};
use crate::A4fResult;

pub struct DeltaCmd<'a> {
    pool: &'a Pool,
    pub print_result: bool,
}

impl<'a> DeltaCmd<'a> {
    pub fn new(pool: &'a Pool, print_result: bool) -> Self {
        DeltaCmd { pool, print_result }
    }
}

impl Command for DeltaCmd<'_> {
    fn name(&self) -> &'static str {
        "delta"
    }

    fn hint(&self) -> &'static str {
        "scan"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let group = PackageId::new(&id.name, &id.version);
        let result_rel = self.pool.path_typed(FileType::Deltacode, &group);
        if self.pool.is_cached(&result_rel) {
            tracing::debug!("[{id}] delta result exists, skipping");
            return Ok(());
        }

        let recorded = load_recorded_match(self.pool, id)?;
        let deb_id = PackageId::new(&recorded.name, &recorded.version);
        let old_rel =
            self.pool
                .path_typed_in(FileType::ScancodeJson, &deb_id, Relationship::Debian);
        let new_rel = self.pool.path_typed(FileType::ScancodeJson, &group);

        let old_json = self.pool.read(&old_rel)?;
        let new_json = self.pool.read(&new_rel)?;
        let delta = compare_reports(
            &old_json,
            &new_json,
            &old_rel.to_string_lossy(),
            &new_rel.to_string_lossy(),
        )?;

        let stats = &delta.header.stats;
        tracing::info!(
            "[{id}] delta: {} same, {} moved, {} new, similarity {:.2}",
            stats.same_files,
            stats.moved_files,
            stats.new_files_with_license_or_copyright
                + stats.new_files_with_no_license_and_copyright,
            stats.similarity()
        );
        self.pool
            .write_json_typed(FileType::Deltacode, &group, &delta, IfExists::Overwrite)?;
        if self.print_result {
            println!("{}", serde_json::to_string_pretty(&delta)?);
        }
        Ok(())
    }
}
