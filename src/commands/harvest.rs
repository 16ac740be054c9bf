//! `harvest`: aggregate all artifacts into a dashboard report

use crate::config::Settings;
use crate::harvest::Harvester;
use crate::pool::{PackageId, Pool};
use crate::session::Session;
use crate::A4fResult;

pub struct HarvestCmd<'a> {
    pub pool: &'a Pool,
    pub use_oldmatcher: bool,
    pub add_missing: bool,
    pub filter_snapshot: Option<String>,
    pub with_binaries: Vec<String>,
}

impl<'a> HarvestCmd<'a> {
    pub fn execute(
        &self,
        settings: &Settings,
        session: &Session<'_>,
        ids: &[PackageId],
    ) -> A4fResult<()> {
        let mut harvester = Harvester::new(self.pool, &settings.package_id_ext);
        harvester.use_oldmatcher = self.use_oldmatcher;
        harvester.add_missing = self.add_missing;
        harvester.filter_snapshot = self.filter_snapshot.clone();
        harvester.with_binaries = self.with_binaries.clone();

        let result = harvester.harvest(ids, session.model.as_ref())?;
        tracing::info!(
            "HARVEST: {} source packages aggregated",
            result.source_packages.len()
        );
        harvester.write(&result, &session.session_id)?;
        if settings.print_result {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(())
    }
}
