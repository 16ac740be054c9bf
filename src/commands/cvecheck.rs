//! `cvecheck`: filter NVD feeds by CPE applicability

use std::path::Path;

use crate::cvecheck::CveChecker;
use crate::pool::{FileType, IfExists, Pool, Relationship};
use crate::{A4fError, A4fResult};

pub struct CveCheckCmd<'a> {
    pub pool: &'a Pool,
    pub vendor: String,
}

impl<'a> CveCheckCmd<'a> {
    fn checker(&self) -> A4fResult<CveChecker> {
        let feed_dir = self
            .pool
            .abspath(Path::new(Relationship::Stats.as_str()))
            .join("nvd_feeds");
        CveChecker::new(&feed_dir)
    }

    /// Check one explicit `(vendor, product, version)` triple.
    pub fn check_triple(&self, product: &str, version: &str) -> A4fResult<()> {
        let checker = self.checker()?;
        checker.update_feeds()?;
        let result = checker.check(&self.vendor, product, version)?;

        let rel = Path::new(Relationship::Stats.as_str())
            .join(format!("{product}.{}", FileType::CveHarvest.ext()));
        self.pool.write_json(&rel, &result, IfExists::Overwrite)?;
        tracing::info!("CVECHECK: result written to {}", rel.display());
        Ok(())
    }

    /// Check every source package of a harvest document and write the
    /// patched harvest as a CVE_HARVEST artifact.
    pub fn check_harvest(&self, session_id: &str) -> A4fResult<()> {
        let harvest_rel = Path::new(Relationship::Stats.as_str())
            .join(format!("{session_id}.{}", FileType::Harvest.ext()));
        let mut harvest: serde_json::Value =
            self.pool.read_json(&harvest_rel).map_err(|_| {
                A4fError::NotFound(format!(
                    "no harvest for session '{session_id}', run harvest first"
                ))
            })?;

        let checker = self.checker()?;
        checker.update_feeds()?;
        checker.check_harvest(&mut harvest, &self.vendor)?;

        let rel = Path::new(Relationship::Stats.as_str())
            .join(format!("{session_id}.{}", FileType::CveHarvest.ext()));
        self.pool.write_json(&rel, &harvest, IfExists::Overwrite)?;
        tracing::info!("CVECHECK: patched harvest written to {}", rel.display());
        Ok(())
    }
}
