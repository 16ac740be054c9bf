//! Matcher against the current Debian source index
//!
//! Queries the ftp-master all-sources JSON (cached in the pool), picks the
//! best (name, version) candidate for an alien package, downloads the
//! `.dsc` and its source archives from the Debian mirrors, and records an
//! ALIENMATCHER document.

use serde::Deserialize;

use crate::http::HttpClient;
use crate::matcher::{
    best_package_name, check_matchable, fetch_debian_sources, select_version, version_without_epoch,
};
use crate::models::common::{StepError, ToolInfo};
use crate::models::matcher::{AlienMatcherModel, AlienSrcSummary, DebianMatch};
use crate::package::AlienPackage;
use crate::pool::{IfExists, Pool};
use crate::{calc, A4fError, A4fResult};

const API_URL_ALLSRC: &str = "https://api.ftp-master.debian.org/all_sources";

const DEBIAN_BASEURLS: &[&str] = &[
    "http://deb.debian.org/debian/pool/main",
    "http://security.debian.org/debian-security/pool/updates/main",
    "http://deb.debian.org/debian/pool/non-free",
];

#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    source: String,
    version: String,
}

pub struct AlienMatcher<'a> {
    pool: &'a Pool,
    http: HttpClient,
    index_url: String,
    baseurls: Vec<String>,
}

impl<'a> AlienMatcher<'a> {
    pub fn new(pool: &'a Pool) -> A4fResult<Self> {
        Ok(AlienMatcher {
            pool,
            http: HttpClient::new()?,
            index_url: API_URL_ALLSRC.to_string(),
            baseurls: DEBIAN_BASEURLS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Point the matcher at a different index/mirror set (tests, local
    /// mirrors).
    pub fn with_endpoints(pool: &'a Pool, index_url: &str, baseurls: Vec<String>) -> A4fResult<Self> {
        Ok(AlienMatcher {
            pool,
            http: HttpClient::new()?,
            index_url: index_url.to_string(),
            baseurls,
        })
    }

    /// The all-sources index, fetched once and cached in the pool.
    fn load_index(&self) -> A4fResult<Vec<IndexEntry>> {
        let rel = std::path::Path::new("apiresponse").join("deb_all_sources.json");
        let bytes = self.pool.ensure(&rel, || {
            tracing::debug!("index not cached, calling {}", self.index_url);
            self.http.get_bytes(&self.index_url)
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| A4fError::CorruptInput(format!("bad all_sources index: {e}")))
    }

    /// Match one alien package. Errors at package scope are recorded in
    /// the returned model instead of failing the call; only infrastructure
    /// errors (index unreachable) propagate.
    pub fn run(&self, package: &mut AlienPackage) -> A4fResult<AlienMatcherModel> {
        let id = package.id.clone();
        tracing::info!("[{id}] matching against the current Debian index");
        package.expand(false, false, false)?;

        let mut model = AlienMatcherModel {
            tool: ToolInfo::current(),
            aliensrc: AlienSrcSummary {
                name: id.name.clone(),
                version: id.version.clone(),
                alternative_names: package.alternative_names.clone(),
                internal_archive_name: package.main_internal_archive().map(|a| a.name.clone()),
                filename: package.archive_name.clone(),
                files: package.files.clone(),
            },
            debian_match: None,
            errors: Vec::new(),
        };

        if let Err(reason) = check_matchable(package) {
            tracing::info!("[{id}] IGNORED: {reason}");
            model.errors.push(StepError::new("match", &reason));
            return Ok(model);
        }

        match self.search(package) {
            Ok(debian_match) => {
                tracing::info!(
                    "[{id}] MATCH: {} {} (score: {})",
                    debian_match.name,
                    debian_match.version,
                    debian_match.score
                );
                model.debian_match = Some(debian_match);
            }
            Err(A4fError::NotFound(msg)) => {
                tracing::info!("[{id}] NO MATCH: {msg}");
                model.errors.push(StepError::new("match", &msg));
            }
            Err(err) => return Err(err),
        }
        Ok(model)
    }

    fn search(&self, package: &AlienPackage) -> A4fResult<DebianMatch> {
        let id = &package.id;
        let index = self.load_index()?;
        let names = package.all_names();

        let (deb_name, package_score) =
            best_package_name(&names, index.iter().map(|e| e.source.as_str())).ok_or_else(
                || A4fError::NotFound("no similar package on the Debian index".to_string()),
            )?;
        if deb_name != id.name {
            tracing::debug!("[{id}] name {} not found, trying {deb_name}", id.name);
        }

        let versions: Vec<String> = index
            .iter()
            .filter(|e| e.source == deb_name)
            .map(|e| e.version.clone())
            .collect();
        let selection = select_version(&package.version, &versions).ok_or_else(|| {
            A4fError::NotFound(format!(
                "no version of {deb_name} within acceptable distance of {}",
                id.version
            ))
        })?;

        let deb_version = selection.version.original.clone();
        let refs = self.fetch_sources(&deb_name, &deb_version)?;

        Ok(DebianMatch {
            name: deb_name,
            version: deb_version,
            score: calc::overall_score(package_score, selection.version_score),
            package_score,
            version_score: selection.version_score,
            debsrc_orig: refs.debsrc_orig,
            debsrc_debian: refs.debsrc_debian,
            dsc_format: Some(refs.dsc_format),
            version_candidates: selection.candidates,
        })
    }

    fn fetch_sources(
        &self,
        name: &str,
        version: &str,
    ) -> A4fResult<crate::matcher::DebianSourceRefs> {
        // lib packages live under a four-letter pool directory
        let pooldir = if name.starts_with("lib") {
            &name[..4.min(name.len())]
        } else {
            &name[..1.min(name.len())]
        };

        let mut last_err: Option<A4fError> = None;
        for baseurl in &self.baseurls {
            let url_for = |filename: &str| format!("{baseurl}/{pooldir}/{name}/{filename}");
            match fetch_debian_sources(self.pool, &self.http, name, version, url_for) {
                Ok(refs) => return Ok(refs),
                Err(err @ A4fError::NotFound(_)) => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            A4fError::NotFound(format!(
                "no mirror carries {name}_{}",
                version_without_epoch(version)
            ))
        }))
    }

    /// Persist the model under the ALIENMATCHER filetype.
    pub fn write_result(&self, model: &AlienMatcherModel) -> A4fResult<()> {
        let id = crate::pool::PackageId::new(&model.aliensrc.name, &model.aliensrc.version);
        self.pool.write_json_typed(
            crate::pool::FileType::Alienmatcher,
            &id,
            model,
            IfExists::Overwrite,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_entries_deserialize() {
        let entries: Vec<IndexEntry> = serde_json::from_str(
            r#"[{"source": "zlib", "version": "1:1.2.11.dfsg-1"},
                {"source": "acl", "version": "2.2.53-4"}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "zlib");
    }
}
