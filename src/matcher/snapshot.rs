//! Matcher against the Debian snapshot archive
//!
//! The snapshot service retains every package version ever published and
//! indexes individual files by SHA-1. That allows a stronger match than
//! the current index: when the alien's main internal archive hash is known
//! to snapshot, the Debian source package is identified directly and both
//! scores are pinned. Name/version scoring is the fallback. API responses
//! are cached in the pool and calls are throttled to be polite.

use std::time::Duration;

use serde_json::Value;

use crate::http::HttpClient;
use crate::matcher::{
    best_package_name, check_matchable, fetch_debian_sources, select_version,
};
use crate::models::common::{StepError, ToolInfo};
use crate::models::matcher::{AlienSnapMatcherModel, AlienSrcSummary, DebianSnapMatch};
use crate::package::{AlienPackage, FilesInArchive, SourceFile};
use crate::pool::{IfExists, Pool};
use crate::{calc, A4fError, A4fResult};

const API_URL_PACKAGE: &str = "https://snapshot.debian.org/mr/package/";
const API_URL_FILE: &str = "https://snapshot.debian.org/file/";
const API_URL_FILEINFO: &str = "https://snapshot.debian.org/mr/file/";

/// Pause between uncached snapshot API calls.
const REQUEST_THROTTLE: Duration = Duration::from_secs(5);

pub struct SnapMatcher<'a> {
    pool: &'a Pool,
    http: HttpClient,
    package_api: String,
    file_api: String,
    fileinfo_api: String,
    throttle: Duration,
}

impl<'a> SnapMatcher<'a> {
    pub fn new(pool: &'a Pool) -> A4fResult<Self> {
        Ok(SnapMatcher {
            pool,
            http: HttpClient::new()?,
            package_api: API_URL_PACKAGE.to_string(),
            file_api: API_URL_FILE.to_string(),
            fileinfo_api: API_URL_FILEINFO.to_string(),
            throttle: REQUEST_THROTTLE,
        })
    }

    pub fn with_endpoints(
        pool: &'a Pool,
        package_api: &str,
        file_api: &str,
        fileinfo_api: &str,
    ) -> A4fResult<Self> {
        Ok(SnapMatcher {
            pool,
            http: HttpClient::new()?,
            package_api: package_api.to_string(),
            file_api: file_api.to_string(),
            fileinfo_api: fileinfo_api.to_string(),
            throttle: Duration::ZERO,
        })
    }

    /// GET a snapshot API endpoint with a pool-side response cache.
    fn get_data(&self, uri: &str) -> A4fResult<Value> {
        let mut mangled = uri
            .split("://")
            .nth(1)
            .unwrap_or(uri)
            .replace(['/', ':'], ".");
        if !mangled.ends_with('.') {
            mangled.push('.');
        }
        let rel = std::path::Path::new("apiresponse").join(format!("snap_match-{mangled}json"));

        let bytes = self.pool.ensure(&rel, || {
            tracing::debug!("API result not cached, calling {uri}");
            std::thread::sleep(self.throttle);
            self.http.get_bytes(uri)
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| A4fError::CorruptInput(format!("bad snapshot response from {uri}: {e}")))
    }

    pub fn run(&self, package: &mut AlienPackage) -> A4fResult<AlienSnapMatcherModel> {
        let id = package.id.clone();
        tracing::info!("[{id}] matching through the Debian snapshot archive");
        package.expand(false, false, false)?;

        let mut model = AlienSnapMatcherModel {
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
            model.errors.push(StepError::new("snapmatch", &reason));
            return Ok(model);
        }

        let result = self
            .match_by_sha1(package)
            .transpose()
            .unwrap_or_else(|| self.match_by_name(package));

        match result {
            Ok(mut snap_match) => {
                self.fetch_all_sources(&mut snap_match)?;
                tracing::info!(
                    "[{id}] MATCH: {} {} (score: {})",
                    snap_match.name,
                    snap_match.version,
                    snap_match.score
                );
                model.debian_match = Some(snap_match);
            }
            Err(A4fError::NotFound(msg)) => {
                tracing::info!("[{id}] NO MATCH: {msg}");
                model.errors.push(StepError::new("snapmatch", &msg));
            }
            Err(err) => return Err(err),
        }
        Ok(model)
    }

    /// Direct identification through the snapshot file-hash index.
    /// Returns `Ok(None)` when the hash is unknown, so the caller can fall
    /// back to name scoring.
    fn match_by_sha1(&self, package: &AlienPackage) -> A4fResult<Option<DebianSnapMatch>> {
        let id = &package.id;
        let main = match package.main_internal_archive() {
            Some(main) if !main.sha1_cksum.is_empty() => main,
            _ => return Ok(None),
        };

        let info = match self.file_info(&main.sha1_cksum) {
            Ok(Some(info)) => info,
            Ok(None) => {
                tracing::debug!("[{id}] sha1 {} unknown to snapshot", main.sha1_cksum);
                return Ok(None);
            }
            Err(A4fError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let deb_name = match info
            .get("path")
            .and_then(|p| p.as_str())
            .and_then(|p| p.rsplit('/').next())
        {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Ok(None),
        };
        let filename = info.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let deb_version = match version_from_source_filename(filename, &deb_name) {
            Some(v) => v,
            None => return Ok(None),
        };

        let package_score = if package.all_names().iter().any(|n| *n == deb_name) {
            100
        } else {
            calc::best_name_score(&package.all_names(), &deb_name)
        };
        tracing::info!(
            "[{id}] snapshot knows sha1 {}: {deb_name} {deb_version}",
            main.sha1_cksum
        );

        Ok(Some(DebianSnapMatch {
            name: deb_name,
            version: deb_version,
            score: calc::overall_score(package_score, 100),
            package_score,
            version_score: 100,
            matched_by_sha1: true,
            ..DebianSnapMatch::default()
        }))
    }

    /// Fuzzy name scoring over the snapshot package list, then version
    /// scoring over the package's full version history.
    fn match_by_name(&self, package: &AlienPackage) -> A4fResult<DebianSnapMatch> {
        let id = &package.id;
        let index = self.get_data(&self.package_api)?;
        let packages: Vec<String> = index
            .get("result")
            .and_then(|r| r.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("package").and_then(|p| p.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let names = package.all_names();
        let (deb_name, package_score) =
            best_package_name(&names, packages.iter().map(String::as_str)).ok_or_else(|| {
                A4fError::NotFound("no similar package on the snapshot archive".to_string())
            })?;

        tracing::debug!("[{id}] fuzzy package match {} -> {deb_name}", id.name);

        let versions_doc = self.get_data(&format!("{}{}/", self.package_api, deb_name))?;
        let versions: Vec<String> = versions_doc
            .get("result")
            .and_then(|r| r.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("version").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if versions.is_empty() {
            return Err(A4fError::NotFound(format!(
                "snapshot lists no versions for {deb_name}"
            )));
        }

        let selection = select_version(&package.version, &versions).ok_or_else(|| {
            A4fError::NotFound(format!(
                "no version of {deb_name} within acceptable distance of {}",
                id.version
            ))
        })?;

        Ok(DebianSnapMatch {
            name: deb_name,
            version: selection.version.original.clone(),
            score: calc::overall_score(package_score, selection.version_score),
            package_score,
            version_score: selection.version_score,
            matched_by_sha1: false,
            version_candidates: selection.candidates,
            ..DebianSnapMatch::default()
        })
    }

    fn file_info(&self, sha1: &str) -> A4fResult<Option<Value>> {
        let doc = self.get_data(&format!("{}{sha1}/info", self.fileinfo_api))?;
        Ok(doc
            .get("result")
            .and_then(|r| r.as_array())
            .and_then(|entries| entries.first())
            .cloned())
    }

    /// Resolve the source file set for the matched version, download
    /// everything, verify against the `.dsc`, and classify orig/debian.
    fn fetch_all_sources(&self, snap_match: &mut DebianSnapMatch) -> A4fResult<()> {
        let uri = format!(
            "{}{}/{}/allfiles",
            self.package_api, snap_match.name, snap_match.version
        );
        let doc = self.get_data(&uri)?;
        let hashes: Vec<String> = doc
            .get("result")
            .and_then(|r| r.get("source"))
            .and_then(|s| s.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("hash").and_then(|h| h.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if hashes.is_empty() {
            return Err(A4fError::NotFound(format!(
                "snapshot lists no source files for {} {}",
                snap_match.name, snap_match.version
            )));
        }

        snap_match.srcfiles = Vec::new();
        for hash in &hashes {
            let info = self.file_info(hash)?.ok_or_else(|| {
                A4fError::NotFound(format!("no file info for snapshot hash {hash}"))
            })?;
            let name = info
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string();
            snap_match.srcfiles.push(SourceFile {
                name,
                sha1_cksum: hash.clone(),
                git_sha1: None,
                src_uri: format!("{}{hash}", self.file_api),
                files_in_archive: FilesInArchive::Flag(false),
                paths: Vec::new(),
            });
        }

        let srcfiles = snap_match.srcfiles.clone();
        let url_for = |filename: &str| {
            srcfiles
                .iter()
                .find(|f| f.name == filename)
                .map(|f| f.src_uri.clone())
                .unwrap_or_else(|| format!("{}{filename}", self.file_api))
        };
        let refs = fetch_debian_sources(
            self.pool,
            &self.http,
            &snap_match.name,
            &snap_match.version,
            url_for,
        )?;
        snap_match.debsrc_orig = refs.debsrc_orig;
        snap_match.debsrc_debian = refs.debsrc_debian;
        snap_match.dsc_format = Some(refs.dsc_format);
        Ok(())
    }

    pub fn write_result(&self, model: &AlienSnapMatcherModel) -> A4fResult<()> {
        let id = crate::pool::PackageId::new(&model.aliensrc.name, &model.aliensrc.version);
        self.pool.write_json_typed(
            crate::pool::FileType::Snapmatch,
            &id,
            model,
            IfExists::Overwrite,
        )?;
        Ok(())
    }
}

/// Derive the Debian version from a source artifact filename like
/// `zlib_1.2.11.dfsg.orig.tar.gz` or `pkg_1.0-3.debian.tar.xz`.
fn version_from_source_filename(filename: &str, package: &str) -> Option<String> {
    let rest = filename.strip_prefix(&format!("{package}_"))?;
    let version = rest
        .split(".orig.tar")
        .next()?
        .split(".debian.tar")
        .next()?
        .split(".diff.gz")
        .next()?
        .split(".dsc")
        .next()?;
    // plain native tarballs: strip a trailing .tar.<comp>
    let version = version.split(".tar.").next().unwrap_or(version);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_extraction_from_filenames() {
        assert_eq!(
            version_from_source_filename("zlib_1.2.11.dfsg.orig.tar.gz", "zlib"),
            Some("1.2.11.dfsg".to_string())
        );
        assert_eq!(
            version_from_source_filename("acl_2.2.53-4.debian.tar.xz", "acl"),
            Some("2.2.53-4".to_string())
        );
        assert_eq!(
            version_from_source_filename("pkg_1.0.tar.xz", "pkg"),
            Some("1.0".to_string())
        );
        assert_eq!(version_from_source_filename("other_1.0.dsc", "pkg"), None);
    }
}
