//! CVE applicability check against the NVD feeds
//!
//! Maintains a local mirror of the NVD yearly JSON feeds (refreshed once
//! per day, guarded by a file lock against concurrent refreshes) and
//! filters CVE records by CPE 2.3 applicability for a
//! `(vendor, product, version)` triple. Anything the matcher cannot decide
//! soundly (AND nodes, child configurations, `?` wildcards) lands in the
//! `review` bucket for a human.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::HttpClient;
use crate::version::DebianVersion;
use crate::{A4fError, A4fResult};

const NIST_JSON_FEEDS: &str = "https://nvd.nist.gov/feeds/json/cve/1.1/";
const FEED_PREFIX: &str = "nvdcve-1.1-";
const FEED_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const FIRST_FEED_YEAR: i32 = 2002;
const CPE23_APPLICATION: &str = "cpe:2.3:a:";

/// One CVE bucketed by the filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveHit {
    pub id: String,
    pub data: Value,
}

/// Filter output: clear hits and records needing manual review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveResult {
    pub identified: Vec<CveHit>,
    pub review: Vec<CveHit>,
}

pub struct CveChecker {
    feed_dir: PathBuf,
    http: HttpClient,
    pub start_year: i32,
}

/// Guard file preventing two processes from refreshing the mirror at once.
struct FeedLock {
    path: PathBuf,
}

impl FeedLock {
    fn acquire(feed_dir: &Path) -> A4fResult<FeedLock> {
        let path = feed_dir.join(".feed.lock");
        let deadline = SystemTime::now() + Duration::from_secs(600);
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(FeedLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    // stale locks from killed processes expire after an hour
                    if let Ok(meta) = fs::metadata(&path) {
                        if let Ok(modified) = meta.modified() {
                            if modified.elapsed().unwrap_or_default()
                                > Duration::from_secs(3600)
                            {
                                let _ = fs::remove_file(&path);
                                continue;
                            }
                        }
                    }
                    if SystemTime::now() > deadline {
                        return Err(A4fError::ServiceUnavailable(
                            "timeout waiting for the NVD feed lock".to_string(),
                        ));
                    }
                    std::thread::sleep(Duration::from_secs(2));
                }
                Err(e) => return Err(A4fError::Io(e)),
            }
        }
    }
}

impl Drop for FeedLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl CveChecker {
    pub fn new(feed_dir: &Path) -> A4fResult<Self> {
        fs::create_dir_all(feed_dir)?;
        Ok(CveChecker {
            feed_dir: feed_dir.to_path_buf(),
            http: HttpClient::new()?,
            start_year: FIRST_FEED_YEAR,
        })
    }

    fn feed_path(&self, year: i32) -> PathBuf {
        self.feed_dir.join(format!("{FEED_PREFIX}{year}.json"))
    }

    fn feed_is_fresh(&self, year: i32) -> bool {
        fs::metadata(self.feed_path(year))
            .and_then(|m| m.modified())
            .map(|m| m.elapsed().unwrap_or_default() < FEED_MAX_AGE)
            .unwrap_or(false)
    }

    /// Download or refresh every yearly feed that is missing or older than
    /// 24 hours. Holds the feed-directory lock for the whole refresh.
    pub fn update_feeds(&self) -> A4fResult<()> {
        let current_year = chrono::Utc::now().year();
        let newest_fresh = self.feed_is_fresh(current_year);
        if newest_fresh {
            tracing::debug!("NVD feeds up to date");
            return Ok(());
        }

        let _lock = FeedLock::acquire(&self.feed_dir)?;
        for year in self.start_year..=current_year {
            if self.feed_is_fresh(year) {
                continue;
            }
            let url = format!("{NIST_JSON_FEEDS}{FEED_PREFIX}{year}.json.gz");
            tracing::info!("downloading {url}");
            let compressed = self.http.get_bytes(&url)?;
            let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
            let mut json = Vec::new();
            decoder
                .read_to_end(&mut json)
                .map_err(|e| A4fError::CorruptInput(format!("bad gzip feed for {year}: {e}")))?;
            fs::write(self.feed_path(year), &json)?;
        }
        Ok(())
    }

    /// Scan all local feeds for CVEs applicable to the triple.
    pub fn check(&self, vendor: &str, product: &str, version: &str) -> A4fResult<CveResult> {
        let slug = format!("{CPE23_APPLICATION}{vendor}:{product}:");
        // the textual pre-filter must not assume a vendor when searching
        // for "any vendor"
        let prefilter = if vendor == "*" {
            format!(":{product}:")
        } else {
            slug.clone()
        };
        tracing::info!("{slug} searching v{version}");
        let mut result = CveResult::default();
        let current_year = chrono::Utc::now().year();

        for year in self.start_year..=current_year {
            let path = self.feed_path(year);
            if !path.is_file() {
                tracing::debug!("feed for {year} not mirrored, skipping");
                continue;
            }
            let feed: Value = serde_json::from_slice(&fs::read(&path)?)
                .map_err(|e| A4fError::CorruptInput(format!("bad NVD feed {year}: {e}")))?;
            let items = match feed.get("CVE_Items").and_then(|i| i.as_array()) {
                Some(items) => items,
                None => continue,
            };
            for item in items {
                if !valid_cve_format(item) {
                    continue;
                }
                // cheap textual pre-filter before walking the node tree
                let configurations = match item.get("configurations") {
                    Some(c) => c,
                    None => continue,
                };
                if !configurations.to_string().contains(&prefilter) {
                    continue;
                }
                let id = item
                    .pointer("/cve/CVE_data_meta/ID")
                    .and_then(|i| i.as_str())
                    .unwrap_or("CVE-unknown")
                    .to_string();
                tracing::debug!("{slug} checking {id}");
                match classify_cve(configurations, vendor, product, version) {
                    Applicability::Identified => result.identified.push(CveHit {
                        id,
                        data: item.clone(),
                    }),
                    Applicability::Review => result.review.push(CveHit {
                        id,
                        data: item.clone(),
                    }),
                    Applicability::NotAffected => {}
                }
            }
        }

        tracing::info!(
            "{slug} {} identified, {} for review",
            result.identified.len(),
            result.review.len()
        );
        Ok(result)
    }

    /// Run the check for every source package in a harvest document and
    /// patch the results into its `cve_metadata`.
    pub fn check_harvest(&self, harvest: &mut Value, vendor: &str) -> A4fResult<()> {
        let packages = harvest
            .get_mut("source_packages")
            .and_then(|p| p.as_array_mut())
            .ok_or_else(|| {
                A4fError::CorruptInput("harvest document has no source_packages".to_string())
            })?;

        for package in packages {
            let name = package
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string();
            let cve_version = match package
                .pointer("/cve_metadata/cve_version")
                .and_then(|v| v.as_str())
            {
                Some(v) => v.to_string(),
                None => {
                    tracing::warn!("[{name}] no cve_metadata in harvest, skipping");
                    continue;
                }
            };
            let result = self.check(vendor, &name, &cve_version)?;
            if !result.identified.is_empty() || !result.review.is_empty() {
                package["cve_metadata"]["result"] = serde_json::to_value(&result)?;
            }
        }
        Ok(())
    }
}

fn valid_cve_format(item: &Value) -> bool {
    item.pointer("/cve/data_format").and_then(|v| v.as_str()) == Some("MITRE")
        && item.pointer("/cve/data_type").and_then(|v| v.as_str()) == Some("CVE")
        && item.pointer("/cve/data_version").and_then(|v| v.as_str()) == Some("4.0")
}

enum Applicability {
    Identified,
    Review,
    NotAffected,
}

/// Walk `configurations.nodes` and decide applicability for the triple.
fn classify_cve(configurations: &Value, vendor: &str, product: &str, version: &str) -> Applicability {
    let nodes = match configurations.get("nodes").and_then(|n| n.as_array()) {
        Some(nodes) => nodes,
        None => return Applicability::NotAffected,
    };

    let mut identified = false;
    let mut review = false;
    let needle = DebianVersion::parse(version);

    for node in nodes {
        let children = node
            .get("children")
            .and_then(|c| c.as_array())
            .map(|c| c.len())
            .unwrap_or(0);
        if children > 0 {
            // nested configurations are not evaluated, a human decides
            review = true;
        }
        if node.get("operator").and_then(|o| o.as_str()) != Some("OR") {
            review = true;
            continue;
        }
        let matches = match node.get("cpe_match").and_then(|m| m.as_array()) {
            Some(matches) => matches,
            None => continue,
        };
        for m in matches {
            if m.get("vulnerable").and_then(|v| v.as_bool()) != Some(true) {
                continue;
            }
            let uri = m.get("cpe23Uri").and_then(|u| u.as_str()).unwrap_or("");
            if !uri.starts_with(CPE23_APPLICATION) {
                // OS or hardware CPEs need the unsupported AND semantics
                continue;
            }
            let fields: Vec<&str> = uri.split(':').collect();
            let (cpe_vendor, cpe_product, cpe_version) = match fields.as_slice() {
                [_, _, _, v, p, ver, ..] => (*v, *p, *ver),
                _ => continue,
            };
            if cpe_product != product {
                continue;
            }
            if vendor != "*" && cpe_vendor != vendor && cpe_vendor != "*" {
                continue;
            }
            match cpe_match_applicability(m, cpe_version, &needle) {
                Applicability::Identified => identified = true,
                Applicability::Review => review = true,
                Applicability::NotAffected => {}
            }
        }
    }

    if identified {
        Applicability::Identified
    } else if review {
        Applicability::Review
    } else {
        Applicability::NotAffected
    }
}

/// Applicability of one `cpe_match` entry for the needle version.
fn cpe_match_applicability(
    m: &Value,
    cpe_version: &str,
    needle: &DebianVersion,
) -> Applicability {
    let mut bounded = false;
    let mut inside = true;

    let bound = |key: &str| m.get(key).and_then(|v| v.as_str()).map(DebianVersion::parse);

    if let Some(start) = bound("versionStartIncluding") {
        bounded = true;
        inside = inside && *needle >= start;
    }
    if let Some(start) = bound("versionStartExcluding") {
        bounded = true;
        inside = inside && *needle > start;
    }
    if let Some(end) = bound("versionEndIncluding") {
        bounded = true;
        inside = inside && *needle <= end;
    }
    if let Some(end) = bound("versionEndExcluding") {
        bounded = true;
        inside = inside && *needle < end;
    }
    if bounded {
        return if inside {
            Applicability::Identified
        } else {
            Applicability::NotAffected
        };
    }

    // no range bounds: decide on the CPE version field itself
    match cpe_version {
        "*" => Applicability::Identified,
        "-" => Applicability::NotAffected,
        v if v.contains('?') => Applicability::Review,
        v => {
            let cpe = DebianVersion::parse(v);
            if cpe.cmp(needle) == std::cmp::Ordering::Equal {
                Applicability::Identified
            } else {
                Applicability::NotAffected
            }
        }
    }
}
