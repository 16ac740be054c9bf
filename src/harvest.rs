//! Aggregate report over every per-package artifact in the pool
//!
//! For each identity in scope the harvester folds the matcher result, the
//! delta statistics, the scanner file counts, the clearing-server audit
//! state, and the TinfoilHat build metadata into one dashboard-ready
//! document keyed by build-matrix tag.

use std::collections::BTreeMap;

use crate::models::deltacode::DeltaModel;
use crate::models::fossy::FossyModel;
use crate::models::harvest::{
    AuditFindings, BinaryPackage, DebianMatchBasic, HarvestModel, HarvestSourcePackage,
    LicenseFinding, SessionState, Statistics, StatisticsLicenses,
};
use crate::models::matcher::{AlienMatcherModel, AlienSnapMatcherModel};
use crate::models::tinfoilhat::{aggregate_tags, TinfoilHatModel};
use crate::package::AlienPackage;
use crate::pool::{FileType, IfExists, PackageId, Pool, Relationship};
use crate::session::SessionModel;
use crate::A4fResult;

/// Input filetypes a fully processed package is expected to have.
const EXPECTED_INPUTS: &[FileType] = &[
    FileType::Aliensrc,
    FileType::Tinfoilhat,
    FileType::ScancodeJson,
    FileType::Deltacode,
    FileType::FossyJson,
];

pub struct Harvester<'a> {
    pool: &'a Pool,
    /// Read ALIENMATCHER documents instead of SNAPMATCH ones.
    pub use_oldmatcher: bool,
    /// Record missing input files into the harvest instead of only
    /// warning about them.
    pub add_missing: bool,
    /// Keep only tagged releases plus this named snapshot.
    pub filter_snapshot: Option<String>,
    /// Restrict binary packages to these names (empty = all).
    pub with_binaries: Vec<String>,
    /// Suffix appended to harvested package ids.
    pub package_id_ext: String,
}

impl<'a> Harvester<'a> {
    pub fn new(pool: &'a Pool, package_id_ext: &str) -> Self {
        Harvester {
            pool,
            use_oldmatcher: false,
            add_missing: false,
            filter_snapshot: None,
            with_binaries: Vec::new(),
            package_id_ext: package_id_ext.to_string(),
        }
    }

    /// Harvest the given identities (usually a session's package list).
    pub fn harvest(
        &self,
        ids: &[PackageId],
        session: Option<&SessionModel>,
    ) -> A4fResult<HarvestModel> {
        let mut result = HarvestModel::new();

        // group variants under their (name, version)
        let mut groups: BTreeMap<(String, String), Vec<PackageId>> = BTreeMap::new();
        for id in ids {
            groups
                .entry((id.name.clone(), id.version.clone()))
                .or_default()
                .push(id.clone());
        }

        for ((name, version), variants) in &groups {
            let group_key = PackageId::new(name, version);
            let matcher = self.read_matcher(&group_key);
            let delta = self.read_delta(&group_key);
            let upstream_total = self.read_upstream_total(&group_key);

            let mut group_stats_refs: Vec<usize> = Vec::new();
            for id in variants {
                let mut package = self.harvest_variant(
                    id,
                    matcher.clone(),
                    delta.as_ref(),
                    upstream_total,
                    session,
                )?;
                if let Some(snapshot) = &self.filter_snapshot {
                    package.tags.retain(|t| {
                        !t.contains("snapshot") || t.ends_with(snapshot.as_str())
                    });
                }
                group_stats_refs.push(result.source_packages.len());
                result.source_packages.push(package);
            }
            set_aggregate_flags(&mut result.source_packages, &group_stats_refs);
        }

        Ok(result)
    }

    /// Persist the harvest under `stats/`.
    pub fn write(&self, result: &HarvestModel, basename: &str) -> A4fResult<()> {
        let rel = std::path::Path::new(Relationship::Stats.as_str())
            .join(format!("{basename}.{}", FileType::Harvest.ext()));
        self.pool.write_json(&rel, result, IfExists::Overwrite)?;
        tracing::info!("harvest written to {}", rel.display());
        Ok(())
    }

    fn read_matcher(&self, id: &PackageId) -> Option<DebianMatchBasic> {
        if self.use_oldmatcher {
            let path = self.pool.path_typed(FileType::Alienmatcher, id);
            let model: AlienMatcherModel = self.pool.read_json(&path).ok()?;
            let m = model.debian_match?;
            Some(DebianMatchBasic {
                name: m.name,
                version: m.version,
                ip_matching_files: 0,
            })
        } else {
            let path = self.pool.path_typed(FileType::Snapmatch, id);
            let model: AlienSnapMatcherModel = self.pool.read_json(&path).ok()?;
            let m = model.debian_match?;
            Some(DebianMatchBasic {
                name: m.name,
                version: m.version,
                ip_matching_files: 0,
            })
        }
    }

    fn read_delta(&self, id: &PackageId) -> Option<DeltaModel> {
        let path = self.pool.path_typed(FileType::Deltacode, id);
        self.pool.read_json(&path).ok()
    }

    fn read_upstream_total(&self, id: &PackageId) -> usize {
        let path = self.pool.path_typed(FileType::ScancodeJson, id);
        let report: serde_json::Value = match self.pool.read_json(&path) {
            Ok(v) => v,
            Err(_) => return 0,
        };
        report
            .get("files")
            .and_then(|f| f.as_array())
            .map(|files| {
                files
                    .iter()
                    .filter(|f| f.get("type").and_then(|t| t.as_str()) == Some("file"))
                    .count()
            })
            .unwrap_or(0)
    }

    fn harvest_variant(
        &self,
        id: &PackageId,
        matcher: Option<DebianMatchBasic>,
        delta: Option<&DeltaModel>,
        upstream_total: usize,
        session: Option<&SessionModel>,
    ) -> A4fResult<HarvestSourcePackage> {
        let package_id = if id.variant.is_empty() {
            format!("{}-{}+{}", id.name, id.version, self.package_id_ext)
        } else {
            format!(
                "{}-{}-{}+{}",
                id.name, id.version, id.variant, self.package_id_ext
            )
        };
        tracing::debug!("[{package_id}] harvesting");

        let mut package = HarvestSourcePackage {
            id: package_id.clone(),
            name: id.name.clone(),
            version: id.version.clone(),
            variant: id.variant.clone(),
            ..HarvestSourcePackage::default()
        };
        let mut present: Vec<FileType> = Vec::new();

        if let Some(mut matching) = matcher {
            if self.use_oldmatcher {
                present.push(FileType::Alienmatcher);
            } else {
                present.push(FileType::Snapmatch);
            }
            if let Some(delta) = delta {
                present.push(FileType::Deltacode);
                let s = &delta.header.stats;
                matching.ip_matching_files = s.same_files
                    + s.moved_files
                    + s.changed_files_with_no_license_and_copyright
                    + s.changed_files_with_same_copyright_and_license
                    + s.changed_files_with_updated_copyright_year_only;
            }
            package.debian_matching = Some(matching);
        }

        if upstream_total > 0 {
            present.push(FileType::ScancodeJson);
            package.statistics.files.upstream_source_total = upstream_total;
        }

        // aliensrc: provenance statistics and the source file list
        let aliensrc_rel = self.pool.path_typed(FileType::Aliensrc, id);
        if self.pool.exists(&aliensrc_rel) {
            present.push(FileType::Aliensrc);
            match AlienPackage::from_aliensrc(self.pool.abspath(&aliensrc_rel)) {
                Ok(apkg) => {
                    package.statistics.files.provenance = apkg.provenance();
                    package.source_files = apkg.files.clone();
                }
                Err(err) => {
                    tracing::warn!("[{package_id}] unreadable aliensrc: {err}");
                }
            }
        }

        // clearing state: audit counters and license statistics
        let fossy_rel = self.pool.path_typed(FileType::FossyJson, id);
        if let Ok(fossy) = self.pool.read_json::<FossyModel>(&fossy_rel) {
            present.push(FileType::FossyJson);
            apply_fossy(&mut package.statistics, &fossy);
        }

        // build metadata: identity refinement, tags, binary packages
        let tfh_rel = self.pool.path_typed(FileType::Tinfoilhat, id);
        if let Ok(tfh) = self.pool.read_json::<TinfoilHatModel>(&tfh_rel) {
            present.push(FileType::Tinfoilhat);
            self.apply_tinfoilhat(&mut package, &tfh);
        }

        if let Some(session) = session {
            package.session_state = session
                .package_list
                .iter()
                .find(|p| p.id() == *id)
                .map(|p| SessionState {
                    selected: p.selected,
                    selected_reason: p.selected_reason.clone(),
                    uploaded: p.uploaded,
                    uploaded_reason: p.uploaded_reason.clone(),
                });
        }

        let missing: Vec<String> = EXPECTED_INPUTS
            .iter()
            .filter(|ft| !present.contains(ft))
            .map(|ft| ft.ext().to_string())
            .collect();
        if !missing.is_empty() {
            tracing::warn!("[{package_id}] package misses the {missing:?} input files");
            if self.add_missing {
                package.missing_input = missing;
            }
        }

        Ok(package)
    }

    fn apply_tinfoilhat(&self, package: &mut HarvestSourcePackage, tfh: &TinfoilHatModel) {
        for container in tfh.0.values() {
            let meta = &container.recipe.metadata;
            if !meta.name.is_empty() {
                package.name = meta.name.clone();
            }
            if !meta.version.is_empty() {
                package.version = meta.version.clone();
            }
            package.revision = meta.revision.clone();
            if !meta.variant.is_empty() {
                package.variant = meta.variant.clone();
            }
            package.tags = aggregate_tags(&container.tags);
            package.binary_packages = container
                .packages
                .iter()
                .filter(|(name, _)| {
                    self.with_binaries.is_empty()
                        || self.with_binaries.iter().any(|b| b == *name)
                })
                .map(|(name, entry)| BinaryPackage {
                    name: name.clone(),
                    version: entry.package.metadata.version.clone(),
                    revision: entry.package.metadata.revision.clone(),
                    tags: entry.tags.clone(),
                    metadata: entry.package.metadata.extra.clone(),
                })
                .collect();
        }
    }
}

/// Fold clearing-state counters and license findings into the statistics.
fn apply_fossy(stats: &mut Statistics, fossy: &FossyModel) {
    let audit_total = fossy.summary.files_cleared;
    let to_do = fossy.summary.files_to_be_cleared;
    stats.files.audit_total = audit_total;
    stats.files.audit_to_do = to_do;
    stats.files.audit_done = audit_total.saturating_sub(to_do);

    let mut scanner: BTreeMap<String, u64> = BTreeMap::new();
    let mut concluded: BTreeMap<String, u64> = BTreeMap::new();
    for finding in &fossy.licenses {
        if finding.agent_findings.is_empty() && finding.conclusions.is_empty() {
            continue;
        }
        for license in license_set(&finding.agent_findings) {
            *scanner.entry(license).or_default() += 1;
        }
        for license in license_set(&finding.conclusions) {
            *concluded.entry(license).or_default() += 1;
        }
    }

    let main_licenses = fossy
        .summary
        .main_license
        .as_ref()
        .map(|ml| {
            let mut licenses: Vec<String> =
                ml.split(',').map(|l| l.trim().to_string()).collect();
            licenses.sort();
            licenses.dedup();
            licenses
        })
        .unwrap_or_default();

    stats.licenses = StatisticsLicenses {
        license_scanner_findings: ordered_findings(scanner),
        license_audit_findings: AuditFindings {
            main_licenses,
            all_licenses: ordered_findings(concluded),
        },
    };
}

/// Per-file license list -> deduplicated, repaired identifiers.
fn license_set(raw: &[String]) -> Vec<String> {
    const SKIP_LIST: &[&str] = &["Dual-license"];
    let mut seen = std::collections::BTreeSet::new();
    raw.iter()
        .filter(|l| !SKIP_LIST.contains(&l.as_str()))
        .map(|l| crate::spdx::repair_license_id(l))
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

fn ordered_findings(counts: BTreeMap<String, u64>) -> Vec<LicenseFinding> {
    let mut findings: Vec<LicenseFinding> = counts
        .into_iter()
        .map(|(shortname, file_count)| LicenseFinding {
            shortname,
            file_count,
        })
        .collect();
    findings.sort_by(|a, b| b.file_count.cmp(&a.file_count).then(a.shortname.cmp(&b.shortname)));
    findings
}

/// Mark exactly one variant per group as the aggregation source: the one
/// with audited files and the smallest remaining workload.
fn set_aggregate_flags(packages: &mut [HarvestSourcePackage], group: &[usize]) {
    let min_todo = group
        .iter()
        .filter(|i| packages[**i].statistics.files.audit_total > 0)
        .map(|i| packages[*i].statistics.files.audit_to_do)
        .min();

    let mut already_set = false;
    for i in group {
        let stats = &mut packages[*i].statistics;
        stats.aggregate = false;
        if let Some(min_todo) = min_todo {
            if stats.files.audit_total > 0 && stats.files.audit_to_do == min_todo && !already_set {
                stats.aggregate = true;
                already_set = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fossy::{FossyLicenseFinding, FossySummary};

    fn pool_fixture() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::new(dir.path().join("pool"), true).unwrap();
        (dir, pool)
    }

    fn seed_fossy(pool: &Pool, id: &PackageId, cleared: u64, todo: u64) {
        pool.write_typed(FileType::Aliensrc, id, b"tar", IfExists::Overwrite)
            .unwrap();
        let model = FossyModel {
            origin: "http://localhost/repo".into(),
            metadata: serde_json::Map::new(),
            summary: FossySummary {
                id: 300,
                files_cleared: cleared,
                files_to_be_cleared: todo,
                main_license: Some("GPL-2.0-or-later,MIT".into()),
                ..FossySummary::default()
            },
            licenses: vec![
                FossyLicenseFinding {
                    file_path: "COPYING".into(),
                    agent_findings: vec!["GPL-2.0".into(), "GPL-2.0".into()],
                    conclusions: vec!["GPL-2.0-or-later".into()],
                },
                FossyLicenseFinding {
                    file_path: "folder/".into(),
                    agent_findings: vec![],
                    conclusions: vec![],
                },
            ],
        };
        pool.write_json_typed(FileType::FossyJson, id, &model, IfExists::Overwrite)
            .unwrap();
    }

    #[test]
    fn fossy_statistics_fold_into_harvest() {
        let (_dir, pool) = pool_fixture();
        let id = PackageId::with_variant("acl", "2.2.53-r0", "aaaa1111");
        seed_fossy(&pool, &id, 100, 40);

        let harvester = Harvester::new(&pool, "a4f");
        let result = harvester.harvest(&[id], None).unwrap();
        assert_eq!(result.source_packages.len(), 1);
        let stats = &result.source_packages[0].statistics;
        assert_eq!(stats.files.audit_total, 100);
        assert_eq!(stats.files.audit_to_do, 40);
        assert_eq!(stats.files.audit_done, 60);

        // duplicate per-file findings collapse, deprecated ids repaired
        let findings = &stats.licenses.license_scanner_findings;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].shortname, "GPL-2.0-only");
        assert_eq!(findings[0].file_count, 1);

        let audit = &stats.licenses.license_audit_findings;
        assert_eq!(audit.main_licenses, vec!["GPL-2.0-or-later", "MIT"]);
    }

    #[test]
    fn aggregate_flag_goes_to_least_todo_variant() {
        let (_dir, pool) = pool_fixture();
        let a = PackageId::with_variant("acl", "2.2.53-r0", "aaaa1111");
        let b = PackageId::with_variant("acl", "2.2.53-r0", "bbbb2222");
        seed_fossy(&pool, &a, 100, 40);
        seed_fossy(&pool, &b, 100, 10);

        let harvester = Harvester::new(&pool, "a4f");
        let result = harvester.harvest(&[a, b], None).unwrap();
        let flags: Vec<(String, bool)> = result
            .source_packages
            .iter()
            .map(|p| (p.variant.clone(), p.statistics.aggregate))
            .collect();
        assert_eq!(flags.iter().filter(|(_, f)| *f).count(), 1);
        assert!(flags.contains(&("bbbb2222".to_string(), true)));
    }

    #[test]
    fn missing_inputs_are_recorded_with_add_missing() {
        let (_dir, pool) = pool_fixture();
        let id = PackageId::new("zlib", "1.2.11-r0");
        pool.write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Overwrite)
            .unwrap();

        let mut harvester = Harvester::new(&pool, "a4f");
        harvester.add_missing = true;
        let result = harvester.harvest(&[id], None).unwrap();
        let missing = &result.source_packages[0].missing_input;
        assert!(missing.contains(&"tinfoilhat.json".to_string()));
        assert!(missing.contains(&"fossy.json".to_string()));
        assert!(!missing.contains(&"aliensrc".to_string()));
    }
}
