//! Delta reconciler between two file-level scan reports
//!
//! Takes the scanner's JSON output for the matched Debian source (`old`)
//! and for the alien source (`new`) and sorts every file into exactly one
//! category per side. The headline number is the similarity: the share of
//! alien files whose license/copyright semantics are preserved by the
//! Debian counterpart, which gates how much of `debian/copyright` the SPDX
//! synthesizer may reuse.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::common::ToolInfo;
use crate::models::deltacode::{
    ComparedFiles, DeltaBody, DeltaHeader, DeltaModel, DeltaStats, MovedFile,
};
use crate::spdx::{normalize_license_id, EMPTY_FILE_SHA1};
use crate::{A4fError, A4fResult};

static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("static regex"));

// ─── Normalized scan records ───────────────────────────────────────

/// License and copyright findings for one file, normalized for comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFindings {
    pub licenses: BTreeSet<String>,
    pub copyrights: BTreeSet<String>,
}

impl FileFindings {
    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty() && self.copyrights.is_empty()
    }

    /// Copyright set with year tokens masked out.
    fn masked_copyrights(&self) -> BTreeSet<String> {
        self.copyrights
            .iter()
            .map(|c| YEAR_TOKEN.replace_all(c, "YEAR").to_string())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub sha1: String,
    pub findings: FileFindings,
}

/// Per-file map extracted from a scanner JSON report, keyed by path with
/// the scan root stripped.
pub type ScanMap = BTreeMap<String, ScanRecord>;

fn normalize_copyright(statement: &str) -> String {
    statement
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce a scanner JSON report to the per-file findings the reconciler
/// compares. The report layout is the scanner's own; only `files[]` with
/// `type == "file"` entries are read, and the root folder is stripped from
/// every path.
pub fn normalize_scan(report: &Value) -> A4fResult<ScanMap> {
    let files = report
        .get("files")
        .and_then(|f| f.as_array())
        .ok_or_else(|| A4fError::CorruptInput("scan report has no files[] array".to_string()))?;

    let root = files
        .first()
        .and_then(|f| f.get("path"))
        .and_then(|p| p.as_str())
        .map(|p| p.split('/').next().unwrap_or("").to_string())
        .unwrap_or_default();

    let mut out = ScanMap::new();
    for file in files {
        if file.get("type").and_then(|t| t.as_str()) != Some("file") {
            continue;
        }
        let path = match file.get("path").and_then(|p| p.as_str()) {
            Some(p) => p,
            None => continue,
        };
        let path = path
            .strip_prefix(&format!("{root}/"))
            .unwrap_or(path)
            .to_string();

        let mut findings = FileFindings::default();
        if let Some(exprs) = file.get("license_expressions").and_then(|l| l.as_array()) {
            for expr in exprs {
                if let Some(id) = expr.as_str().and_then(normalize_license_id) {
                    findings.licenses.insert(id);
                }
            }
        }
        if let Some(licenses) = file.get("licenses").and_then(|l| l.as_array()) {
            for lic in licenses {
                let id = lic
                    .get("spdx_license_key")
                    .or_else(|| lic.get("key"))
                    .and_then(|k| k.as_str());
                if let Some(id) = id.and_then(normalize_license_id) {
                    findings.licenses.insert(id);
                }
            }
        }
        if let Some(copyrights) = file.get("copyrights").and_then(|c| c.as_array()) {
            for c in copyrights {
                let statement = c
                    .get("value")
                    .or_else(|| c.get("copyright"))
                    .and_then(|v| v.as_str());
                if let Some(statement) = statement {
                    findings.copyrights.insert(normalize_copyright(statement));
                }
            }
        }

        let sha1 = file
            .get("sha1")
            .and_then(|s| s.as_str())
            .unwrap_or(EMPTY_FILE_SHA1)
            .to_string();

        out.insert(path, ScanRecord { sha1, findings });
    }
    Ok(out)
}

// ─── Classification ────────────────────────────────────────────────

/// Compare two normalized scans and produce the delta document.
pub fn compare(
    old: &ScanMap,
    new: &ScanMap,
    old_file: &str,
    new_file: &str,
) -> DeltaModel {
    let mut body = DeltaBody::default();

    // sha1 -> new path, for move detection; empty-file sha1 excluded
    let mut new_by_sha1: BTreeMap<&str, &str> = BTreeMap::new();
    for (path, rec) in new {
        if rec.sha1 != EMPTY_FILE_SHA1 {
            new_by_sha1.insert(rec.sha1.as_str(), path.as_str());
        }
    }

    // a move pairs an old path absent from new with a new path absent from
    // old; same-path classifications always win
    let mut moved_targets: BTreeSet<&str> = BTreeSet::new();
    for (old_path, old_rec) in old {
        if new.contains_key(old_path) {
            continue;
        }
        if let Some(new_path) = new_by_sha1.get(old_rec.sha1.as_str()) {
            if !old.contains_key(*new_path) && !moved_targets.contains(*new_path) {
                body.moved_files.push(MovedFile {
                    old_path: old_path.clone(),
                    new_path: new_path.to_string(),
                });
                moved_targets.insert(*new_path);
            }
        }
    }
    let moved_sources: BTreeSet<&str> = body
        .moved_files
        .iter()
        .map(|m| m.old_path.as_str())
        .collect();

    for (path, new_rec) in new {
        match old.get(path) {
            Some(old_rec) if old_rec.sha1 == new_rec.sha1 => {
                body.same_files.push(path.clone());
            }
            Some(old_rec) => {
                let licenses_equal = old_rec.findings.licenses == new_rec.findings.licenses;
                let copyrights_equal = old_rec.findings.copyrights == new_rec.findings.copyrights;
                if old_rec.findings.is_empty() && new_rec.findings.is_empty() {
                    body.changed_files_with_no_license_and_copyright
                        .push(path.clone());
                } else if licenses_equal && copyrights_equal {
                    body.changed_files_with_same_copyright_and_license
                        .push(path.clone());
                } else if licenses_equal
                    && old_rec.findings.masked_copyrights() == new_rec.findings.masked_copyrights()
                {
                    body.changed_files_with_updated_copyright_year_only
                        .push(path.clone());
                } else {
                    body.changed_files_with_changed_copyright_or_license
                        .push(path.clone());
                }
            }
            None if moved_targets.contains(path.as_str()) => {
                // already recorded in moved_files
            }
            None => {
                if new_rec.findings.is_empty() {
                    body.new_files_with_no_license_and_copyright.push(path.clone());
                } else {
                    body.new_files_with_license_or_copyright.push(path.clone());
                }
            }
        }
    }

    for (path, old_rec) in old {
        if new.contains_key(path) || moved_sources.contains(path.as_str()) {
            continue;
        }
        if old_rec.findings.is_empty() {
            body.deleted_files_with_no_license_and_copyright.push(path.clone());
        } else {
            body.deleted_files_with_license_or_copyright.push(path.clone());
        }
    }

    let stats = DeltaStats {
        same_files: body.same_files.len(),
        moved_files: body.moved_files.len(),
        changed_files_with_no_license_and_copyright: body
            .changed_files_with_no_license_and_copyright
            .len(),
        changed_files_with_same_copyright_and_license: body
            .changed_files_with_same_copyright_and_license
            .len(),
        changed_files_with_updated_copyright_year_only: body
            .changed_files_with_updated_copyright_year_only
            .len(),
        changed_files_with_changed_copyright_or_license: body
            .changed_files_with_changed_copyright_or_license
            .len(),
        deleted_files_with_no_license_and_copyright: body
            .deleted_files_with_no_license_and_copyright
            .len(),
        deleted_files_with_license_or_copyright: body
            .deleted_files_with_license_or_copyright
            .len(),
        new_files_with_no_license_and_copyright: body
            .new_files_with_no_license_and_copyright
            .len(),
        new_files_with_license_or_copyright: body.new_files_with_license_or_copyright.len(),
        old_files_count: old.len(),
        new_files_count: new.len(),
    };

    DeltaModel {
        tool: ToolInfo::current(),
        header: DeltaHeader {
            compared_json_files: ComparedFiles {
                old_scan_out_file: old_file.to_string(),
                new_scan_out_file: new_file.to_string(),
            },
            stats,
        },
        body,
    }
}

/// Convenience entry: parse both raw scanner reports, then compare.
pub fn compare_reports(
    old_json: &[u8],
    new_json: &[u8],
    old_file: &str,
    new_file: &str,
) -> A4fResult<DeltaModel> {
    let old_value: Value = serde_json::from_slice(old_json)?;
    let new_value: Value = serde_json::from_slice(new_json)?;
    let old = normalize_scan(&old_value)?;
    let new = normalize_scan(&new_value)?;
    Ok(compare(&old, &new, old_file, new_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(sha1: &str, licenses: &[&str], copyrights: &[&str]) -> ScanRecord {
        ScanRecord {
            sha1: sha1.to_string(),
            findings: FileFindings {
                licenses: licenses.iter().map(|s| s.to_string()).collect(),
                copyrights: copyrights
                    .iter()
                    .map(|s| normalize_copyright(s))
                    .collect(),
            },
        }
    }

    fn sha(n: u32) -> String {
        format!("{n:040x}")
    }

    #[test]
    fn same_moved_changed_new_deleted() {
        let mut old = ScanMap::new();
        let mut new = ScanMap::new();

        old.insert("zlib.h".into(), rec(&sha(1), &["Zlib"], &["(c) 1995 Mark Adler"]));
        new.insert("zlib.h".into(), rec(&sha(1), &["Zlib"], &["(c) 1995 Mark Adler"]));

        // moved: same sha1, different path
        old.insert("zconf.h".into(), rec(&sha(2), &[], &[]));
        new.insert("zconf.h.in".into(), rec(&sha(2), &[], &[]));

        // changed, same findings
        old.insert("infback.c".into(), rec(&sha(3), &["Zlib"], &["(c) 1995"]));
        new.insert("infback.c".into(), rec(&sha(4), &["Zlib"], &["(c) 1995"]));

        // deleted with findings / new with findings
        old.insert("gone.c".into(), rec(&sha(5), &["MIT"], &[]));
        new.insert("fresh.c".into(), rec(&sha(6), &["MIT"], &[]));

        let delta = compare(&old, &new, "old.json", "new.json");
        let s = &delta.header.stats;
        assert_eq!(s.same_files, 1);
        assert_eq!(s.moved_files, 1);
        assert_eq!(
            delta.body.moved_files[0],
            MovedFile {
                old_path: "zconf.h".into(),
                new_path: "zconf.h.in".into()
            }
        );
        assert_eq!(s.changed_files_with_same_copyright_and_license, 1);
        assert_eq!(s.deleted_files_with_license_or_copyright, 1);
        assert_eq!(s.new_files_with_license_or_copyright, 1);

        // partition: every new file in exactly one new-side category
        assert_eq!(s.new_side_total(), s.new_files_count);
        assert_eq!(s.old_side_total(), s.old_files_count);
    }

    #[test]
    fn year_only_updates_are_their_own_category() {
        let mut old = ScanMap::new();
        let mut new = ScanMap::new();
        old.insert(
            "adler32.c".into(),
            rec(&sha(1), &["Zlib"], &["Copyright (c) 1995-2016 Mark Adler"]),
        );
        new.insert(
            "adler32.c".into(),
            rec(&sha(2), &["Zlib"], &["Copyright (c) 1995-2017 Mark Adler"]),
        );

        let delta = compare(&old, &new, "o", "n");
        assert_eq!(delta.header.stats.changed_files_with_updated_copyright_year_only, 1);

        // a holder change is not a year-only update
        let mut new2 = ScanMap::new();
        new2.insert(
            "adler32.c".into(),
            rec(&sha(2), &["Zlib"], &["Copyright (c) 1995-2017 Someone Else"]),
        );
        let delta2 = compare(&old, &new2, "o", "n");
        assert_eq!(delta2.header.stats.changed_files_with_changed_copyright_or_license, 1);
    }

    #[test]
    fn empty_file_sha1_never_moves() {
        let mut old = ScanMap::new();
        let mut new = ScanMap::new();
        old.insert("a/empty".into(), rec(EMPTY_FILE_SHA1, &[], &[]));
        new.insert("b/empty".into(), rec(EMPTY_FILE_SHA1, &[], &[]));

        let delta = compare(&old, &new, "o", "n");
        assert_eq!(delta.header.stats.moved_files, 0);
        assert_eq!(delta.header.stats.new_files_with_no_license_and_copyright, 1);
        assert_eq!(delta.header.stats.deleted_files_with_no_license_and_copyright, 1);
    }

    #[test]
    fn zlib_scenario_similarity() {
        // 108 identical files, 1 moved, 59 new with findings, 85 new without
        let mut old = ScanMap::new();
        let mut new = ScanMap::new();
        for i in 0..108u32 {
            let r = rec(&sha(1000 + i), &[], &[]);
            old.insert(format!("same{i}.c"), r.clone());
            new.insert(format!("same{i}.c"), r);
        }
        old.insert("zconf.h".into(), rec(&sha(1), &[], &[]));
        new.insert("zconf.h.in".into(), rec(&sha(1), &[], &[]));
        for i in 0..59u32 {
            new.insert(format!("lic{i}.c"), rec(&sha(2000 + i), &["Zlib"], &[]));
        }
        for i in 0..85u32 {
            new.insert(format!("plain{i}.c"), rec(&sha(3000 + i), &[], &[]));
        }

        let delta = compare(&old, &new, "o", "n");
        let s = &delta.header.stats;
        assert_eq!(s.same_files, 108);
        assert_eq!(s.moved_files, 1);
        assert_eq!(s.new_files_with_license_or_copyright, 59);
        assert_eq!(s.new_files_with_no_license_and_copyright, 85);
        assert_eq!(s.new_files_count, 253);
        let sim = s.similarity();
        assert!((sim - 109.0 / 253.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_scan_strips_root_and_reads_findings() {
        let report = serde_json::json!({
            "headers": [{"tool_name": "scancode-toolkit"}],
            "files": [
                {"path": "zlib-1.2.11", "type": "directory"},
                {
                    "path": "zlib-1.2.11/adler32.c",
                    "type": "file",
                    "sha1": "e1cb0d5c92da8e9a8c2635dfa249c341dfd00322",
                    "license_expressions": ["zlib"],
                    "licenses": [{"key": "zlib", "spdx_license_key": "Zlib"}],
                    "copyrights": [{"value": "Copyright (c) 1995-2017 Mark Adler"}]
                }
            ]
        });
        let map = normalize_scan(&report).unwrap();
        assert_eq!(map.len(), 1);
        let rec = &map["adler32.c"];
        assert!(rec.findings.licenses.contains("Zlib"));
        assert!(rec.findings.licenses.contains("zlib"));
        assert_eq!(rec.findings.copyrights.len(), 1);
    }
}
