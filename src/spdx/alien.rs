//! Alien SPDX synthesis
//!
//! Weaves the scanner's SPDX twin with the Debian-derived SPDX, gated by
//! the delta similarity. Files whose license/copyright semantics survived
//! the Debian-to-alien delta inherit the community-reviewed
//! `LicenseConcluded`; everything else keeps the scanner findings as
//! LicenseInfoInFile with no conclusion. Package-level Debian metadata is
//! only applied near full similarity.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::deltacode::DeltaModel;
use crate::package::AlienPackage;
use crate::spdx::{file_spdx_id, LicenseInfo, SpdxDocument, SpdxFile, EMPTY_FILE_SHA1};
use crate::{A4fError, A4fResult};

/// Similarity gates for reusing Debian conclusions.
pub const MIN_ACCEPTABLE_SIMILARITY: f64 = 0.30;
pub const NEARLY_FULL_SIMILARITY: f64 = 0.92;
pub const FULL_SIMILARITY: f64 = 1.0;

/// Stamp alien package and document metadata onto a document that started
/// out as somebody else's (the scanner's or Debian's).
fn set_package_and_document_metadata(doc: &mut SpdxDocument, package: &AlienPackage) {
    let id = &package.id;
    doc.package.name = id.name.clone();
    doc.package.version = Some(id.version.clone());
    doc.package.file_name = Some(package.archive_name.clone());
    doc.package.spdx_id = format!("SPDXRef-{}-{}", id.name, id.version);
    doc.package.download_location = package
        .main_internal_archive()
        .map(|a| a.src_uri.clone());
    doc.package.comment = package
        .metadata
        .get("comment")
        .and_then(|c| c.as_str())
        .map(str::to_string);
    doc.package.verification_code = doc.package.calc_verification_code();
    doc.name = format!("{}-{}", id.name, id.version);
    doc.namespace = format!(
        "http://spdx.org/spdxdocs/{}-{}-{}",
        id.name,
        id.version,
        uuid::Uuid::new_v4()
    );
    doc.creators = vec![format!(
        "Tool: {}-{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )];
    doc.created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
}

/// Scanner-only output: every per-file assertion is downgraded to
/// LicenseInfoInFile, nothing is concluded.
pub fn scancode_only(mut scancode_spdx: SpdxDocument, package: &AlienPackage) -> SpdxDocument {
    for file in &mut scancode_spdx.package.files {
        file.license_concluded = LicenseInfo::NoAssertion;
        if file.checksum_sha1.is_empty() {
            file.checksum_sha1 = EMPTY_FILE_SHA1.to_string();
        }
    }
    scancode_spdx.package.license_concluded = LicenseInfo::NoAssertion;
    scancode_spdx.package.license_declared = LicenseInfo::NoAssertion;
    scancode_spdx.package.copyright_text = "NOASSERTION".to_string();
    set_package_and_document_metadata(&mut scancode_spdx, package);
    scancode_spdx
}

/// Synthesize the alien SPDX from scanner output, the Debian SPDX, and the
/// delta classification. `apply_debian_full` forces the full-similarity
/// branch regardless of the measured similarity.
pub fn synthesize(
    scancode_spdx: SpdxDocument,
    debian_spdx: SpdxDocument,
    delta: &DeltaModel,
    package: &AlienPackage,
    apply_debian_full: bool,
) -> A4fResult<SpdxDocument> {
    let id = &package.id;
    let similarity = if apply_debian_full {
        FULL_SIMILARITY
    } else {
        delta.header.stats.similarity()
    };

    if similarity < MIN_ACCEPTABLE_SIMILARITY {
        tracing::warn!(
            "[{}] similarity with debian package {} is too low ({:.0}%), using scanner output only",
            id,
            debian_spdx.package.name,
            similarity * 100.0
        );
        return Ok(scancode_only(scancode_spdx, package));
    }

    let alien_checksums = package
        .main_internal_archive()
        .and_then(|a| a.checksums.clone())
        .ok_or_else(|| {
            A4fError::NotFound(format!(
                "[{id}] no main internal archive checksums, cannot synthesize"
            ))
        })?;

    // alien paths allowed to inherit the Debian conclusion, mapped to the
    // Debian-side path they correspond to (identity except for moves)
    let body = &delta.body;
    let mut inherit: BTreeMap<String, String> = BTreeMap::new();
    for path in body
        .same_files
        .iter()
        .chain(&body.changed_files_with_no_license_and_copyright)
        .chain(&body.changed_files_with_same_copyright_and_license)
        .chain(&body.changed_files_with_updated_copyright_year_only)
    {
        inherit.insert(path.clone(), path.clone());
    }
    for moved in &body.moved_files {
        inherit.insert(moved.new_path.clone(), moved.old_path.clone());
    }
    let year_only: BTreeSet<&str> = body
        .changed_files_with_updated_copyright_year_only
        .iter()
        .map(String::as_str)
        .collect();

    let deb_files: BTreeMap<String, &SpdxFile> = debian_spdx
        .package
        .files
        .iter()
        .map(|f| (f.bare_name().to_string(), f))
        .collect();
    let scan_files: BTreeMap<String, &SpdxFile> = scancode_spdx
        .package
        .files
        .iter()
        .map(|f| (f.bare_name().to_string(), f))
        .collect();

    let mut alien_files: Vec<SpdxFile> = Vec::new();
    for (path, sha1) in &alien_checksums {
        let name = format!("./{path}");
        let scan_file = scan_files.get(path.as_str());
        let deb_file = inherit
            .get(path.as_str())
            .and_then(|deb_path| deb_files.get(deb_path.as_str()));

        match deb_file {
            Some(deb_file) => {
                let mut file = (*deb_file).clone();
                file.name = name.clone();
                file.spdx_id = file_spdx_id(&name);
                file.checksum_sha1 = sha1.clone();
                if let Some(scan_file) = scan_file {
                    if year_only.contains(path.as_str()) {
                        // the year moved on, the scanner saw the truth
                        file.copyright_text = scan_file.copyright_text.clone();
                    }
                    file.license_info_in_file = scan_file.license_info_in_file.clone();
                    if !scan_file.license_info_in_file.iter().any(|l| l.is_assertion()) {
                        // no statements in the file itself: leave nothing
                        // concluded, matching the clearing server's style
                        file.license_concluded = LicenseInfo::NoAssertion;
                    }
                }
                alien_files.push(file);
            }
            None => match scan_file {
                Some(scan_file) => {
                    let mut file = (*scan_file).clone();
                    file.name = name.clone();
                    file.spdx_id = file_spdx_id(&name);
                    file.checksum_sha1 = sha1.clone();
                    file.license_concluded = LicenseInfo::NoAssertion;
                    alien_files.push(file);
                }
                None => {
                    alien_files.push(SpdxFile {
                        name: name.clone(),
                        spdx_id: file_spdx_id(&name),
                        checksum_sha1: sha1.clone(),
                        license_concluded: LicenseInfo::NoAssertion,
                        license_info_in_file: vec![LicenseInfo::NoAssertion],
                        copyright_text: "NOASSERTION".to_string(),
                        comment: None,
                    });
                }
            },
        }
    }

    // the Debian document is the chassis: extracted licenses and package
    // fields carry over and are then masked down by the similarity tier
    let mut doc = debian_spdx;
    doc.package.files = alien_files;

    if similarity < NEARLY_FULL_SIMILARITY {
        tracing::info!(
            "[{}] similarity {:.2} below {:.2}, not applying debian package license",
            id,
            similarity,
            NEARLY_FULL_SIMILARITY
        );
        doc.package.license_declared = LicenseInfo::NoAssertion;
        doc.package.license_concluded = LicenseInfo::NoAssertion;
    }
    if similarity < FULL_SIMILARITY {
        tracing::info!(
            "[{}] similarity {:.2} below 1.00, not applying debian package copyright metadata",
            id,
            similarity
        );
        doc.package.license_info_from_files = vec![LicenseInfo::NoAssertion];
        doc.package.copyright_text = "NOASSERTION".to_string();
        doc.package.supplier = None;
        doc.package.originator = None;
    }

    set_package_and_document_metadata(&mut doc, package);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::ToolInfo;
    use crate::models::deltacode::{
        ComparedFiles, DeltaBody, DeltaHeader, DeltaModel, DeltaStats,
    };
    use crate::spdx::SpdxPackage;

    fn delta_with_similarity(same: usize, new_total: usize) -> DeltaModel {
        let body = DeltaBody {
            same_files: (0..same).map(|i| format!("f{i}.c")).collect(),
            ..DeltaBody::default()
        };
        DeltaModel {
            tool: ToolInfo::current(),
            header: DeltaHeader {
                compared_json_files: ComparedFiles {
                    old_scan_out_file: "o".into(),
                    new_scan_out_file: "n".into(),
                },
                stats: DeltaStats {
                    same_files: same,
                    new_files_with_no_license_and_copyright: new_total - same,
                    old_files_count: same,
                    new_files_count: new_total,
                    ..DeltaStats::default()
                },
            },
            body,
        }
    }

    fn doc_with_files(names: &[&str], concluded: &str) -> SpdxDocument {
        let mut doc = SpdxDocument::new("fixture");
        doc.package = SpdxPackage {
            name: "zlib".into(),
            spdx_id: "SPDXRef-zlib".into(),
            license_declared: LicenseInfo::Expr("Zlib".into()),
            license_concluded: LicenseInfo::Expr("Zlib".into()),
            copyright_text: "1995-2017 Mark Adler".into(),
            supplier: Some("Organization: Debian".into()),
            ..SpdxPackage::default()
        };
        for name in names {
            doc.package.files.push(SpdxFile {
                name: format!("./{name}"),
                spdx_id: file_spdx_id(name),
                checksum_sha1: "1111111111111111111111111111111111111111".into(),
                license_concluded: LicenseInfo::Expr(concluded.into()),
                license_info_in_file: vec![LicenseInfo::Expr(concluded.into())],
                copyright_text: "(c) upstream".into(),
                comment: None,
            });
        }
        doc
    }

    fn alien_package(dir: &std::path::Path, files: &[&str]) -> AlienPackage {
        use crate::archive::testutil::write_tar;
        let inner = dir.join("inner.tar");
        let members: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|f| (format!("pkg-1.0/{f}"), format!("content of {f}").into_bytes()))
            .collect();
        let refs: Vec<(&str, &[u8])> = members
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        write_tar(&inner, &refs);
        let inner_bytes = std::fs::read(&inner).unwrap();

        let aliensrc = dir.join("zlib-1.2.11-r0.aliensrc");
        crate::package::testutil::write_aliensrc(&aliensrc, &inner_bytes);
        let mut pkg = AlienPackage::from_aliensrc(&aliensrc).unwrap();
        pkg.expand(false, true, true).unwrap();
        pkg
    }

    #[test]
    fn below_threshold_yields_scanner_only_output() {
        let dir = tempfile::tempdir().unwrap();
        let package = alien_package(dir.path(), &["f0.c"]);
        // similarity 0.2999...
        let delta = delta_with_similarity(2999, 10000);
        let scancode = doc_with_files(&["f0.c"], "MIT");
        let debian = doc_with_files(&["f0.c"], "Zlib");

        let out = synthesize(scancode, debian, &delta, &package, false).unwrap();
        assert!(out
            .package
            .files
            .iter()
            .all(|f| f.license_concluded == LicenseInfo::NoAssertion));
    }

    #[test]
    fn at_threshold_debian_conclusions_apply() {
        let dir = tempfile::tempdir().unwrap();
        let package = alien_package(dir.path(), &["f0.c"]);
        // similarity exactly 0.30
        let delta = delta_with_similarity(3, 10);
        let scancode = doc_with_files(&["f0.c"], "MIT");
        let debian = doc_with_files(&["f0.c"], "Zlib");

        let out = synthesize(scancode, debian, &delta, &package, false).unwrap();
        let f0 = out
            .package
            .files
            .iter()
            .find(|f| f.bare_name() == "f0.c")
            .unwrap();
        assert_eq!(f0.license_concluded, LicenseInfo::Expr("Zlib".into()));
        // mid tier: no package-level debian metadata
        assert_eq!(out.package.license_declared, LicenseInfo::NoAssertion);
        assert_eq!(out.package.copyright_text, "NOASSERTION");
    }

    #[test]
    fn files_outside_the_copy_set_keep_scanner_findings_only() {
        let dir = tempfile::tempdir().unwrap();
        let package = alien_package(dir.path(), &["f0.c", "other.c"]);
        let delta = delta_with_similarity(5, 10); // f0..f4 inherit
        let scancode = doc_with_files(&["f0.c", "other.c"], "MIT");
        let debian = doc_with_files(&["f0.c"], "Zlib");

        let out = synthesize(scancode, debian, &delta, &package, false).unwrap();
        let other = out
            .package
            .files
            .iter()
            .find(|f| f.bare_name() == "other.c")
            .unwrap();
        assert_eq!(other.license_concluded, LicenseInfo::NoAssertion);
        assert_eq!(
            other.license_info_in_file,
            vec![LicenseInfo::Expr("MIT".into())]
        );
    }

    #[test]
    fn apply_debian_full_forces_top_tier() {
        let dir = tempfile::tempdir().unwrap();
        let package = alien_package(dir.path(), &["f0.c"]);
        let delta = delta_with_similarity(1, 10); // similarity 0.1
        let scancode = doc_with_files(&["f0.c"], "MIT");
        let debian = doc_with_files(&["f0.c"], "Zlib");

        let out = synthesize(scancode, debian, &delta, &package, true).unwrap();
        assert_eq!(out.package.license_declared, LicenseInfo::Expr("Zlib".into()));
        assert_eq!(out.package.copyright_text, "1995-2017 Mark Adler");
        assert_eq!(out.package.supplier.as_deref(), Some("Organization: Debian"));
    }

    #[test]
    fn checksums_come_from_the_alien_archive() {
        let dir = tempfile::tempdir().unwrap();
        let package = alien_package(dir.path(), &["f0.c"]);
        let delta = delta_with_similarity(3, 10);
        let scancode = doc_with_files(&["f0.c"], "MIT");
        let debian = doc_with_files(&["f0.c"], "Zlib");

        let expected = package
            .main_internal_archive()
            .unwrap()
            .checksums
            .as_ref()
            .unwrap()["f0.c"]
            .clone();
        let out = synthesize(scancode, debian, &delta, &package, false).unwrap();
        let f0 = out
            .package
            .files
            .iter()
            .find(|f| f.bare_name() == "f0.c")
            .unwrap();
        assert_eq!(f0.checksum_sha1, expected);
    }
}
