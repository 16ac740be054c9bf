//! Debian matching
//!
//! Two interchangeable matchers locate the Debian source package that
//! semantically corresponds to an alien package: [`current::AlienMatcher`]
//! queries the live Debian source index, [`snapshot::SnapMatcher`] goes
//! through the historical snapshot archive and can resolve the alien's
//! main archive by file SHA-1. Both share the name/version scoring and the
//! source-download plumbing in this module.

pub mod current;
pub mod snapshot;

use std::path::PathBuf;

use crate::calc;
use crate::deb822::{field, parse_checksum_lines, parse_deb822};
use crate::http::HttpClient;
use crate::models::matcher::VersionCandidate;
use crate::package::AlienPackage;
use crate::pool::{IfExists, Pool, Relationship};
use crate::version::DebianVersion;
use crate::{A4fError, A4fResult};

/// Debian source control formats the pipeline understands.
pub const SUPPORTED_DSC_FORMATS: &[&str] = &["1.0", "3.0 (quilt)", "3.0 (native)"];

/// Pool-relative references to the two downloaded Debian source artifacts.
#[derive(Debug, Clone, Default)]
pub struct DebianSourceRefs {
    pub debsrc_orig: Option<String>,
    pub debsrc_debian: Option<String>,
    pub dsc_format: String,
}

/// Pick the best-scoring Debian source name for the alien's names.
/// Ties break toward the shorter name, then lexicographically.
pub fn best_package_name<'a, I>(names: &[String], candidates: I) -> Option<(String, u32)>
where
    I: Iterator<Item = &'a str>,
{
    let mut best: Option<(String, u32)> = None;
    for candidate in candidates {
        let score = calc::best_name_score(names, candidate);
        if score == 0 {
            continue;
        }
        best = match best {
            None => Some((candidate.to_string(), score)),
            Some((bname, bscore)) => {
                let better = score > bscore
                    || (score == bscore
                        && (candidate.len() < bname.len()
                            || (candidate.len() == bname.len() && *candidate < *bname)));
                if better {
                    Some((candidate.to_string(), score))
                } else {
                    Some((bname, bscore))
                }
            }
        };
    }
    best
}

/// Outcome of version selection against a candidate list.
pub struct VersionSelection {
    pub version: DebianVersion,
    pub distance: u64,
    pub version_score: u32,
    pub candidates: Vec<VersionCandidate>,
}

/// Score the alien version against all available Debian versions of a
/// source package. The alien's own version rides along in the candidate
/// list, flagged `is_aliensrc`.
pub fn select_version(alien: &DebianVersion, versions: &[String]) -> Option<VersionSelection> {
    let mut scored: Vec<(DebianVersion, u64)> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for v in versions {
        if !seen.insert(v.clone()) {
            continue;
        }
        let parsed = DebianVersion::parse(v);
        let distance = alien.distance(&parsed);
        scored.push((parsed, distance));
    }

    let mut candidates: Vec<VersionCandidate> = vec![VersionCandidate {
        version: alien.original.clone(),
        distance: 0,
        is_aliensrc: true,
    }];
    candidates.extend(scored.iter().map(|(v, d)| VersionCandidate {
        version: v.original.clone(),
        distance: *d,
        is_aliensrc: false,
    }));

    let winner = calc::select_version_candidate(&scored)?;
    let (version, distance) = scored[winner].clone();
    Some(VersionSelection {
        version_score: calc::version_score(distance),
        version,
        distance,
        candidates,
    })
}

/// Version string as it appears in Debian file names (no epoch).
pub fn version_without_epoch(version: &str) -> &str {
    match version.split_once(':') {
        Some((epoch, rest)) if epoch.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => version,
    }
}

/// Download a file into `debian/<name>/<version>/` unless cached.
pub fn download_to_debian(
    pool: &Pool,
    http: &HttpClient,
    name: &str,
    version: &str,
    filename: &str,
    url: &str,
) -> A4fResult<PathBuf> {
    let rel = PathBuf::from(Relationship::Debian.as_str())
        .join(name)
        .join(version)
        .join(filename);
    if pool.is_cached(&rel) {
        tracing::debug!("[{name}-{version}] {filename} found in debian cache pool");
        return Ok(rel);
    }
    tracing::debug!("[{name}-{version}] downloading {url}");
    let bytes = http.get_bytes(url)?;
    pool.write(&rel, &bytes, IfExists::Overwrite)?;
    Ok(rel)
}

fn sha1_of_pool_file(pool: &Pool, rel: &std::path::Path) -> A4fResult<String> {
    use sha1::{Digest, Sha1};
    let bytes = pool.read(rel)?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Sort downloaded source files into the orig/debian slots mandated by
/// the `.dsc` `Format:` field.
pub fn classify_sources(
    dsc_format: &str,
    files: &[(String, PathBuf)],
) -> A4fResult<DebianSourceRefs> {
    if !SUPPORTED_DSC_FORMATS.contains(&dsc_format) {
        return Err(A4fError::CorruptInput(format!(
            "unknown Debian source control format: {dsc_format}"
        )));
    }
    let mut refs = DebianSourceRefs {
        dsc_format: dsc_format.to_string(),
        ..DebianSourceRefs::default()
    };
    for (filename, rel) in files {
        if filename.ends_with(".dsc") {
            continue;
        }
        let rel_str = rel.to_string_lossy().to_string();
        match dsc_format {
            "1.0" => {
                if filename.contains(".orig.") {
                    refs.debsrc_orig = Some(rel_str);
                } else {
                    // archives without a marker in the name come from Debian
                    refs.debsrc_debian = Some(rel_str);
                }
            }
            "3.0 (quilt)" => {
                if filename.contains(".debian.") {
                    refs.debsrc_debian = Some(rel_str);
                } else if filename.contains(".orig.") {
                    refs.debsrc_orig = Some(rel_str);
                }
            }
            "3.0 (native)" => {
                refs.debsrc_orig = Some(rel_str);
            }
            _ => unreachable!(),
        }
    }
    Ok(refs)
}

/// Fetch the `.dsc` plus every source file it names, verify SHA-1s, and
/// classify the results. `url_for` maps a bare filename to its download
/// URL.
pub fn fetch_debian_sources<F>(
    pool: &Pool,
    http: &HttpClient,
    name: &str,
    version: &str,
    url_for: F,
) -> A4fResult<DebianSourceRefs>
where
    F: Fn(&str) -> String,
{
    let bare_version = version_without_epoch(version);
    let dsc_name = format!("{name}_{bare_version}.dsc");
    let dsc_rel = download_to_debian(pool, http, name, version, &dsc_name, &url_for(&dsc_name))?;
    let dsc_text = pool.read_text(&dsc_rel)?;
    let stanzas = parse_deb822(&dsc_text);
    let dsc = stanzas
        .first()
        .ok_or_else(|| A4fError::CorruptInput(format!("{dsc_name} is empty")))?;

    let dsc_format = field(dsc, "Format")
        .ok_or_else(|| A4fError::CorruptInput(format!("{dsc_name} carries no Format field")))?
        .to_string();

    let checksums = field(dsc, "Checksums-Sha1")
        .map(parse_checksum_lines)
        .unwrap_or_default();
    let mut downloaded: Vec<(String, PathBuf)> = Vec::new();
    for (sha1, _size, filename) in &checksums {
        let rel = download_to_debian(pool, http, name, version, filename, &url_for(filename))?;
        let actual = sha1_of_pool_file(pool, &rel)?;
        if actual != *sha1 {
            return Err(A4fError::CorruptInput(format!(
                "checksum mismatch for {}: expected {sha1}, got {actual}",
                rel.display()
            )));
        }
        downloaded.push((filename.clone(), rel));
    }

    classify_sources(&dsc_format, &downloaded)
}

/// Shared early checks: an alien package is matchable only when it has a
/// main internal archive and is not on the exclusion list.
pub fn check_matchable(package: &AlienPackage) -> Result<(), String> {
    if calc::EXCLUSIONS.contains(&package.id.name.as_str()) {
        return Err(format!(
            "{} is known to have no Debian counterpart",
            package.id.name
        ));
    }
    match package.internal_archive_count() {
        0 => Err("no internal archive".to_string()),
        n if n > 1 && !package.has_main_internal_archive() => {
            Err(format!("{n} internal archives and no main archive"))
        }
        _ if !package.has_main_internal_archive() => {
            Err("no main internal archive".to_string())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_name_ties_break_toward_shorter_then_lexicographic() {
        let names = vec!["zlib".to_string()];
        let got = best_package_name(
            &names,
            ["zlib-ng", "zlib"].into_iter(),
        );
        assert_eq!(got, Some(("zlib".to_string(), 100)));

        // the alias table pins tcl to tcl8.6, beating the fuzzy ladder
        let names = vec!["tcl".to_string()];
        let got = best_package_name(&names, ["tcl8.7", "tcl8.6"].into_iter());
        assert_eq!(got.unwrap().0, "tcl8.6");

        // equal score and length: lexicographic
        let names = vec!["foo".to_string()];
        let got = best_package_name(&names, ["foob", "fooa"].into_iter());
        assert_eq!(got.unwrap().0, "fooa");
    }

    #[test]
    fn version_selection_zlib_scenario() {
        let alien = DebianVersion::parse("1.2.11-r0");
        let versions = vec![
            "1.2.11.dfsg-1".to_string(),
            "1.2.11.dfsg-2".to_string(),
            "1.2.8.dfsg-5".to_string(),
        ];
        let sel = select_version(&alien, &versions).unwrap();
        assert_eq!(sel.version.original, "1.2.11.dfsg-1");
        assert_eq!(sel.distance, 10);
        assert_eq!(sel.version_score, 99);
        // candidate list carries the alien itself plus all debian versions
        assert_eq!(sel.candidates.len(), 4);
        assert!(sel.candidates[0].is_aliensrc);
    }

    #[test]
    fn version_selection_rejects_far_candidates() {
        let alien = DebianVersion::parse("1.0");
        let versions = vec!["9.9".to_string()];
        assert!(select_version(&alien, &versions).is_none());
    }

    #[test]
    fn classify_by_dsc_format() {
        let files = vec![
            (
                "zlib_1.2.11.dfsg.orig.tar.gz".to_string(),
                PathBuf::from("debian/zlib/1.2.11.dfsg-1/zlib_1.2.11.dfsg.orig.tar.gz"),
            ),
            (
                "zlib_1.2.11.dfsg-1.debian.tar.xz".to_string(),
                PathBuf::from("debian/zlib/1.2.11.dfsg-1/zlib_1.2.11.dfsg-1.debian.tar.xz"),
            ),
        ];
        let refs = classify_sources("3.0 (quilt)", &files).unwrap();
        assert!(refs.debsrc_orig.unwrap().contains(".orig."));
        assert!(refs.debsrc_debian.unwrap().contains(".debian."));

        let native = vec![(
            "pkg_1.0.tar.xz".to_string(),
            PathBuf::from("debian/pkg/1.0/pkg_1.0.tar.xz"),
        )];
        let refs = classify_sources("3.0 (native)", &native).unwrap();
        assert!(refs.debsrc_orig.is_some());
        assert!(refs.debsrc_debian.is_none());

        assert!(classify_sources("2.0 (made-up)", &[]).is_err());
    }

    #[test]
    fn epoch_is_stripped_from_filenames() {
        assert_eq!(version_without_epoch("1:1.2.11.dfsg-1"), "1.2.11.dfsg-1");
        assert_eq!(version_without_epoch("1.2.11-r0"), "1.2.11-r0");
    }
}
