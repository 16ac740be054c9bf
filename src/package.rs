//! Alien package model and `.aliensrc` manifest parsing
//!
//! An `.aliensrc` is an uncompressed tar whose first member is the
//! `aliensrc.json` manifest, followed by the original source files under
//! `files/`. The manifest drives everything downstream: package identity,
//! per-file checksums, and the selection of the main internal archive the
//! matchers compare against Debian.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::pool::PackageId;
use crate::version::DebianVersion;
use crate::{A4fError, A4fResult};

const MANIFEST_NAME: &str = "aliensrc.json";
const SUPPORTED_MANIFEST_VERSIONS: &[u32] = &[1, 2];

// ─── Manifest models ───────────────────────────────────────────────

/// `files_in_archive` in the manifest: a positive count for archives,
/// `false` for plain files, `0` for empty archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilesInArchive {
    Count(u64),
    Flag(bool),
}

impl FilesInArchive {
    /// Number of files when this entry is an archive.
    pub fn count(&self) -> Option<u64> {
        match self {
            FilesInArchive::Count(n) => Some(*n),
            FilesInArchive::Flag(_) => None,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, FilesInArchive::Count(_))
    }
}

impl Default for FilesInArchive {
    fn default() -> Self {
        FilesInArchive::Flag(false)
    }
}

/// One fetched source file as recorded by the build system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub sha1_cksum: String,
    #[serde(default)]
    pub git_sha1: Option<String>,
    pub src_uri: String,
    #[serde(default)]
    pub files_in_archive: FilesInArchive,
    /// Alternative intra-tar paths for duplicate names with distinct
    /// contents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePackage {
    /// Ordered aliases; the first entry is the primary name.
    pub name: Vec<String>,
    pub version: String,
    pub manager: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub files: Vec<SourceFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// The `aliensrc.json` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlienSrc {
    pub version: u32,
    pub source_package: SourcePackage,
}

// ─── Internal archive ──────────────────────────────────────────────

/// A tarball embedded in the `.aliensrc` `files/` subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalArchive {
    pub name: String,
    pub src_uri: String,
    #[serde(default)]
    pub git_sha1: Option<String>,
    #[serde(default)]
    pub sha1_cksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksums: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rootfolder: Option<String>,
}

/// Whether a bitbake-style `src_uri` asks the fetcher not to unpack.
fn has_unpack_disabled(src_uri: &str) -> bool {
    src_uri
        .split([';', '&', '?'])
        .skip(1)
        .any(|p| p == "unpack=0" || p == "unpack=false")
}

// ─── AlienPackage ──────────────────────────────────────────────────

/// A parsed `.aliensrc` package. Immutable once materialized.
pub struct AlienPackage {
    pub id: PackageId,
    pub alternative_names: Vec<String>,
    pub version: DebianVersion,
    pub manager: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub files: Vec<SourceFile>,
    pub tags: Vec<String>,
    pub manifest: AlienSrc,
    pub archive: Archive,
    pub archive_name: String,
    internal_archives: Vec<InternalArchive>,
    main_archive: Option<usize>,
    expanded: bool,
}

impl AlienPackage {
    /// Parse the manifest out of an `.aliensrc` tar. The manifest must be
    /// the first archive member.
    pub fn from_aliensrc<P: AsRef<Path>>(path: P) -> A4fResult<Self> {
        let archive = Archive::open(path.as_ref())?;
        let members = archive.list()?;
        match members.first() {
            Some(first) if first == MANIFEST_NAME => {}
            _ => {
                return Err(A4fError::CorruptInput(format!(
                    "{}: first member must be {MANIFEST_NAME}",
                    archive.path.display()
                )))
            }
        }

        let manifest_bytes = archive.read_member(MANIFEST_NAME)?;
        let manifest: AlienSrc = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            A4fError::CorruptInput(format!("{MANIFEST_NAME} schema violation: {e}"))
        })?;

        if !SUPPORTED_MANIFEST_VERSIONS.contains(&manifest.version) {
            return Err(A4fError::CorruptInput(format!(
                "{MANIFEST_NAME} version {} not supported",
                manifest.version
            )));
        }
        let sp = &manifest.source_package;
        let primary = sp
            .name
            .first()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                A4fError::CorruptInput("a package must have a valid name".to_string())
            })?
            .clone();
        if sp.version.is_empty() {
            return Err(A4fError::CorruptInput(
                "a package must have a valid version".to_string(),
            ));
        }

        let variant = sp
            .metadata
            .get("variant")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let archive_name = archive
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(AlienPackage {
            id: PackageId::with_variant(&primary, &sp.version, &variant),
            alternative_names: sp.name[1..].to_vec(),
            version: DebianVersion::parse(&sp.version),
            manager: sp.manager.clone(),
            metadata: sp.metadata.clone(),
            files: sp.files.clone(),
            tags: sp.tags.clone(),
            manifest: manifest.clone(),
            archive,
            archive_name,
            internal_archives: Vec::new(),
            main_archive: None,
            expanded: false,
        })
    }

    /// All names to try against Debian, primary first.
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![self.id.name.clone()];
        names.extend(self.alternative_names.iter().cloned());
        names
    }

    /// Scan the manifest for internal archives and pick the main one:
    /// among entries with a positive `files_in_archive`, the first whose
    /// `src_uri` does not disable unpacking wins (manifest order breaks
    /// ties). Optionally verifies all `files/` checksums and collects the
    /// main archive's per-file checksums and root folder.
    pub fn expand(
        &mut self,
        check_checksums: bool,
        with_internal_checksums: bool,
        with_rootfolder: bool,
    ) -> A4fResult<()> {
        if self.expanded {
            return Ok(());
        }
        self.expanded = true;

        if check_checksums {
            tracing::debug!("[{}] checking checksums", self.id);
            let actual = self.archive.checksums("files/")?;
            for file in &self.files {
                let paths = if file.paths.is_empty() {
                    vec![file.name.clone()]
                } else {
                    file.paths
                        .iter()
                        .map(|p| format!("{p}/{}", file.name))
                        .collect()
                };
                for path in paths {
                    match actual.get(&path) {
                        Some(sha1) if *sha1 == file.sha1_cksum => {}
                        Some(sha1) => {
                            return Err(A4fError::CorruptInput(format!(
                                "[{}] checksum mismatch for {path}: manifest {} vs archive {sha1}",
                                self.id, file.sha1_cksum
                            )))
                        }
                        None => {
                            return Err(A4fError::CorruptInput(format!(
                                "[{}] {path} listed in manifest but not in archive",
                                self.id
                            )))
                        }
                    }
                }
            }
        }

        for file in &self.files {
            if file.files_in_archive.count().unwrap_or(0) == 0 {
                continue;
            }
            self.internal_archives.push(InternalArchive {
                name: file.name.clone(),
                src_uri: file.src_uri.clone(),
                git_sha1: if file.src_uri.starts_with("git://") {
                    file.git_sha1.clone()
                } else {
                    None
                },
                sha1_cksum: file.sha1_cksum.clone(),
                checksums: None,
                rootfolder: None,
            });
            tracing::debug!("[{}] adding internal archive {}", self.id, file.name);
        }

        self.main_archive = self
            .internal_archives
            .iter()
            .position(|a| !has_unpack_disabled(&a.src_uri));

        if self.internal_archives.len() > 1 {
            match self.main_archive {
                Some(idx) => tracing::warn!(
                    "[{}] more than one internal archive, using '{}' for comparison",
                    self.id,
                    self.internal_archives[idx].name
                ),
                None => tracing::warn!(
                    "[{}] {} internal archives and no main archive detected",
                    self.id,
                    self.internal_archives.len()
                ),
            }
        }

        if let Some(idx) = self.main_archive {
            let member = format!("files/{}", self.internal_archives[idx].name);
            if with_internal_checksums {
                self.internal_archives[idx].checksums =
                    Some(self.archive.in_archive_checksums(&member)?);
            }
            if with_rootfolder {
                self.internal_archives[idx].rootfolder =
                    Some(self.archive.in_archive_rootfolder(&member)?);
            }
        }

        Ok(())
    }

    pub fn internal_archive_count(&self) -> usize {
        self.internal_archives.len()
    }

    pub fn main_internal_archive(&self) -> Option<&InternalArchive> {
        self.main_archive.map(|i| &self.internal_archives[i])
    }

    pub fn has_main_internal_archive(&self) -> bool {
        self.main_archive.is_some()
    }

    /// File counts split by provenance of the `src_uri` scheme: anything
    /// fetched over http/git is traceable upstream, `file:` URIs are not.
    pub fn provenance(&self) -> Provenance {
        let mut known = 0u64;
        let mut unknown = 0u64;
        for f in &self.files {
            let weight = f.files_in_archive.count().unwrap_or(1).max(1);
            if f.src_uri.starts_with("file:") {
                unknown += weight;
            } else if f.src_uri.starts_with("http") || f.src_uri.starts_with("git") {
                known += weight;
            }
        }
        Provenance {
            known_provenance: known,
            unknown_provenance: unknown,
            total: known + unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub known_provenance: u64,
    pub unknown_provenance: u64,
    pub total: u64,
}

/// Ingest an `.aliensrc` into the pool (the `add` step).
pub fn add_to_pool(
    pool: &crate::pool::Pool,
    src: &Path,
    force: bool,
) -> A4fResult<(AlienPackage, PathBuf)> {
    let package = AlienPackage::from_aliensrc(src)?;
    let contents = std::fs::read(src)?;
    let if_exists = if force {
        crate::pool::IfExists::Overwrite
    } else {
        crate::pool::IfExists::Fail
    };
    let dest = pool.write_typed(
        crate::pool::FileType::Aliensrc,
        &package.id,
        &contents,
        if_exists,
    )?;
    tracing::info!("[{}] added {} to pool", package.id, package.archive_name);
    Ok((package, dest))
}

/// Test fixtures shared with the SPDX synthesizer tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::archive::testutil::write_tar;

    pub fn manifest_json(files: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec_pretty(&serde_json::json!({
            "version": 1,
            "source_package": {
                "name": ["zlib", "libz"],
                "version": "1.2.11-r0",
                "manager": "bitbake",
                "metadata": {"variant": "af1fc0fa"},
                "files": files,
                "tags": ["distro/oniro"]
            }
        }))
        .unwrap()
    }

    pub fn sha1_of(data: &[u8]) -> String {
        use sha1::{Digest, Sha1};
        let mut h = Sha1::new();
        h.update(data);
        hex::encode(h.finalize())
    }

    /// An `.aliensrc` with one internal tarball and one plain patch file.
    pub fn write_aliensrc(dest: &Path, inner_tar: &[u8]) {
        let manifest = manifest_json(serde_json::json!([
            {
                "name": "zlib-1.2.11.tar",
                "sha1_cksum": sha1_of(inner_tar),
                "git_sha1": null,
                "src_uri": "https://zlib.net/zlib-1.2.11.tar.xz;name=zlib",
                "files_in_archive": 253
            },
            {
                "name": "ldflags.patch",
                "sha1_cksum": sha1_of(b"patch"),
                "git_sha1": null,
                "src_uri": "file://ldflags.patch",
                "files_in_archive": false
            }
        ]));
        write_tar(
            dest,
            &[
                ("aliensrc.json", manifest.as_slice()),
                ("files/zlib-1.2.11.tar", inner_tar),
                ("files/ldflags.patch", b"patch"),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{manifest_json, write_aliensrc};
    use super::*;
    use crate::archive::testutil::write_tar;

    fn inner_tar() -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("inner.tar");
        write_tar(
            &p,
            &[
                ("zlib-1.2.11/adler32.c", b"int adler;"),
                ("zlib-1.2.11/zlib.h", b"#define ZLIB_H"),
            ],
        );
        std::fs::read(&p).unwrap()
    }

    #[test]
    fn parses_manifest_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zlib-1.2.11-r0.aliensrc");
        write_aliensrc(&path, &inner_tar());

        let pkg = AlienPackage::from_aliensrc(&path).unwrap();
        assert_eq!(pkg.id.name, "zlib");
        assert_eq!(pkg.id.version, "1.2.11-r0");
        assert_eq!(pkg.id.variant, "af1fc0fa");
        assert_eq!(pkg.alternative_names, vec!["libz"]);
        assert_eq!(pkg.manager, "bitbake");
        assert_eq!(pkg.tags, vec!["distro/oniro"]);
    }

    #[test]
    fn manifest_must_be_first_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.aliensrc");
        write_tar(
            &path,
            &[("files/x", b"x"), ("aliensrc.json", b"{}")],
        );
        assert!(matches!(
            AlienPackage::from_aliensrc(&path),
            Err(A4fError::CorruptInput(_))
        ));
    }

    #[test]
    fn main_archive_selection_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zlib-1.2.11-r0.aliensrc");
        write_aliensrc(&path, &inner_tar());

        let mut pkg = AlienPackage::from_aliensrc(&path).unwrap();
        pkg.expand(true, true, true).unwrap();

        assert_eq!(pkg.internal_archive_count(), 1);
        let main = pkg.main_internal_archive().unwrap();
        assert_eq!(main.name, "zlib-1.2.11.tar");
        assert_eq!(main.rootfolder.as_deref(), Some("zlib-1.2.11"));
        let sums = main.checksums.as_ref().unwrap();
        assert!(sums.contains_key("adler32.c"));
        assert!(sums.contains_key("zlib.h"));
    }

    #[test]
    fn unpack_disabled_archives_are_skipped() {
        assert!(has_unpack_disabled("https://x/y.tar.gz;name=a;unpack=0"));
        assert!(!has_unpack_disabled("https://x/y.tar.gz;name=a"));
        assert!(!has_unpack_disabled("https://x/unpack=0.tar.gz"));
    }

    #[test]
    fn checksum_mismatch_is_corrupt_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zlib-1.2.11-r0.aliensrc");
        let manifest = manifest_json(serde_json::json!([
            {
                "name": "data.bin",
                "sha1_cksum": "0000000000000000000000000000000000000000",
                "git_sha1": null,
                "src_uri": "https://example.org/data.bin",
                "files_in_archive": false
            }
        ]));
        write_tar(
            &path,
            &[("aliensrc.json", manifest.as_slice()), ("files/data.bin", b"data")],
        );
        let mut pkg = AlienPackage::from_aliensrc(&path).unwrap();
        assert!(matches!(
            pkg.expand(true, false, false),
            Err(A4fError::CorruptInput(_))
        ));
    }

    #[test]
    fn manifest_roundtrip_is_schema_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zlib-1.2.11-r0.aliensrc");
        write_aliensrc(&path, &inner_tar());

        let pkg = AlienPackage::from_aliensrc(&path).unwrap();
        let encoded = serde_json::to_value(&pkg.manifest).unwrap();
        let decoded: AlienSrc = serde_json::from_value(encoded.clone()).unwrap();
        assert_eq!(encoded, serde_json::to_value(&decoded).unwrap());
    }

    #[test]
    fn provenance_counts_by_uri_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zlib-1.2.11-r0.aliensrc");
        write_aliensrc(&path, &inner_tar());
        let pkg = AlienPackage::from_aliensrc(&path).unwrap();
        let prov = pkg.provenance();
        assert_eq!(prov.known_provenance, 253);
        assert_eq!(prov.unknown_provenance, 1);
        assert_eq!(prov.total, 254);
    }
}
