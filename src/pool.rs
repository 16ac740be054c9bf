//! Content-addressable artifact pool
//!
//! Every artifact the pipeline produces lives under a logical path
//! `<relationship>/<name>/<version>/<basename>.<ext>` where the extension is
//! drawn from the closed [`FileType`] set. The pool enforces the cache
//! policy (existing non-empty artifacts short-circuit derivation unless the
//! command runs with `--ignore-cache`) and the prerequisite invariant:
//! writing a derived filetype for an identity fails when the identity's
//! `.aliensrc` is not in the pool.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::archive::Archive;
use crate::{A4fError, A4fResult};

// ─── Identity ──────────────────────────────────────────────────────

/// Primary key of everything in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    /// Short digest distinguishing builds with equal (name, version) but
    /// different bit content.
    #[serde(default)]
    pub variant: String,
}

impl PackageId {
    pub fn new(name: &str, version: &str) -> Self {
        PackageId {
            name: name.to_string(),
            version: version.to_string(),
            variant: String::new(),
        }
    }

    pub fn with_variant(name: &str, version: &str, variant: &str) -> Self {
        PackageId {
            name: name.to_string(),
            version: version.to_string(),
            variant: variant.to_string(),
        }
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}-{}", self.name, self.version)
        } else {
            write!(f, "{}-{}-{}", self.name, self.version, self.variant)
        }
    }
}

// ─── Path scheme ───────────────────────────────────────────────────

/// Top-level pool area an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Userland,
    Debian,
    Stats,
    Session,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Userland => "userland",
            Relationship::Debian => "debian",
            Relationship::Stats => "stats",
            Relationship::Session => "session",
        }
    }
}

/// Closed set of artifact types the pool knows how to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Aliensrc,
    Tinfoilhat,
    Alienmatcher,
    Snapmatch,
    ScancodeJson,
    ScancodeSpdx,
    Deltacode,
    DebianSpdx,
    DebianCopyrightRaw,
    AlienSpdx,
    FossyJson,
    FinalSpdx,
    Harvest,
    CveHarvest,
    SessionJson,
}

impl FileType {
    pub fn ext(&self) -> &'static str {
        match self {
            FileType::Aliensrc => "aliensrc",
            FileType::Tinfoilhat => "tinfoilhat.json",
            FileType::Alienmatcher => "alienmatcher.json",
            FileType::Snapmatch => "snapmatch.json",
            FileType::ScancodeJson => "scancode.json",
            FileType::ScancodeSpdx => "scancode.spdx",
            FileType::Deltacode => "deltacode.json",
            FileType::DebianSpdx => "debian.spdx",
            FileType::DebianCopyrightRaw => "debian_copyright",
            FileType::AlienSpdx => "alien.spdx",
            FileType::FossyJson => "fossy.json",
            FileType::FinalSpdx => "final.spdx",
            FileType::Harvest => "harvest.json",
            FileType::CveHarvest => "cve_harvest.json",
            FileType::SessionJson => "session.json",
        }
    }

    pub fn from_ext(ext: &str) -> Option<FileType> {
        ALL_FILETYPES.iter().copied().find(|ft| ft.ext() == ext)
    }

    /// Whether the variant participates in the filename.
    fn has_variant(&self) -> bool {
        matches!(
            self,
            FileType::Aliensrc | FileType::Tinfoilhat | FileType::FossyJson
        )
    }

    /// Default pool area for this type. Scancode artifacts may live in
    /// either userland or debian; `Pool::path_typed_in` overrides.
    fn relationship(&self) -> Relationship {
        match self {
            FileType::DebianSpdx | FileType::DebianCopyrightRaw => Relationship::Debian,
            FileType::Harvest | FileType::CveHarvest => Relationship::Stats,
            FileType::SessionJson => Relationship::Session,
            _ => Relationship::Userland,
        }
    }

    /// Filetypes that must already exist for the identity before this one
    /// may be written into userland.
    fn prerequisites(&self) -> &'static [FileType] {
        match self {
            FileType::Alienmatcher | FileType::Snapmatch => &[FileType::Aliensrc],
            FileType::Deltacode => &[FileType::Aliensrc, FileType::ScancodeJson],
            FileType::AlienSpdx => &[FileType::Aliensrc, FileType::ScancodeSpdx],
            FileType::FossyJson => &[FileType::Aliensrc],
            FileType::FinalSpdx => &[FileType::Aliensrc],
            _ => &[],
        }
    }
}

pub const ALL_FILETYPES: &[FileType] = &[
    FileType::Aliensrc,
    FileType::Tinfoilhat,
    FileType::Alienmatcher,
    FileType::Snapmatch,
    FileType::ScancodeJson,
    FileType::ScancodeSpdx,
    FileType::Deltacode,
    FileType::DebianSpdx,
    FileType::DebianCopyrightRaw,
    FileType::AlienSpdx,
    FileType::FossyJson,
    FileType::FinalSpdx,
    FileType::Harvest,
    FileType::CveHarvest,
    FileType::SessionJson,
];

/// What to do when the target path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
    Fail,
    Overwrite,
    /// Follow the pool's cache flag: skip the write when caching is on.
    CacheSetting,
}

// ─── Pool ──────────────────────────────────────────────────────────

pub struct Pool {
    basepath: PathBuf,
    /// Cache flag for this command invocation (`A4F_CACHE`, inverted by
    /// `--ignore-cache`).
    cached: bool,
}

impl Pool {
    pub fn new<P: AsRef<Path>>(basepath: P, cached: bool) -> A4fResult<Self> {
        let basepath = basepath.as_ref().to_path_buf();
        fs::create_dir_all(&basepath)?;
        for rel in [
            Relationship::Userland,
            Relationship::Debian,
            Relationship::Stats,
            Relationship::Session,
        ] {
            fs::create_dir_all(basepath.join(rel.as_str()))?;
        }
        Ok(Pool { basepath, cached })
    }

    pub fn is_cached_mode(&self) -> bool {
        self.cached
    }

    pub fn basepath(&self) -> &Path {
        &self.basepath
    }

    pub fn abspath(&self, rel: &Path) -> PathBuf {
        self.basepath.join(rel)
    }

    /// Filename for a typed artifact of an identity.
    pub fn filename(&self, ft: FileType, id: &PackageId) -> String {
        match ft {
            FileType::SessionJson => format!("{}.{}", id.name, ft.ext()),
            _ => {
                let variant = if ft.has_variant() && !id.variant.is_empty() {
                    format!("-{}", id.variant)
                } else {
                    String::new()
                };
                format!("{}-{}{}.{}", id.name, id.version, variant, ft.ext())
            }
        }
    }

    /// Relative pool path of a typed artifact, in its default relationship.
    pub fn path_typed(&self, ft: FileType, id: &PackageId) -> PathBuf {
        self.path_typed_in(ft, id, ft.relationship())
    }

    /// Relative pool path of a typed artifact in an explicit relationship
    /// (used for the debian-side scancode outputs).
    pub fn path_typed_in(&self, ft: FileType, id: &PackageId, rel: Relationship) -> PathBuf {
        match rel {
            Relationship::Session => PathBuf::from(rel.as_str()).join(self.filename(ft, id)),
            Relationship::Stats => PathBuf::from(rel.as_str()).join(self.filename(ft, id)),
            _ => PathBuf::from(rel.as_str())
                .join(&id.name)
                .join(&id.version)
                .join(self.filename(ft, id)),
        }
    }

    pub fn exists(&self, rel: &Path) -> bool {
        let p = self.abspath(rel);
        p.is_file() || p.is_dir()
    }

    fn non_empty_file(&self, rel: &Path) -> bool {
        let p = self.abspath(rel);
        p.is_file() && fs::metadata(&p).map(|m| m.len() > 0).unwrap_or(false)
    }

    /// Cache check: true when the artifact exists, is non-empty, and the
    /// cache flag is on. With caching off the stale artifact is removed.
    pub fn is_cached(&self, rel: &Path) -> bool {
        if !self.cached {
            let _ = self.rm(rel);
            return false;
        }
        self.non_empty_file(rel)
    }

    /// Directory flavor of [`Pool::is_cached`].
    pub fn is_cached_dir(&self, rel: &Path) -> A4fResult<bool> {
        if !self.cached {
            let _ = self.rm(rel);
        }
        let abs = self.abspath(rel);
        fs::create_dir_all(&abs)?;
        Ok(self.cached && fs::read_dir(&abs)?.next().is_some())
    }

    pub fn write(&self, rel: &Path, contents: &[u8], if_exists: IfExists) -> A4fResult<PathBuf> {
        let abs = self.abspath(rel);
        if abs.is_file() {
            match if_exists {
                IfExists::Fail => {
                    return Err(A4fError::DuplicatePackage(format!(
                        "{} already exists in the pool",
                        rel.display()
                    )))
                }
                IfExists::CacheSetting if self.cached => {
                    tracing::debug!("pool cache active, skipping write of {}", rel.display());
                    return Ok(abs);
                }
                _ => {}
            }
        }
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }
        // write-then-rename so readers never observe a partial artifact
        let tmp = abs.with_extension("tmp~");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &abs)?;
        Ok(abs)
    }

    /// Typed write, enforcing the prerequisite invariant.
    pub fn write_typed(
        &self,
        ft: FileType,
        id: &PackageId,
        contents: &[u8],
        if_exists: IfExists,
    ) -> A4fResult<PathBuf> {
        for prereq in ft.prerequisites() {
            let p = self.path_typed(*prereq, id);
            if !self.exists(&p) {
                return Err(A4fError::NotFound(format!(
                    "cannot write {:?} for {}: prerequisite {:?} missing",
                    ft, id, prereq
                )));
            }
        }
        self.write(&self.path_typed(ft, id), contents, if_exists)
    }

    pub fn write_json<T: Serialize>(
        &self,
        rel: &Path,
        value: &T,
        if_exists: IfExists,
    ) -> A4fResult<PathBuf> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write(rel, &data, if_exists)
    }

    pub fn write_json_typed<T: Serialize>(
        &self,
        ft: FileType,
        id: &PackageId,
        value: &T,
        if_exists: IfExists,
    ) -> A4fResult<PathBuf> {
        let data = serde_json::to_vec_pretty(value)?;
        self.write_typed(ft, id, &data, if_exists)
    }

    pub fn read(&self, rel: &Path) -> A4fResult<Vec<u8>> {
        let abs = self.abspath(rel);
        fs::read(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                A4fError::NotFound(format!("{} not in pool", rel.display()))
            } else {
                A4fError::Io(e)
            }
        })
    }

    pub fn read_text(&self, rel: &Path) -> A4fResult<String> {
        let bytes = self.read(rel)?;
        String::from_utf8(bytes)
            .map_err(|_| A4fError::CorruptInput(format!("{} is not UTF-8", rel.display())))
    }

    pub fn read_json<T: DeserializeOwned>(&self, rel: &Path) -> A4fResult<T> {
        let bytes = self.read(rel)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn rm(&self, rel: &Path) -> A4fResult<()> {
        let abs = self.abspath(rel);
        if abs.is_dir() {
            fs::remove_dir_all(&abs)?;
        } else if abs.is_file() {
            fs::remove_file(&abs)?;
        }
        Ok(())
    }

    /// Cache-or-derive primitive: return the artifact if cached, otherwise
    /// invoke `produce` and atomically persist its output.
    pub fn ensure<F>(&self, rel: &Path, produce: F) -> A4fResult<Vec<u8>>
    where
        F: FnOnce() -> A4fResult<Vec<u8>>,
    {
        if self.is_cached(rel) {
            tracing::debug!("skip {}: result exists and cache enabled", rel.display());
            return self.read(rel);
        }
        let data = produce()?;
        self.write(rel, &data, IfExists::Overwrite)?;
        Ok(data)
    }

    /// Glob over the pool, returning relative paths sorted for determinism.
    pub fn absglob(&self, pattern: &str) -> A4fResult<Vec<PathBuf>> {
        let full = format!("{}/{}", self.basepath.display(), pattern);
        let mut out: Vec<PathBuf> = glob::glob(&full)
            .map_err(|e| A4fError::Config(format!("bad glob pattern {pattern}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter_map(|p| p.strip_prefix(&self.basepath).ok().map(|r| r.to_path_buf()))
            .collect();
        out.sort();
        Ok(out)
    }

    /// Reverse-parse a pool path into identity and filetype.
    pub fn packageinfo_from_path(&self, path: &Path) -> A4fResult<(PackageId, FileType)> {
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| A4fError::CorruptInput(format!("bad pool path {}", path.display())))?;

        let ft = ALL_FILETYPES
            .iter()
            .copied()
            .filter(|ft| basename.ends_with(&format!(".{}", ft.ext())))
            .max_by_key(|ft| ft.ext().len())
            .ok_or_else(|| {
                A4fError::CorruptInput(format!("unsupported filetype for {basename}"))
            })?;

        let stem = &basename[..basename.len() - ft.ext().len() - 1];
        let components: Vec<&str> = path
            .iter()
            .filter_map(|c| c.to_str())
            .collect();

        if ft == FileType::SessionJson {
            return Ok((PackageId::new(stem, ""), ft));
        }

        // <relationship>/<name>/<version>/<basename>
        if components.len() < 3 {
            return Err(A4fError::CorruptInput(format!(
                "pool path {} has no name/version directories",
                path.display()
            )));
        }
        let name = components[components.len() - 3].to_string();
        let version = components[components.len() - 2].to_string();

        let mut variant = String::new();
        if ft.has_variant() {
            let prefix = format!("{name}-{version}");
            if stem.len() > prefix.len() + 1 && stem.starts_with(&prefix) {
                variant = stem[prefix.len() + 1..].to_string();
            }
        }

        Ok((
            PackageId {
                name,
                version,
                variant,
            },
            ft,
        ))
    }

    /// All identities in userland that have an artifact of the given type.
    pub fn identities_with(&self, ft: FileType) -> A4fResult<Vec<PackageId>> {
        let mut out = Vec::new();
        for path in self.absglob(&format!("userland/*/*/*.{}", ft.ext()))? {
            if let Ok((id, found)) = self.packageinfo_from_path(&path) {
                if found == ft {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    /// Extract an archive into the pool with cache semantics; returns the
    /// relative destination directory.
    pub fn unpack(
        &self,
        archive: &Archive,
        dest_rel: &Path,
        archive_in_archive: Option<&str>,
    ) -> A4fResult<PathBuf> {
        if self.is_cached_dir(dest_rel)? {
            tracing::debug!(
                "skip unpack to {}: folder not empty and cache enabled",
                dest_rel.display()
            );
            return Ok(dest_rel.to_path_buf());
        }
        let dest_abs = self.abspath(dest_rel);
        match archive_in_archive {
            Some(member) => {
                tracing::debug!(
                    "extracting {} inside {} to {}",
                    member,
                    archive.path.display(),
                    dest_rel.display()
                );
                archive.in_archive_extract(member, &dest_abs)?;
            }
            None => {
                tracing::debug!(
                    "extracting {} to {}",
                    archive.path.display(),
                    dest_rel.display()
                );
                archive.extract(&dest_abs)?;
            }
        }
        Ok(dest_rel.to_path_buf())
    }

    /// Verify that a cached artifact belongs to the identity that names it;
    /// on mismatch, delete-and-rederive only with caching off.
    pub fn check_integrity(
        &self,
        rel: &Path,
        expected_sha1: &str,
        actual_sha1: &str,
    ) -> A4fResult<()> {
        if expected_sha1 == actual_sha1 {
            return Ok(());
        }
        if !self.cached {
            tracing::warn!(
                "integrity mismatch for {}, rederiving (cache disabled)",
                rel.display()
            );
            self.rm(rel)?;
            return Ok(());
        }
        Err(A4fError::IntegrityViolation(format!(
            "{}: expected sha1 {expected_sha1}, found {actual_sha1}",
            rel.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cached: bool) -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::new(dir.path().join("pool"), cached).unwrap();
        (dir, pool)
    }

    #[test]
    fn typed_paths_follow_the_scheme() {
        let (_dir, pool) = pool(true);
        let id = PackageId::new("zlib", "1.2.11-r0");
        assert_eq!(
            pool.path_typed(FileType::Aliensrc, &id),
            PathBuf::from("userland/zlib/1.2.11-r0/zlib-1.2.11-r0.aliensrc")
        );
        assert_eq!(
            pool.path_typed(FileType::DebianSpdx, &PackageId::new("zlib", "1.2.11.dfsg-1")),
            PathBuf::from("debian/zlib/1.2.11.dfsg-1/zlib-1.2.11.dfsg-1.debian.spdx")
        );

        let vid = PackageId::with_variant("acl", "2.2.53-r0", "af1fc0fa");
        assert_eq!(
            pool.filename(FileType::Tinfoilhat, &vid),
            "acl-2.2.53-r0-af1fc0fa.tinfoilhat.json"
        );
    }

    #[test]
    fn packageinfo_roundtrip() {
        let (_dir, pool) = pool(true);
        let vid = PackageId::with_variant("acl", "2.2.53-r0", "af1fc0fa");
        for ft in [FileType::Aliensrc, FileType::Tinfoilhat, FileType::Deltacode] {
            let path = pool.path_typed(ft, &vid);
            let (parsed, parsed_ft) = pool.packageinfo_from_path(&path).unwrap();
            assert_eq!(parsed_ft, ft);
            assert_eq!(parsed.name, "acl");
            assert_eq!(parsed.version, "2.2.53-r0");
            if ft.has_variant() {
                assert_eq!(parsed.variant, "af1fc0fa");
            }
        }
    }

    #[test]
    fn cache_semantics() {
        let (_dir, pool) = pool(true);
        let rel = PathBuf::from("userland/x/1.0/x-1.0.scancode.json");
        pool.write(&rel, b"{\"v\":1}", IfExists::Overwrite).unwrap();
        assert!(pool.is_cached(&rel));

        // cached write is elided
        pool.write(&rel, b"{\"v\":2}", IfExists::CacheSetting).unwrap();
        assert_eq!(pool.read(&rel).unwrap(), b"{\"v\":1}");

        // ensure() returns the cached bytes without invoking produce
        let data = pool
            .ensure(&rel, || panic!("must not derive when cached"))
            .unwrap();
        assert_eq!(data, b"{\"v\":1}");
    }

    #[test]
    fn ignore_cache_rederives() {
        let (_dir, pool) = pool(false);
        let rel = PathBuf::from("userland/x/1.0/x-1.0.scancode.json");
        pool.write(&rel, b"old", IfExists::Overwrite).unwrap();
        let data = pool.ensure(&rel, || Ok(b"new".to_vec())).unwrap();
        assert_eq!(data, b"new");
        assert_eq!(pool.read(&rel).unwrap(), b"new");
    }

    #[test]
    fn prerequisite_enforced_on_typed_writes() {
        let (_dir, pool) = pool(true);
        let id = PackageId::new("zlib", "1.2.11-r0");
        let err = pool
            .write_json_typed(FileType::Alienmatcher, &id, &serde_json::json!({}), IfExists::Overwrite)
            .unwrap_err();
        assert!(matches!(err, A4fError::NotFound(_)));

        pool.write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Fail)
            .unwrap();
        pool.write_json_typed(FileType::Alienmatcher, &id, &serde_json::json!({}), IfExists::Overwrite)
            .unwrap();
    }

    #[test]
    fn duplicate_aliensrc_fails_without_force() {
        let (_dir, pool) = pool(true);
        let id = PackageId::new("zlib", "1.2.11-r0");
        pool.write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Fail)
            .unwrap();
        let err = pool
            .write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Fail)
            .unwrap_err();
        assert!(matches!(err, A4fError::DuplicatePackage(_)));
    }

    #[test]
    fn integrity_violation_is_fatal_only_with_cache() {
        let (_dir, pool) = pool(true);
        let rel = PathBuf::from("userland/x/1.0/x-1.0.aliensrc");
        pool.write(&rel, b"tar", IfExists::Overwrite).unwrap();
        let err = pool.check_integrity(&rel, "aaaa", "bbbb").unwrap_err();
        assert!(err.is_fatal());

        let (_dir2, pool2) = pool_uncached();
        pool2.write(&rel, b"tar", IfExists::Overwrite).unwrap();
        pool2.check_integrity(&rel, "aaaa", "bbbb").unwrap();
        assert!(!pool2.exists(&rel));
    }

    fn pool_uncached() -> (tempfile::TempDir, Pool) {
        pool(false)
    }
}
