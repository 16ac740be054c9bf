//! Tar archive access for `.aliensrc` packages and Debian source tarballs
//!
//! Thin wrapper over the `tar` crate with transparent gzip/xz decompression
//! chosen by file extension. Member paths in checksum maps are reported with
//! their first path component stripped, so callers always work with paths
//! relative to the archive's root folder (`files/` for `.aliensrc`,
//! `<pkg>-<version>/` for upstream tarballs).

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tar::Archive as TarReader;

use crate::{A4fError, A4fResult};

/// A tar archive on disk, possibly compressed.
pub struct Archive {
    pub path: PathBuf,
    compression: Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Xz,
}

fn compression_for(name: &str) -> A4fResult<Compression> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Ok(Compression::Gzip)
    } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
        Ok(Compression::Xz)
    } else if lower.ends_with(".tar") || lower.ends_with(".aliensrc") {
        Ok(Compression::None)
    } else {
        Err(A4fError::CorruptInput(format!(
            "unsupported archive type: {name}"
        )))
    }
}

fn decoder(compression: Compression, inner: Box<dyn Read>) -> Box<dyn Read> {
    match compression {
        Compression::None => inner,
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(inner)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(inner)),
    }
}

/// Strip the first path component: `files/zlib.tar.xz` -> `zlib.tar.xz`.
fn strip_root(path: &str) -> String {
    match path.split_once('/') {
        Some((_, rest)) => rest.to_string(),
        None => path.to_string(),
    }
}

fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl Archive {
    pub fn open<P: AsRef<Path>>(path: P) -> A4fResult<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let compression = compression_for(name)?;
        if !path.is_file() {
            return Err(A4fError::NotFound(format!(
                "archive {} does not exist",
                path.display()
            )));
        }
        Ok(Archive { path, compression })
    }

    fn tar(&self) -> A4fResult<TarReader<Box<dyn Read>>> {
        let file: Box<dyn Read> = Box::new(File::open(&self.path)?);
        Ok(TarReader::new(decoder(self.compression, file)))
    }

    /// All member paths, in archive order.
    pub fn list(&self) -> A4fResult<Vec<String>> {
        let mut out = Vec::new();
        let mut tar = self.tar()?;
        for entry in tar.entries()? {
            let entry = entry?;
            out.push(entry.path()?.to_string_lossy().to_string());
        }
        Ok(out)
    }

    /// Read one member by its exact archive path.
    pub fn read_member(&self, member: &str) -> A4fResult<Vec<u8>> {
        let mut tar = self.tar()?;
        for entry in tar.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == member {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                return Ok(buf);
            }
        }
        Err(A4fError::NotFound(format!(
            "{member} not found in archive {}",
            self.path.display()
        )))
    }

    /// SHA-1 of every regular file under `prefix` (empty = whole archive),
    /// keyed by the path with its first component stripped.
    pub fn checksums(&self, prefix: &str) -> A4fResult<HashMap<String, String>> {
        let mut out = HashMap::new();
        let mut tar = self.tar()?;
        for entry in tar.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().to_string();
            if !prefix.is_empty() && !path.starts_with(prefix) {
                continue;
            }
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            out.insert(strip_root(&path), sha1_hex(&buf));
        }
        Ok(out)
    }

    /// Root folder shared by all members, or `""` when there is none.
    pub fn rootfolder(&self) -> A4fResult<String> {
        let mut roots: Vec<String> = Vec::new();
        for path in self.list()? {
            let root = path.split('/').next().unwrap_or_default().to_string();
            if !root.is_empty() && !roots.contains(&root) {
                roots.push(root);
            }
        }
        if roots.len() == 1 {
            Ok(roots.remove(0))
        } else {
            Ok(String::new())
        }
    }

    /// Open a tar member that is itself a (possibly compressed) tar archive.
    fn nested(&self, member: &str) -> A4fResult<(Compression, Vec<u8>)> {
        let compression = compression_for(member)?;
        let bytes = self.read_member(member)?;
        Ok((compression, bytes))
    }

    /// SHA-1 checksums inside a nested archive member, root stripped.
    pub fn in_archive_checksums(&self, member: &str) -> A4fResult<HashMap<String, String>> {
        let (compression, bytes) = self.nested(member)?;
        let mut out = HashMap::new();
        let mut tar = TarReader::new(decoder(compression, Box::new(Cursor::new(bytes))));
        for entry in tar.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().to_string();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            out.insert(strip_root(&path), sha1_hex(&buf));
        }
        Ok(out)
    }

    /// Root folder of a nested archive member.
    pub fn in_archive_rootfolder(&self, member: &str) -> A4fResult<String> {
        let (compression, bytes) = self.nested(member)?;
        let mut tar = TarReader::new(decoder(compression, Box::new(Cursor::new(bytes))));
        let mut roots: Vec<String> = Vec::new();
        for entry in tar.entries()? {
            let entry = entry?;
            let path = entry.path()?.to_string_lossy().to_string();
            let root = path.split('/').next().unwrap_or_default().to_string();
            if !root.is_empty() && !roots.contains(&root) {
                roots.push(root);
            }
        }
        if roots.len() == 1 {
            Ok(roots.remove(0))
        } else {
            Ok(String::new())
        }
    }

    /// Extract the whole archive to `dest`, stripping the root folder.
    pub fn extract(&self, dest: &Path) -> A4fResult<()> {
        std::fs::create_dir_all(dest)?;
        let mut tar = self.tar()?;
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().to_string();
            let stripped = strip_root(&path);
            if stripped.is_empty() {
                continue;
            }
            let target = dest.join(&stripped);
            if entry.header().entry_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.header().entry_type().is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                entry.unpack(&target)?;
            }
        }
        Ok(())
    }

    /// Extract a nested archive member to `dest`, stripping its root folder.
    pub fn in_archive_extract(&self, member: &str, dest: &Path) -> A4fResult<()> {
        std::fs::create_dir_all(dest)?;
        let (compression, bytes) = self.nested(member)?;
        let mut tar = TarReader::new(decoder(compression, Box::new(Cursor::new(bytes))));
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().to_string();
            let stripped = strip_root(&path);
            if stripped.is_empty() {
                continue;
            }
            let target = dest.join(&stripped);
            if entry.header().entry_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.header().entry_type().is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                entry.unpack(&target)?;
            }
        }
        Ok(())
    }
}

/// Test helper shared by modules that need throwaway tar fixtures.
#[cfg(test)]
pub(crate) mod testutil {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    /// Build an uncompressed tar on disk from (path, contents) pairs.
    pub fn write_tar(dest: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(dest).unwrap();
        let mut builder = tar::Builder::new(file);
        for (path, contents) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, *path, *contents).unwrap();
        }
        builder.into_inner().unwrap().flush().unwrap();
    }
}
