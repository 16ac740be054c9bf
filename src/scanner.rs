//! External license scanner driver
//!
//! The file-level scanner is an external tool invoked per directory; its
//! JSON report and SPDX tag-value twin are treated as opaque artifacts and
//! cached in the pool. A non-zero exit is a [`A4fError::SubprocessFailure`]
//! and is never retried.

use std::path::Path;
use std::process::Command;

use crate::config::{ScancodeFlavor, Settings};
use crate::matcher::DebianSourceRefs;
use crate::package::AlienPackage;
use crate::pool::{FileType, PackageId, Pool, Relationship};
use crate::{A4fError, A4fResult};

pub struct Scanner<'a> {
    pool: &'a Pool,
    flavor: ScancodeFlavor,
}

impl<'a> Scanner<'a> {
    pub fn new(pool: &'a Pool, settings: &Settings) -> Self {
        Scanner {
            pool,
            flavor: settings.scancode,
        }
    }

    fn command(&self) -> &'static str {
        match self.flavor {
            ScancodeFlavor::Native => "scancode",
            ScancodeFlavor::Wrapper => "scancode-wrapper",
        }
    }

    /// Run the scanner over a directory, producing the JSON report and the
    /// SPDX tag-value twin.
    fn scan_dir(&self, dir: &Path, json_out: &Path, spdx_out: &Path) -> A4fResult<()> {
        let cmd = self.command();
        tracing::info!("running {cmd} on {}", dir.display());
        let output = Command::new(cmd)
            .arg("--license")
            .arg("--copyright")
            .arg("--info")
            .arg("--strip-root")
            .arg("--json")
            .arg(json_out)
            .arg("--spdx-tv")
            .arg(spdx_out)
            .arg(dir)
            .output()
            .map_err(|e| A4fError::SubprocessFailure(format!("cannot start {cmd}: {e}")))?;

        if !output.status.success() {
            return Err(A4fError::SubprocessFailure(format!(
                "{cmd} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// Scan the alien package's main internal archive. Outputs land under
    /// `userland/<name>/<version>/`.
    pub fn scan_alien(&self, package: &mut AlienPackage) -> A4fResult<()> {
        let id = package.id.clone();
        package.expand(false, false, false)?;
        let main = package.main_internal_archive().ok_or_else(|| {
            A4fError::NotFound(format!("[{id}] no main internal archive, nothing to scan"))
        })?;

        let json_rel = self
            .pool
            .path_typed(FileType::ScancodeJson, &PackageId::new(&id.name, &id.version));
        let spdx_rel = self
            .pool
            .path_typed(FileType::ScancodeSpdx, &PackageId::new(&id.name, &id.version));
        if self.pool.is_cached(&json_rel) && self.pool.is_cached(&spdx_rel) {
            tracing::debug!("[{id}] scanner results cached, skipping");
            return Ok(());
        }

        let unpack_rel = Path::new(Relationship::Userland.as_str())
            .join(&id.name)
            .join(&id.version)
            .join("__unpacked");
        let member = format!("files/{}", main.name);
        self.pool
            .unpack(&package.archive, &unpack_rel, Some(&member))?;

        self.scan_dir(
            &self.pool.abspath(&unpack_rel),
            &self.pool.abspath(&json_rel),
            &self.pool.abspath(&spdx_rel),
        )
    }

    /// Scan the matched Debian upstream source. Outputs land under
    /// `debian/<name>/<version>/`; the packaging overlay is not scanned,
    /// the delta is upstream-vs-alien.
    pub fn scan_debian(&self, name: &str, version: &str, refs: &DebianSourceRefs) -> A4fResult<()> {
        let debsrc_orig = refs.debsrc_orig.as_ref().ok_or_else(|| {
            A4fError::NotFound(format!("[{name}-{version}] no upstream source to scan"))
        })?;

        let deb_id = PackageId::new(name, version);
        let json_rel = self
            .pool
            .path_typed_in(FileType::ScancodeJson, &deb_id, Relationship::Debian);
        let spdx_rel = self
            .pool
            .path_typed_in(FileType::ScancodeSpdx, &deb_id, Relationship::Debian);
        if self.pool.is_cached(&json_rel) && self.pool.is_cached(&spdx_rel) {
            tracing::debug!("[{name}-{version}] debian scanner results cached, skipping");
            return Ok(());
        }

        let archive = crate::archive::Archive::open(self.pool.abspath(Path::new(debsrc_orig)))?;
        let unpack_rel = Path::new(Relationship::Debian.as_str())
            .join(name)
            .join(version)
            .join("__unpacked");
        self.pool.unpack(&archive, &unpack_rel, None)?;

        self.scan_dir(
            &self.pool.abspath(&unpack_rel),
            &self.pool.abspath(&json_rel),
            &self.pool.abspath(&spdx_rel),
        )
    }
}
