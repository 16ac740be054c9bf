//! `spdxdebian`: extract an SPDX document from the matched Debian source

use std::path::Path;

use crate::commands::{load_recorded_match, Command};
use crate::pool::{FileType, IfExists, PackageId, Pool};
use crate::spdx::debian::Debian2Spdx;
use crate::{A4fError, A4fResult};

pub struct SpdxDebianCmd<'a> {
    pool: &'a Pool,
}

impl<'a> SpdxDebianCmd<'a> {
    pub fn new(pool: &'a Pool) -> Self {
        SpdxDebianCmd { pool }
    }
}

impl Command for SpdxDebianCmd<'_> {
    fn name(&self) -> &'static str {
        "spdxdebian"
    }

    fn hint(&self) -> &'static str {
        "match or snapmatch"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let recorded = load_recorded_match(self.pool, id)?;
        let deb_id = PackageId::new(&recorded.name, &recorded.version);
        let result_rel = self.pool.path_typed(FileType::DebianSpdx, &deb_id);
        if self.pool.is_cached(&result_rel) {
            tracing::debug!("[{id}] debian SPDX exists, skipping");
            return Ok(());
        }

        let orig_rel = recorded.debsrc_orig.as_ref().ok_or_else(|| {
            A4fError::NotFound(format!("[{id}] match carries no upstream source tarball"))
        })?;
        let orig_abs = self.pool.abspath(Path::new(orig_rel));
        let overlay_abs = recorded
            .debsrc_debian
            .as_ref()
            .map(|rel| self.pool.abspath(Path::new(rel)));

        let d2s = Debian2Spdx::new(&orig_abs, overlay_abs.as_deref())?;
        match d2s.generate() {
            Ok(doc) => {
                self.pool.write(
                    &result_rel,
                    doc.to_tag_value().as_bytes(),
                    IfExists::Overwrite,
                )?;
                tracing::info!(
                    "[{id}] debian SPDX written for {} {}",
                    recorded.name,
                    recorded.version
                );
                Ok(())
            }
            Err(A4fError::CorruptInput(msg)) => {
                // export the raw copyright for manual inspection, then
                // surface the parse failure for this package
                if let Ok(raw) = d2s.raw_copyright() {
                    let raw_rel = self.pool.path_typed(FileType::DebianCopyrightRaw, &deb_id);
                    self.pool
                        .write(&raw_rel, raw.as_bytes(), IfExists::Overwrite)?;
                    tracing::warn!(
                        "[{id}] debian/copyright not machine parseable, raw copy at {}",
                        raw_rel.display()
                    );
                }
                Err(A4fError::CorruptInput(msg))
            }
            Err(err) => Err(err),
        }
    }
}
