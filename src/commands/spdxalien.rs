//! `spdxalien`: synthesize the alien SPDX from scanner and Debian data

use crate::commands::{load_alien_package, load_recorded_match, Command};
use crate::models::deltacode::DeltaModel;
use crate::pool::{FileType, IfExists, PackageId, Pool};
use crate::spdx::alien::{scancode_only, synthesize};
use crate::spdx::SpdxDocument;
use crate::{A4fError, A4fResult};

pub struct SpdxAlienCmd<'a> {
    pool: &'a Pool,
    pub apply_debian_full: bool,
}

impl<'a> SpdxAlienCmd<'a> {
    pub fn new(pool: &'a Pool, apply_debian_full: bool) -> Self {
        SpdxAlienCmd {
            pool,
            apply_debian_full,
        }
    }

    fn read_tag_value(&self, rel: &std::path::Path) -> A4fResult<SpdxDocument> {
        let text = self.pool.read_text(rel)?;
        SpdxDocument::parse_tag_value(&text)
    }
}

impl Command for SpdxAlienCmd<'_> {
    fn name(&self) -> &'static str {
        "spdxalien"
    }

    fn hint(&self) -> &'static str {
        "delta and spdxdebian"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let group = PackageId::new(&id.name, &id.version);
        let result_rel = self.pool.path_typed(FileType::AlienSpdx, &group);
        if self.pool.is_cached(&result_rel) {
            tracing::debug!("[{id}] alien SPDX exists, skipping");
            return Ok(());
        }

        let scancode_rel = self.pool.path_typed(FileType::ScancodeSpdx, &group);
        let scancode_spdx = self.read_tag_value(&scancode_rel)?;

        let mut package = load_alien_package(self.pool, id)?;
        package.expand(false, true, true)?;

        // no match or no main archive: scanner-only fallback
        let fallback = |reason: &str| -> A4fResult<SpdxDocument> {
            tracing::warn!("[{id}] {reason}, producing scanner-only SPDX");
            Ok(scancode_only(self.read_tag_value(&scancode_rel)?, &package))
        };

        let doc = if !package.has_main_internal_archive() {
            fallback("no main internal archive")?
        } else {
            match load_recorded_match(self.pool, id) {
                Ok(recorded) => {
                    let deb_id = PackageId::new(&recorded.name, &recorded.version);
                    let debian_rel = self.pool.path_typed(FileType::DebianSpdx, &deb_id);
                    let delta_rel = self.pool.path_typed(FileType::Deltacode, &group);
                    if self.pool.exists(&debian_rel) && self.pool.exists(&delta_rel) {
                        let debian_spdx = self.read_tag_value(&debian_rel)?;
                        let delta: DeltaModel = self.pool.read_json(&delta_rel)?;
                        synthesize(
                            scancode_spdx,
                            debian_spdx,
                            &delta,
                            &package,
                            self.apply_debian_full,
                        )?
                    } else {
                        fallback("debian SPDX or delta missing")?
                    }
                }
                Err(A4fError::NotFound(_)) => fallback("no Debian match")?,
                Err(err) => return Err(err),
            }
        };

        self.pool.write_typed(
            FileType::AlienSpdx,
            &group,
            doc.to_tag_value().as_bytes(),
            IfExists::Overwrite,
        )?;
        tracing::info!("[{id}] alien SPDX written");
        Ok(())
    }
}
