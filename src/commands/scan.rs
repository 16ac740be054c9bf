//! `scan`: run the external scanner over alien and Debian sources

use crate::commands::{load_alien_package, load_recorded_match, Command};
use crate::config::Settings;
use crate::matcher::DebianSourceRefs;
use crate::pool::{PackageId, Pool};
use crate::scanner::Scanner;
use crate::{A4fError, A4fResult};

pub struct ScanCmd<'a> {
    pool: &'a Pool,
    scanner: Scanner<'a>,
}

impl<'a> ScanCmd<'a> {
    pub fn new(pool: &'a Pool, settings: &Settings) -> Self {
        ScanCmd {
            pool,
            scanner: Scanner::new(pool, settings),
        }
    }
}

impl Command for ScanCmd<'_> {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn hint(&self) -> &'static str {
        "match or snapmatch"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let mut package = load_alien_package(self.pool, id)?;
        self.scanner.scan_alien(&mut package)?;

        // the Debian side is only scannable when a match was recorded
        match load_recorded_match(self.pool, id) {
            Ok(recorded) => {
                let refs = DebianSourceRefs {
                    debsrc_orig: recorded.debsrc_orig,
                    debsrc_debian: recorded.debsrc_debian,
                    dsc_format: recorded.dsc_format.unwrap_or_default(),
                };
                self.scanner
                    .scan_debian(&recorded.name, &recorded.version, &refs)?;
            }
            Err(A4fError::NotFound(msg)) => {
                tracing::info!("[{id}] {msg}, scanning the alien side only");
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}
