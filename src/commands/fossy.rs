//! `fossy`: harvest audit state and produce the final SPDX

use crate::commands::{load_alien_package, Command};
use crate::config::Settings;
use crate::fossy::client::ClearingClient;
use crate::fossy::report::{fetch_audit_state, produce_final_spdx, write_sbom};
use crate::pool::{PackageId, Pool};
use crate::A4fResult;

pub struct FossyCmd<'a> {
    pool: &'a Pool,
    settings: &'a Settings,
    client: &'a dyn ClearingClient,
    /// Also emit a CycloneDX rendering of the final SPDX.
    pub with_sbom: bool,
}

impl<'a> FossyCmd<'a> {
    pub fn new(pool: &'a Pool, settings: &'a Settings, client: &'a dyn ClearingClient) -> Self {
        FossyCmd {
            pool,
            settings,
            client,
            with_sbom: false,
        }
    }
}

impl Command for FossyCmd<'_> {
    fn name(&self) -> &'static str {
        "fossy"
    }

    fn hint(&self) -> &'static str {
        "upload"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let mut package = load_alien_package(self.pool, id)?;
        fetch_audit_state(self.client, self.pool, self.settings, &package)?;
        let doc = produce_final_spdx(self.client, self.pool, &mut package)?;
        if self.with_sbom {
            write_sbom(self.pool, &package, &doc)?;
        }
        Ok(())
    }
}
