//! `upload`: push session packages to the clearing server

use crate::commands::{load_alien_package, Command};
use crate::config::Settings;
use crate::fossy::client::ClearingClient;
use crate::fossy::upload::{import_alien_spdx, upload_package};
use crate::pool::{PackageId, Pool};
use crate::A4fResult;

pub struct UploadCmd<'a> {
    pool: &'a Pool,
    settings: &'a Settings,
    client: &'a dyn ClearingClient,
    /// Identities uploaded during this run, with their upload ids.
    pub uploaded: Vec<(PackageId, u64)>,
}

impl<'a> UploadCmd<'a> {
    pub fn new(pool: &'a Pool, settings: &'a Settings, client: &'a dyn ClearingClient) -> Self {
        UploadCmd {
            pool,
            settings,
            client,
            uploaded: Vec::new(),
        }
    }
}

impl Command for UploadCmd<'_> {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn hint(&self) -> &'static str {
        "spdxalien"
    }

    fn run(&mut self, id: &PackageId) -> A4fResult<()> {
        let mut package = load_alien_package(self.pool, id)?;
        let (upload_id, transferred) = upload_package(self.client, &mut package)?;
        import_alien_spdx(self.client, self.pool, self.settings, &package, upload_id)?;
        self.uploaded.push((id.clone(), upload_id));
        tracing::info!(
            "[{id}] upload {} (id {upload_id})",
            if transferred { "transferred" } else { "reused" }
        );
        Ok(())
    }
}
