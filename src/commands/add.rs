//! `add`: ingest `.aliensrc` (and `.tinfoilhat.json`) files into the pool

use std::path::{Path, PathBuf};

use crate::package::add_to_pool;
use crate::pool::{FileType, IfExists, PackageId, Pool};
use crate::session::{Session, SessionPackage};
use crate::{A4fError, A4fResult};

pub struct AddCmd<'a> {
    pub pool: &'a Pool,
    pub force: bool,
}

impl<'a> AddCmd<'a> {
    /// Ingest the given files. Returns the identities that were added.
    pub fn execute(
        &self,
        files: &[PathBuf],
        session: Option<&mut Session<'_>>,
    ) -> A4fResult<Vec<PackageId>> {
        let mut added: Vec<PackageId> = Vec::new();
        let mut failures = 0usize;
        for file in files {
            match self.add_one(file) {
                Ok(id) => added.push(id),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::error!("[{}] add: {err}", file.display());
                    failures += 1;
                }
            }
        }

        if let Some(session) = session {
            session.load(true)?;
            let packages: Vec<SessionPackage> =
                added.iter().map(SessionPackage::new).collect();
            for pkg in packages {
                session.model.as_mut().unwrap().package_list.push(pkg);
            }
            session.write()?;
        }

        if failures > 0 {
            tracing::warn!("ADD: {} of {} files failed", failures, files.len());
        }
        Ok(added)
    }

    fn add_one(&self, file: &Path) -> A4fResult<PackageId> {
        let filename = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if filename.ends_with(&format!(".{}", FileType::Tinfoilhat.ext())) {
            return self.add_tinfoilhat(file);
        }
        let (package, _) = add_to_pool(self.pool, file, self.force)?;
        Ok(package.id)
    }

    /// TinfoilHat documents ride along with the aliensrc files produced by
    /// the same build; their identity comes from the recipe metadata.
    fn add_tinfoilhat(&self, file: &Path) -> A4fResult<PackageId> {
        let contents = std::fs::read(file)?;
        let model: crate::models::tinfoilhat::TinfoilHatModel =
            serde_json::from_slice(&contents).map_err(|e| {
                A4fError::CorruptInput(format!("{}: bad tinfoilhat: {e}", file.display()))
            })?;
        let meta = model
            .0
            .values()
            .next()
            .map(|c| c.recipe.metadata.clone())
            .filter(|m| !m.name.is_empty() && !m.version.is_empty())
            .ok_or_else(|| {
                A4fError::CorruptInput(format!(
                    "{}: tinfoilhat carries no recipe identity",
                    file.display()
                ))
            })?;
        let id = PackageId::with_variant(&meta.name, &meta.version, &meta.variant);
        let if_exists = if self.force {
            IfExists::Overwrite
        } else {
            IfExists::CacheSetting
        };
        self.pool
            .write_typed(FileType::Tinfoilhat, &id, &contents, if_exists)?;
        tracing::info!("[{id}] added tinfoilhat to pool");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_ingests_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::new(dir.path().join("pool"), true).unwrap();

        let inner = dir.path().join("inner.tar");
        crate::archive::testutil::write_tar(&inner, &[("zlib-1.2.11/zlib.h", b"z")]);
        let aliensrc = dir.path().join("zlib-1.2.11-r0.aliensrc");
        crate::package::testutil::write_aliensrc(&aliensrc, &std::fs::read(&inner).unwrap());

        let cmd = AddCmd {
            pool: &pool,
            force: false,
        };
        let added = cmd.execute(&[aliensrc.clone()], None).unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(
            pool.abspath(Path::new(
                "userland/zlib/1.2.11-r0/zlib-1.2.11-r0.aliensrc"
            ))
            .is_file(),
            true
        );

        // second add without --force records a failure, adds nothing
        let added = cmd.execute(&[aliensrc], None).unwrap();
        assert!(added.is_empty());
    }
}
