//! Command layer: one struct per pipeline step
//!
//! Every step implements [`Command`]: `execute` iterates the session's
//! selected packages sequentially, `run` processes one identity, `hint`
//! names the step the user probably forgot when nothing is found.
//! Non-fatal errors are recorded per package and the loop continues;
//! fatal errors (configuration, lock conflicts, integrity violations with
//! caching on) abort the command. Cancellation is cooperative: once
//! requested, the loop stops after the package in flight.

pub mod add;
pub mod config;
pub mod cvecheck;
pub mod delta;
pub mod fossy;
pub mod harvest;
pub mod matchcmd;
pub mod mirror;
pub mod scan;
pub mod session;
pub mod snapmatch;
pub mod spdxalien;
pub mod spdxdebian;
pub mod upload;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::matcher::{AlienMatcherModel, AlienSnapMatcherModel};
use crate::pool::{FileType, PackageId, Pool};
use crate::{A4fError, A4fResult};

/// Set by the signal layer; commands finish the current package and stop.
pub static CANCEL: AtomicBool = AtomicBool::new(false);

pub fn cancellation_requested() -> bool {
    CANCEL.load(Ordering::Relaxed)
}

/// Per-run outcome counters, used to derive the process exit code.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<(PackageId, String)>,
}

impl ExecutionSummary {
    pub fn all_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub trait Command {
    fn name(&self) -> &'static str;

    /// The step the user should have run before this one.
    fn hint(&self) -> &'static str {
        ""
    }

    /// Process one package identity.
    fn run(&mut self, id: &PackageId) -> A4fResult<()>;

    /// Sequentially process all identities, recording non-fatal errors.
    fn execute(&mut self, ids: &[PackageId]) -> A4fResult<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();
        if ids.is_empty() {
            let hint = self.hint();
            if hint.is_empty() {
                tracing::info!("{}: nothing to do", self.name().to_uppercase());
            } else {
                tracing::info!(
                    "{}: nothing found. Have you executed '{hint}' for these packages?",
                    self.name().to_uppercase()
                );
            }
            return Ok(summary);
        }
        for id in ids {
            if cancellation_requested() {
                tracing::warn!(
                    "{}: cancellation requested, stopping before [{id}]",
                    self.name().to_uppercase()
                );
                break;
            }
            match self.run(id) {
                Ok(()) => summary.processed += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::error!("[{id}] {}: {err}", self.name());
                    summary.errors.push((id.clone(), err.to_string()));
                }
            }
        }
        tracing::info!(
            "{}: {} processed, {} failed",
            self.name().to_uppercase(),
            summary.processed,
            summary.errors.len()
        );
        Ok(summary)
    }
}

/// The Debian match recorded for an identity, unified over the two
/// matcher document kinds. Snapmatch wins when both exist.
#[derive(Debug, Clone)]
pub struct RecordedMatch {
    pub name: String,
    pub version: String,
    pub debsrc_orig: Option<String>,
    pub debsrc_debian: Option<String>,
    pub dsc_format: Option<String>,
}

pub fn load_recorded_match(pool: &Pool, id: &PackageId) -> A4fResult<RecordedMatch> {
    let group = PackageId::new(&id.name, &id.version);

    let snap_rel = pool.path_typed(FileType::Snapmatch, &group);
    if pool.exists(&snap_rel) {
        let model: AlienSnapMatcherModel = pool.read_json(&snap_rel)?;
        if let Some(m) = model.debian_match {
            return Ok(RecordedMatch {
                name: m.name,
                version: m.version,
                debsrc_orig: m.debsrc_orig,
                debsrc_debian: m.debsrc_debian,
                dsc_format: m.dsc_format,
            });
        }
    }

    let match_rel = pool.path_typed(FileType::Alienmatcher, &group);
    if pool.exists(&match_rel) {
        let model: AlienMatcherModel = pool.read_json(&match_rel)?;
        if let Some(m) = model.debian_match {
            return Ok(RecordedMatch {
                name: m.name,
                version: m.version,
                debsrc_orig: m.debsrc_orig,
                debsrc_debian: m.debsrc_debian,
                dsc_format: m.dsc_format,
            });
        }
    }

    Err(A4fError::NotFound(format!(
        "no Debian match recorded for {id}"
    )))
}

/// Open the identity's `.aliensrc` from the pool.
pub fn load_alien_package(pool: &Pool, id: &PackageId) -> A4fResult<crate::package::AlienPackage> {
    let rel = pool.path_typed(FileType::Aliensrc, id);
    if !pool.exists(&rel) {
        return Err(A4fError::NotFound(format!("no aliensrc in pool for {id}")));
    }
    crate::package::AlienPackage::from_aliensrc(pool.abspath(&rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        fail_on: String,
    }

    impl Command for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn run(&mut self, id: &PackageId) -> A4fResult<()> {
            if id.name == self.fail_on {
                Err(A4fError::NotFound("no artifact".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Fatal;

    impl Command for Fatal {
        fn name(&self) -> &'static str {
            "fatal"
        }
        fn run(&mut self, _id: &PackageId) -> A4fResult<()> {
            Err(A4fError::LockConflict("locked".to_string()))
        }
    }

    #[test]
    fn non_fatal_errors_are_recorded_and_skipped() {
        let ids = vec![
            PackageId::new("acl", "1.0"),
            PackageId::new("bad", "1.0"),
            PackageId::new("zlib", "1.0"),
        ];
        let mut cmd = Flaky {
            fail_on: "bad".to_string(),
        };
        let summary = cmd.execute(&ids).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].0.name, "bad");
        assert!(!summary.all_ok());
    }

    #[test]
    fn fatal_errors_abort_the_command() {
        let ids = vec![PackageId::new("acl", "1.0")];
        let mut cmd = Fatal;
        assert!(matches!(
            cmd.execute(&ids),
            Err(A4fError::LockConflict(_))
        ));
    }
}
