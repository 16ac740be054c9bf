//! `session`: create, populate, filter, lock, and report work lists

use std::path::Path;

use crate::pool::Pool;
use crate::session::{Session, SessionFilter};
use crate::A4fResult;

pub enum SessionOp {
    Create,
    /// Populate from pool globs.
    Populate {
        glob_name: String,
        glob_version: String,
    },
    Filter(String),
    Lock,
    Unlock {
        force: bool,
    },
    AddVariants,
    Report {
        path: String,
    },
}

pub fn execute(
    pool: &Pool,
    session_id: Option<&str>,
    lock_key: Option<String>,
    op: SessionOp,
) -> A4fResult<String> {
    let mut session = Session::new(pool, session_id, lock_key)?;
    match op {
        SessionOp::Create => {
            session.create()?;
            tracing::info!("SESSION: created '{}'", session.session_id);
        }
        SessionOp::Populate {
            glob_name,
            glob_version,
        } => {
            session.load(true)?;
            session.populate(&glob_name, &glob_version)?;
            let count = session.package_ids().len();
            tracing::info!(
                "SESSION: '{}' now selects {count} packages",
                session.session_id
            );
        }
        SessionOp::Filter(expr) => {
            let filter = SessionFilter::parse(&expr)?;
            let deselected = session.filter(&filter)?;
            tracing::info!(
                "SESSION: deselected {deselected} packages in '{}'",
                session.session_id
            );
        }
        SessionOp::Lock => {
            session.load(false)?;
            session.lock(false)?;
        }
        SessionOp::Unlock { force } => {
            session.load(false)?;
            session.unlock(force)?;
        }
        SessionOp::AddVariants => {
            session.add_variants()?;
        }
        SessionOp::Report { path } => {
            session.load(false)?;
            session.report_csv(Path::new(&path))?;
        }
    }
    Ok(session.session_id.clone())
}
