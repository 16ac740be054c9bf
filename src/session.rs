//! Filtered, lockable work lists over pool identities
//!
//! A session is a JSON document under `session/` listing package identities
//! together with selection and upload state. Commands iterate the session's
//! selected packages in stored order. Cross-process serialization uses a
//! stored lock token: a holder presents its key (`A4F_LOCK_KEY`) on every
//! mutating operation, everyone else gets a [`A4fError::LockConflict`].

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::common::ToolInfo;
use crate::pool::{FileType, IfExists, PackageId, Pool};
use crate::{A4fError, A4fResult};

// ─── Model ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default)]
    pub selected_reason: String,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(default)]
    pub uploaded_reason: String,
}

fn default_true() -> bool {
    true
}

impl SessionPackage {
    pub fn new(id: &PackageId) -> Self {
        SessionPackage {
            name: id.name.clone(),
            version: id.version.clone(),
            variant: id.variant.clone(),
            selected: true,
            selected_reason: String::new(),
            uploaded: false,
            uploaded_reason: String::new(),
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::with_variant(&self.name, &self.version, &self.variant)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModel {
    pub tool: ToolInfo,
    pub session_id: String,
    pub created: String,
    #[serde(default)]
    pub package_list: Vec<SessionPackage>,
}

// ─── Filters ───────────────────────────────────────────────────────

/// Closed set of session filter predicates.
#[derive(Debug, Clone)]
pub enum SessionFilter {
    /// Keep packages whose best match score exceeds N.
    ScoreGt(f64),
    /// Keep packages on the include list, drop those on the exclude list.
    IncludeExclude {
        include: Vec<String>,
        exclude: Vec<String>,
    },
    /// Keep only packages already uploaded to the clearing server.
    OnlyUploaded,
}

#[derive(Debug, Default, Deserialize)]
struct IncludeExcludeDoc {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
}

impl SessionFilter {
    /// Parse a CLI filter expression like `score-gt=50`,
    /// `include-exclude=<json>` or `only-uploaded`.
    pub fn parse(expr: &str) -> A4fResult<Self> {
        if expr == "only-uploaded" {
            return Ok(SessionFilter::OnlyUploaded);
        }
        if let Some(n) = expr.strip_prefix("score-gt=") {
            let threshold = n
                .parse::<f64>()
                .map_err(|_| A4fError::Config(format!("score-gt needs a number, got '{n}'")))?;
            return Ok(SessionFilter::ScoreGt(threshold));
        }
        if let Some(doc) = expr.strip_prefix("include-exclude=") {
            let parsed: IncludeExcludeDoc = serde_json::from_str(doc)
                .map_err(|e| A4fError::Config(format!("bad include-exclude document: {e}")))?;
            return Ok(SessionFilter::IncludeExclude {
                include: parsed.include,
                exclude: parsed.exclude,
            });
        }
        Err(A4fError::Config(format!("unknown filter '{expr}'")))
    }
}

// ─── Session ───────────────────────────────────────────────────────

pub struct Session<'a> {
    pool: &'a Pool,
    pub session_id: String,
    pub model: Option<SessionModel>,
    /// Key this process presents on mutating operations.
    lock_key: Option<String>,
}

impl<'a> Session<'a> {
    /// Attach to a session id, or generate an unused random id.
    pub fn new(pool: &'a Pool, session_id: Option<&str>, lock_key: Option<String>) -> A4fResult<Self> {
        let session_id = match session_id {
            Some(id) => clean_identifier(id, "session_id")?,
            None => loop {
                let id = random_id(16);
                let probe = PackageId::new(&id, "");
                if !pool.exists(&pool.path_typed(FileType::SessionJson, &probe)) {
                    break id;
                }
            },
        };
        Ok(Session {
            pool,
            session_id,
            model: None,
            lock_key,
        })
    }

    fn file_path(&self) -> PathBuf {
        self.pool
            .path_typed(FileType::SessionJson, &PackageId::new(&self.session_id, ""))
    }

    fn lock_path(&self) -> PathBuf {
        Path::new("session").join(format!("{}.lock", self.session_id))
    }

    pub fn create(&mut self) -> A4fResult<&SessionModel> {
        self.model = Some(SessionModel {
            tool: ToolInfo::current(),
            session_id: self.session_id.clone(),
            created: chrono::Utc::now().to_rfc3339(),
            package_list: Vec::new(),
        });
        self.write()?;
        Ok(self.model.as_ref().unwrap())
    }

    pub fn load(&mut self, create: bool) -> A4fResult<&SessionModel> {
        match self.pool.read_json::<SessionModel>(&self.file_path()) {
            Ok(model) => {
                self.model = Some(model);
                Ok(self.model.as_ref().unwrap())
            }
            Err(A4fError::NotFound(_)) if create => self.create(),
            Err(A4fError::NotFound(_)) => Err(A4fError::Session(format!(
                "session '{}' not found, use 'session create' first",
                self.session_id
            ))),
            Err(e) => Err(e),
        }
    }

    /// Persist the model; refused when another holder owns the lock.
    pub fn write(&self) -> A4fResult<()> {
        self.check_accessible()?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| A4fError::Session("session model not loaded".to_string()))?;
        self.pool
            .write_json(&self.file_path(), model, IfExists::Overwrite)?;
        tracing::debug!("session data written to '{}'", self.file_path().display());
        Ok(())
    }

    // ── Locking ────────────────────────────────────────────────────

    pub fn stored_lock(&self) -> Option<String> {
        self.pool
            .read_text(&self.lock_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn check_accessible(&self) -> A4fResult<()> {
        match self.stored_lock() {
            None => Ok(()),
            Some(stored) if Some(&stored) == self.lock_key.as_ref() => Ok(()),
            Some(_) => Err(A4fError::LockConflict(format!(
                "session '{}' is locked by another pipeline",
                self.session_id
            ))),
        }
    }

    pub fn lock(&self, force: bool) -> A4fResult<()> {
        let key = self.lock_key.as_ref().ok_or_else(|| {
            A4fError::Session(
                "cannot lock a session without a lock key, set A4F_LOCK_KEY".to_string(),
            )
        })?;
        let key = clean_identifier(key, "lock_key")?;
        match self.stored_lock() {
            Some(stored) if stored == key => {
                tracing::info!(
                    "session '{}' already locked with this key, skipping",
                    self.session_id
                );
                return Ok(());
            }
            Some(stored) if !force => {
                return Err(A4fError::LockConflict(format!(
                    "session '{}' already locked with key '{stored}', unlock it first or force-lock",
                    self.session_id
                )))
            }
            _ => {}
        }
        self.pool
            .write(&self.lock_path(), key.as_bytes(), IfExists::Overwrite)?;
        tracing::info!(
            "locking session '{}'{}",
            self.session_id,
            if force { " (forced)" } else { "" }
        );
        Ok(())
    }

    pub fn unlock(&self, force: bool) -> A4fResult<()> {
        let stored = match self.stored_lock() {
            None => {
                tracing::info!("session '{}' not locked", self.session_id);
                return Ok(());
            }
            Some(s) => s,
        };
        if force || Some(&stored) == self.lock_key.as_ref() {
            self.pool.rm(&self.lock_path())?;
            tracing::info!(
                "session '{}' unlocked{}",
                self.session_id,
                if force { " (forced)" } else { "" }
            );
            return Ok(());
        }
        Err(A4fError::LockConflict(format!(
            "unable to unlock session '{}': lock keys do not match",
            self.session_id
        )))
    }

    // ── Package list operations ────────────────────────────────────

    /// Fill the list with every identity matching the name/version globs
    /// that has both an `.aliensrc` and a `.tinfoilhat.json` in the pool;
    /// one-sided identities are added deselected with a reason.
    pub fn populate(&mut self, glob_name: &str, glob_version: &str) -> A4fResult<()> {
        let mut candidates: Vec<SessionPackage> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for ft in [FileType::Aliensrc, FileType::Tinfoilhat] {
            let pattern = format!("userland/{glob_name}/{glob_version}/*.{}", ft.ext());
            for path in self.pool.absglob(&pattern)? {
                if let Ok((id, _)) = self.pool.packageinfo_from_path(&path) {
                    if seen.insert(id.to_string()) {
                        candidates.push(SessionPackage::new(&id));
                    }
                }
            }
        }

        for candidate in &mut candidates {
            let id = candidate.id();
            if !self
                .pool
                .exists(&self.pool.path_typed(FileType::Aliensrc, &id))
            {
                candidate.selected = false;
                candidate.selected_reason = "no aliensrc found".to_string();
            } else if !self
                .pool
                .exists(&self.pool.path_typed(FileType::Tinfoilhat, &id))
            {
                candidate.selected = false;
                candidate.selected_reason = "no tinfoilhat found".to_string();
            }
        }

        self.merge_packages(candidates);
        self.write()
    }

    fn merge_packages(&mut self, packages: Vec<SessionPackage>) {
        let model = self.model.get_or_insert_with(|| SessionModel {
            tool: ToolInfo::current(),
            session_id: self.session_id.clone(),
            created: chrono::Utc::now().to_rfc3339(),
            package_list: Vec::new(),
        });
        for pkg in packages {
            match model
                .package_list
                .iter_mut()
                .find(|p| p.id() == pkg.id())
            {
                Some(existing) => {
                    existing.selected = pkg.selected;
                    existing.selected_reason = if pkg.selected {
                        "added again".to_string()
                    } else {
                        pkg.selected_reason
                    };
                }
                None => model.package_list.push(pkg),
            }
        }
    }

    /// Extend the list with every pool-known variant of already listed
    /// (name, version) pairs.
    pub fn add_variants(&mut self) -> A4fResult<()> {
        self.load(false)?;
        let model = self.model.as_mut().unwrap();
        let mut to_add: Vec<SessionPackage> = Vec::new();

        for pkg in &model.package_list {
            let pattern = format!(
                "userland/{}/{}/*.{}",
                pkg.name,
                pkg.version,
                FileType::Aliensrc.ext()
            );
            for path in self.pool.absglob(&pattern)? {
                let (id, _) = match self.pool.packageinfo_from_path(&path) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if id.variant == pkg.variant {
                    continue;
                }
                let already = model.package_list.iter().any(|p| p.id() == id)
                    || to_add.iter().any(|p| p.id() == id);
                let has_tinfoilhat = self
                    .pool
                    .exists(&self.pool.path_typed(FileType::Tinfoilhat, &id));
                if !already && has_tinfoilhat {
                    tracing::info!("adding variant {}", id);
                    let mut added = SessionPackage::new(&id);
                    added.selected_reason = "added variant".to_string();
                    to_add.push(added);
                }
            }
        }
        model.package_list.extend(to_add);
        self.write()
    }

    /// Apply a filter predicate, deselecting non-matching packages.
    pub fn filter(&mut self, filter: &SessionFilter) -> A4fResult<usize> {
        self.load(false)?;
        let pool = self.pool;
        let model = self.model.as_mut().unwrap();
        let mut deselected = 0usize;

        for pkg in &mut model.package_list {
            if !pkg.selected {
                continue;
            }
            let keep = match filter {
                SessionFilter::ScoreGt(threshold) => {
                    match_score(pool, &pkg.id()).map(|s| s > *threshold).unwrap_or(false)
                }
                SessionFilter::IncludeExclude { include, exclude } => {
                    let included =
                        include.is_empty() || include.iter().any(|n| *n == pkg.name);
                    included && !exclude.iter().any(|n| *n == pkg.name)
                }
                SessionFilter::OnlyUploaded => pkg.uploaded,
            };
            if !keep {
                pkg.selected = false;
                pkg.selected_reason = format!("filtered out by {filter:?}");
                deselected += 1;
            }
        }
        self.write()?;
        Ok(deselected)
    }

    /// Selected identities in stored order.
    pub fn package_ids(&self) -> Vec<PackageId> {
        self.model
            .as_ref()
            .map(|m| {
                m.package_list
                    .iter()
                    .filter(|p| p.selected)
                    .map(|p| p.id())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_uploaded(&mut self, id: &PackageId, reason: &str) -> A4fResult<()> {
        if let Some(model) = self.model.as_mut() {
            if let Some(pkg) = model.package_list.iter_mut().find(|p| p.id() == *id) {
                pkg.uploaded = true;
                pkg.uploaded_reason = reason.to_string();
            }
        }
        self.write()
    }

    /// CSV overview of the session for auditors.
    pub fn report_csv(&self, dest: &Path) -> A4fResult<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| A4fError::Session("session model not loaded".to_string()))?;
        let mut writer = csv::Writer::from_path(dest).map_err(|e| {
            A4fError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        writer
            .write_record([
                "package",
                "selected",
                "selected reason",
                "uploaded",
                "uploaded reason",
                "match score",
            ])
            .map_err(|e| A4fError::Session(e.to_string()))?;
        for pkg in &model.package_list {
            let score = match_score(self.pool, &pkg.id())
                .map(|s| format!("{s:.1}"))
                .unwrap_or_default();
            writer
                .write_record([
                    format!("{}@{}", pkg.name, pkg.version),
                    csv_mark(pkg.selected),
                    pkg.selected_reason.clone(),
                    csv_mark(pkg.uploaded),
                    pkg.uploaded_reason.clone(),
                    score,
                ])
                .map_err(|e| A4fError::Session(e.to_string()))?;
        }
        writer.flush()?;
        tracing::info!("session report written to {}", dest.display());
        Ok(())
    }
}

fn csv_mark(value: bool) -> String {
    if value { "x".to_string() } else { String::new() }
}

/// Best match score recorded for an identity: snapmatch wins over the
/// current-index matcher when both exist.
fn match_score(pool: &Pool, id: &PackageId) -> Option<f64> {
    for ft in [FileType::Snapmatch, FileType::Alienmatcher] {
        let path = pool.path_typed(ft, id);
        if let Ok(value) = pool.read_json::<serde_json::Value>(&path) {
            if let Some(score) = value
                .get("match")
                .and_then(|m| m.get("score"))
                .and_then(|s| s.as_f64())
            {
                return Some(score);
            }
        }
    }
    None
}

fn random_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| (b'a' + rng.gen_range(0..26)) as char)
        .collect()
}

fn clean_identifier(identifier: &str, hint: &str) -> A4fResult<String> {
    let identifier = identifier.trim().to_lowercase();
    if identifier.is_empty() {
        return Err(A4fError::Session(format!("no {hint} given")));
    }
    if identifier
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.".contains(c))
    {
        Ok(identifier)
    } else {
        Err(A4fError::Session(format!(
            "{hint} '{identifier}' is invalid, only a-z, 0-9, '-', '_' and '.' are allowed"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::new(dir.path().join("pool"), true).unwrap();
        (dir, pool)
    }

    fn seed_package(pool: &Pool, name: &str, version: &str, variant: &str) {
        let id = PackageId::with_variant(name, version, variant);
        pool.write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Overwrite)
            .unwrap();
        pool.write_json_typed(
            FileType::Tinfoilhat,
            &id,
            &serde_json::json!({}),
            IfExists::Overwrite,
        )
        .unwrap();
    }

    #[test]
    fn create_and_reload() {
        let (_dir, pool) = setup();
        let mut session = Session::new(&pool, Some("ci-run-1"), None).unwrap();
        session.create().unwrap();

        let mut reloaded = Session::new(&pool, Some("ci-run-1"), None).unwrap();
        let model = reloaded.load(false).unwrap();
        assert_eq!(model.session_id, "ci-run-1");
    }

    #[test]
    fn populate_joins_aliensrc_and_tinfoilhat() {
        let (_dir, pool) = setup();
        seed_package(&pool, "zlib", "1.2.11-r0", "");
        // acl has an aliensrc but no tinfoilhat
        let acl = PackageId::new("acl", "2.2.53-r0");
        pool.write_typed(FileType::Aliensrc, &acl, b"tar", IfExists::Overwrite)
            .unwrap();

        let mut session = Session::new(&pool, Some("s1"), None).unwrap();
        session.create().unwrap();
        session.populate("*", "*").unwrap();

        let model = session.model.as_ref().unwrap();
        assert_eq!(model.package_list.len(), 2);
        let zlib = model.package_list.iter().find(|p| p.name == "zlib").unwrap();
        assert!(zlib.selected);
        let acl = model.package_list.iter().find(|p| p.name == "acl").unwrap();
        assert!(!acl.selected);
        assert_eq!(acl.selected_reason, "no tinfoilhat found");
    }

    #[test]
    fn add_variants_extends_matching_identities() {
        let (_dir, pool) = setup();
        seed_package(&pool, "zlib", "1.2.11-r0", "aaaa1111");
        seed_package(&pool, "zlib", "1.2.11-r0", "bbbb2222");

        let mut session = Session::new(&pool, Some("s1"), None).unwrap();
        session.create().unwrap();
        session.populate("zlib", "*").unwrap();
        let before = session.model.as_ref().unwrap().package_list.len();
        assert_eq!(before, 2); // both variants found by populate already

        session.add_variants().unwrap();
        assert_eq!(session.model.as_ref().unwrap().package_list.len(), 2);
    }

    #[test]
    fn lock_rejects_other_keys() {
        let (_dir, pool) = setup();
        let mut holder = Session::new(&pool, Some("s1"), Some("key-a".into())).unwrap();
        holder.create().unwrap();
        holder.lock(false).unwrap();

        // intruder cannot write or unlock
        let mut intruder = Session::new(&pool, Some("s1"), Some("key-b".into())).unwrap();
        intruder.load(false).unwrap();
        assert!(matches!(intruder.write(), Err(A4fError::LockConflict(_))));
        assert!(matches!(intruder.unlock(false), Err(A4fError::LockConflict(_))));

        // force unlock wins regardless of key
        intruder.unlock(true).unwrap();
        assert!(holder.stored_lock().is_none());
    }

    #[test]
    fn holder_can_mutate_while_locked() {
        let (_dir, pool) = setup();
        let mut holder = Session::new(&pool, Some("s1"), Some("key-a".into())).unwrap();
        holder.create().unwrap();
        holder.lock(false).unwrap();
        holder.write().unwrap();
        holder.unlock(false).unwrap();
    }

    #[test]
    fn include_exclude_filter() {
        let (_dir, pool) = setup();
        seed_package(&pool, "zlib", "1.2.11-r0", "");
        seed_package(&pool, "acl", "2.2.53-r0", "");

        let mut session = Session::new(&pool, Some("s1"), None).unwrap();
        session.create().unwrap();
        session.populate("*", "*").unwrap();

        let filter = SessionFilter::parse(r#"include-exclude={"exclude":["acl"]}"#).unwrap();
        let deselected = session.filter(&filter).unwrap();
        assert_eq!(deselected, 1);
        let ids = session.package_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].name, "zlib");
    }

    #[test]
    fn filter_parse_errors_are_config_errors() {
        assert!(SessionFilter::parse("bogus").is_err());
        assert!(SessionFilter::parse("score-gt=abc").is_err());
        assert!(matches!(
            SessionFilter::parse("score-gt=50").unwrap(),
            SessionFilter::ScoreGt(_)
        ));
    }
}
