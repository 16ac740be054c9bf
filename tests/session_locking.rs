//! Session lifecycle and locking across process boundaries
//!
//! Two `Session` values over the same pool stand in for two pipeline
//! processes; the lock token on disk is the only thing between them.

use a4f::pool::{FileType, IfExists, PackageId, Pool};
use a4f::session::{Session, SessionFilter};
use a4f::A4fError;

fn seeded_pool(dir: &tempfile::TempDir) -> Pool {
    let pool = Pool::new(dir.path().join("pool"), true).unwrap();
    for (name, version) in [("zlib", "1.2.11-r0"), ("acl", "2.2.53-r0"), ("xz", "5.2.4-r0")] {
        let id = PackageId::new(name, version);
        pool.write_typed(FileType::Aliensrc, &id, b"tar", IfExists::Overwrite)
            .unwrap();
        pool.write_json_typed(
            FileType::Tinfoilhat,
            &id,
            &serde_json::json!({"recipe": {"metadata": {"name": name}}}),
            IfExists::Overwrite,
        )
        .unwrap();
    }
    pool
}

#[test]
fn populate_then_filter_then_report() {
    let dir = tempfile::tempdir().unwrap();
    let pool = seeded_pool(&dir);

    let mut session = Session::new(&pool, Some("release-1"), None).unwrap();
    session.create().unwrap();
    session.populate("*", "*").unwrap();
    assert_eq!(session.package_ids().len(), 3);

    let filter = SessionFilter::parse(r#"include-exclude={"exclude":["xz"]}"#).unwrap();
    session.filter(&filter).unwrap();
    let ids = session.package_ids();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.name != "xz"));

    let report = dir.path().join("report.csv");
    session.report_csv(&report).unwrap();
    let csv = std::fs::read_to_string(&report).unwrap();
    assert!(csv.lines().count() >= 4); // header + 3 packages
    assert!(csv.contains("zlib@1.2.11-r0"));
}

#[test]
fn lock_holder_wins_intruder_loses() {
    let dir = tempfile::tempdir().unwrap();
    let pool = seeded_pool(&dir);

    let mut holder = Session::new(&pool, Some("nightly"), Some("build-7".into())).unwrap();
    holder.create().unwrap();
    holder.populate("zlib", "*").unwrap();
    holder.lock(false).unwrap();

    // every mutating operation with a different key is rejected
    let mut intruder = Session::new(&pool, Some("nightly"), Some("build-8".into())).unwrap();
    intruder.load(false).unwrap();
    assert!(matches!(
        intruder.populate("*", "*"),
        Err(A4fError::LockConflict(_))
    ));
    assert!(matches!(intruder.unlock(false), Err(A4fError::LockConflict(_))));

    // a keyless observer cannot mutate either
    let mut observer = Session::new(&pool, Some("nightly"), None).unwrap();
    observer.load(false).unwrap();
    assert!(matches!(observer.write(), Err(A4fError::LockConflict(_))));

    // the holder keeps working, then releases
    holder.populate("acl", "*").unwrap();
    holder.unlock(false).unwrap();
    intruder.populate("*", "*").unwrap();
}

#[test]
fn force_unlock_ignores_the_stored_key() {
    let dir = tempfile::tempdir().unwrap();
    let pool = seeded_pool(&dir);

    let mut holder = Session::new(&pool, Some("nightly"), Some("build-7".into())).unwrap();
    holder.create().unwrap();
    holder.lock(false).unwrap();

    let intruder = Session::new(&pool, Some("nightly"), Some("anything".into())).unwrap();
    intruder.unlock(true).unwrap();
    assert!(holder.stored_lock().is_none());
}

#[test]
fn add_variants_picks_up_new_pool_entries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = seeded_pool(&dir);

    let mut session = Session::new(&pool, Some("variants"), None).unwrap();
    session.create().unwrap();
    session.populate("zlib", "*").unwrap();
    assert_eq!(session.package_ids().len(), 1);

    // a second build drops a variant of the same (name, version)
    let variant = PackageId::with_variant("zlib", "1.2.11-r0", "deadbeef");
    pool.write_typed(FileType::Aliensrc, &variant, b"tar2", IfExists::Overwrite)
        .unwrap();
    pool.write_json_typed(
        FileType::Tinfoilhat,
        &variant,
        &serde_json::json!({"recipe": {"metadata": {"name": "zlib"}}}),
        IfExists::Overwrite,
    )
    .unwrap();

    session.add_variants().unwrap();
    let ids = session.package_ids();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().any(|id| id.variant == "deadbeef"));
}
