//! End-to-end pipeline flow over a synthetic zlib-like package
//!
//! Exercises the offline steps in order: add -> (recorded match) ->
//! delta -> spdxdebian -> spdxalien, all against one temp pool. The
//! network-facing steps are represented by a hand-written SNAPMATCH
//! document and pre-seeded scanner reports, exactly what those steps
//! would have left in the pool.

use std::path::Path;

use a4f::commands::delta::DeltaCmd;
use a4f::commands::spdxalien::SpdxAlienCmd;
use a4f::commands::spdxdebian::SpdxDebianCmd;
use a4f::commands::Command;
use a4f::models::deltacode::DeltaModel;
use a4f::package::add_to_pool;
use a4f::pool::{FileType, IfExists, PackageId, Pool, Relationship};
use a4f::spdx::{LicenseInfo, SpdxDocument};

// ─── fixtures ──────────────────────────────────────────────────────

fn write_tar(dest: &Path, members: &[(&str, &[u8])]) {
    let file = std::fs::File::create(dest).unwrap();
    let mut builder = tar::Builder::new(file);
    for (path, contents) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, *path, *contents).unwrap();
    }
    builder.finish().unwrap();
}

fn sha1_hex(data: &[u8]) -> String {
    use sha1::Digest;
    let mut hasher = sha1::Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

const UPSTREAM_FILES: &[(&str, &[u8])] = &[
    ("adler32.c", b"/* adler32 */ int adler;"),
    ("zlib.h", b"#define ZLIB_VERSION \"1.2.11\""),
    ("zconf.h.in", b"/* zconf template */"),
];

/// The alien source tarball: same content as upstream except one file is
/// new and one upstream file is missing.
fn alien_inner_tar(dir: &Path) -> Vec<u8> {
    let path = dir.join("inner.tar");
    let members: Vec<(String, &[u8])> = UPSTREAM_FILES
        .iter()
        .map(|(name, contents)| (format!("zlib-1.2.11/{name}"), *contents))
        .chain(std::iter::once((
            "zlib-1.2.11/yocto-extras.c".to_string(),
            b"int extras;".as_slice(),
        )))
        .collect();
    let refs: Vec<(&str, &[u8])> = members.iter().map(|(p, c)| (p.as_str(), *c)).collect();
    write_tar(&path, &refs);
    std::fs::read(&path).unwrap()
}

fn write_aliensrc(dest: &Path, inner_tar: &[u8]) {
    let manifest = serde_json::to_vec_pretty(&serde_json::json!({
        "version": 1,
        "source_package": {
            "name": ["zlib"],
            "version": "1.2.11-r0",
            "manager": "bitbake",
            "metadata": {},
            "files": [{
                "name": "zlib-1.2.11.tar",
                "sha1_cksum": sha1_hex(inner_tar),
                "git_sha1": null,
                "src_uri": "https://zlib.net/zlib-1.2.11.tar.xz",
                "files_in_archive": 4
            }]
        }
    }))
    .unwrap();
    write_tar(
        dest,
        &[
            ("aliensrc.json", manifest.as_slice()),
            ("files/zlib-1.2.11.tar", inner_tar),
        ],
    );
}

/// Scanner report for a file list: every `.c`/`.h` file carries the Zlib
/// license and a copyright line.
fn scan_report(root: &str, files: &[(&str, &[u8])]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = files
        .iter()
        .map(|(name, contents)| {
            serde_json::json!({
                "path": format!("{root}/{name}"),
                "type": "file",
                "sha1": sha1_hex(contents),
                "license_expressions": ["Zlib"],
                "copyrights": [{"value": "Copyright (c) 1995-2017 Mark Adler"}]
            })
        })
        .collect();
    serde_json::json!({
        "headers": [{"tool_name": "scancode-toolkit"}],
        "files": entries
    })
}

fn scancode_spdx_doc(files: &[(&str, &[u8])]) -> SpdxDocument {
    let mut doc = SpdxDocument::new("zlib-1.2.11-r0");
    doc.package.name = "zlib".to_string();
    doc.package.spdx_id = "SPDXRef-zlib".to_string();
    for (name, contents) in files {
        doc.package.files.push(a4f::spdx::SpdxFile {
            name: format!("./{name}"),
            spdx_id: a4f::spdx::file_spdx_id(name),
            checksum_sha1: sha1_hex(contents),
            license_concluded: LicenseInfo::Expr("Zlib".to_string()),
            license_info_in_file: vec![LicenseInfo::Expr("Zlib".to_string())],
            copyright_text: "Copyright (c) 1995-2017 Mark Adler".to_string(),
            comment: None,
        });
    }
    doc
}

const DEB_COPYRIGHT: &str = "\
Format: https://www.debian.org/doc/packaging-manuals/copyright-format/1.0/
Upstream-Name: zlib

Files: *
Copyright: 1995-2017 Jean-loup Gailly and Mark Adler
License: Zlib

Files: debian/*
Copyright: 2000 Debian Maintainers
License: GPL-2+
";

const DEB_CONTROL: &str = "\
Source: zlib
Maintainer: Mark Brown <broonie@debian.org>
";

const DEB_CHANGELOG: &str = "\
zlib (1:1.2.11.dfsg-1) unstable; urgency=low

  * Upload.
";

/// Seed the pool with what snapmatch would have downloaded and recorded.
fn seed_debian_match(pool: &Pool, dir: &Path) {
    let deb_dir = Path::new(Relationship::Debian.as_str())
        .join("zlib")
        .join("1.2.11.dfsg-1");

    let orig_local = dir.join("orig.tar");
    let members: Vec<(String, &[u8])> = UPSTREAM_FILES
        .iter()
        .map(|(name, contents)| (format!("zlib-1.2.11.dfsg/{name}"), *contents))
        .collect();
    let refs: Vec<(&str, &[u8])> = members.iter().map(|(p, c)| (p.as_str(), *c)).collect();
    write_tar(&orig_local, &refs);
    let orig_rel = deb_dir.join("zlib_1.2.11.dfsg.orig.tar");
    pool.write(&orig_rel, &std::fs::read(&orig_local).unwrap(), IfExists::Overwrite)
        .unwrap();

    let overlay_local = dir.join("overlay.tar");
    write_tar(
        &overlay_local,
        &[
            ("debian/copyright", DEB_COPYRIGHT.as_bytes()),
            ("debian/control", DEB_CONTROL.as_bytes()),
            ("debian/changelog", DEB_CHANGELOG.as_bytes()),
        ],
    );
    let overlay_rel = deb_dir.join("zlib_1.2.11.dfsg-1.debian.tar");
    pool.write(
        &overlay_rel,
        &std::fs::read(&overlay_local).unwrap(),
        IfExists::Overwrite,
    )
    .unwrap();

    let id = PackageId::new("zlib", "1.2.11-r0");
    let snapmatch = serde_json::json!({
        "tool": {"name": "a4f", "version": "0.8.0"},
        "aliensrc": {"name": "zlib", "version": "1.2.11-r0"},
        "match": {
            "name": "zlib",
            "version": "1.2.11.dfsg-1",
            "score": 99.5,
            "package_score": 100,
            "version_score": 99,
            "debsrc_orig": orig_rel.to_string_lossy(),
            "debsrc_debian": overlay_rel.to_string_lossy(),
            "dsc_format": "3.0 (quilt)"
        },
        "errors": []
    });
    pool.write_json_typed(FileType::Snapmatch, &id, &snapmatch, IfExists::Overwrite)
        .unwrap();
}

fn seed_scans(pool: &Pool, alien_files: &[(&str, &[u8])]) {
    let id = PackageId::new("zlib", "1.2.11-r0");
    let deb_id = PackageId::new("zlib", "1.2.11.dfsg-1");

    let alien_report = scan_report("zlib-1.2.11", alien_files);
    pool.write_json_typed(FileType::ScancodeJson, &id, &alien_report, IfExists::Overwrite)
        .unwrap();
    let debian_report = scan_report("zlib-1.2.11.dfsg", UPSTREAM_FILES);
    let deb_rel = pool.path_typed_in(FileType::ScancodeJson, &deb_id, Relationship::Debian);
    pool.write_json(&deb_rel, &debian_report, IfExists::Overwrite)
        .unwrap();

    let spdx = scancode_spdx_doc(alien_files);
    pool.write_typed(
        FileType::ScancodeSpdx,
        &id,
        spdx.to_tag_value().as_bytes(),
        IfExists::Overwrite,
    )
    .unwrap();
}

// ─── the flow ──────────────────────────────────────────────────────

#[test]
fn add_delta_spdx_flow() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(dir.path().join("pool"), true).unwrap();
    let id = PackageId::new("zlib", "1.2.11-r0");

    // add: the aliensrc lands at its canonical pool path
    let inner = alien_inner_tar(dir.path());
    let aliensrc = dir.path().join("zlib-1.2.11-r0.aliensrc");
    write_aliensrc(&aliensrc, &inner);
    let (package, _) = add_to_pool(&pool, &aliensrc, false).unwrap();
    assert!(pool
        .abspath(Path::new("userland/zlib/1.2.11-r0/zlib-1.2.11-r0.aliensrc"))
        .is_file());
    assert_eq!(package.id.to_string(), "zlib-1.2.11-r0");

    // what the matcher and scanner steps would have produced
    seed_debian_match(&pool, dir.path());
    let alien_files: Vec<(&str, &[u8])> = UPSTREAM_FILES
        .iter()
        .copied()
        .chain(std::iter::once(("yocto-extras.c", b"int extras;".as_slice())))
        .collect();
    seed_scans(&pool, &alien_files);

    // delta: 3 identical files, 1 new file with findings
    let mut delta_cmd = DeltaCmd::new(&pool, false);
    let summary = delta_cmd.execute(std::slice::from_ref(&id)).unwrap();
    assert!(summary.all_ok());

    let delta: DeltaModel = pool
        .read_json(&pool.path_typed(FileType::Deltacode, &id))
        .unwrap();
    let stats = &delta.header.stats;
    assert_eq!(stats.same_files, 3);
    assert_eq!(stats.new_files_with_license_or_copyright, 1);
    assert_eq!(stats.new_files_count, 4);
    assert!((stats.similarity() - 0.75).abs() < 1e-9);

    // spdxdebian: DEP-5 conclusions become per-file LicenseConcluded
    let mut spdxdebian_cmd = SpdxDebianCmd::new(&pool);
    assert!(spdxdebian_cmd.execute(std::slice::from_ref(&id)).unwrap().all_ok());
    let deb_id = PackageId::new("zlib", "1.2.11.dfsg-1");
    let debian_doc = SpdxDocument::parse_tag_value(
        &pool
            .read_text(&pool.path_typed(FileType::DebianSpdx, &deb_id))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(debian_doc.package.files.len(), 3);
    assert!(debian_doc
        .package
        .files
        .iter()
        .all(|f| f.license_concluded == LicenseInfo::Expr("Zlib".into())));

    // spdxalien: similarity 0.75 sits in the middle tier, so the three
    // matched files take the Debian conclusion and the new file keeps
    // only scanner findings
    let mut spdxalien_cmd = SpdxAlienCmd::new(&pool, false);
    assert!(spdxalien_cmd.execute(std::slice::from_ref(&id)).unwrap().all_ok());

    let alien_doc = SpdxDocument::parse_tag_value(
        &pool
            .read_text(&pool.path_typed(FileType::AlienSpdx, &id))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(alien_doc.package.name, "zlib");
    assert_eq!(alien_doc.package.version.as_deref(), Some("1.2.11-r0"));
    assert_eq!(alien_doc.package.files.len(), 4);

    let concluded: Vec<&str> = alien_doc
        .package
        .files
        .iter()
        .filter(|f| f.license_concluded.is_assertion())
        .map(|f| f.bare_name())
        .collect();
    assert_eq!(concluded.len(), 3);
    assert!(!concluded.contains(&"yocto-extras.c"));

    // middle tier: no Debian package-level metadata on the alien document
    assert_eq!(alien_doc.package.license_declared, LicenseInfo::NoAssertion);
}

#[test]
fn cached_delta_is_not_rederived() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(dir.path().join("pool"), true).unwrap();
    let id = PackageId::new("zlib", "1.2.11-r0");

    let inner = alien_inner_tar(dir.path());
    let aliensrc = dir.path().join("zlib-1.2.11-r0.aliensrc");
    write_aliensrc(&aliensrc, &inner);
    add_to_pool(&pool, &aliensrc, false).unwrap();
    seed_debian_match(&pool, dir.path());
    let alien_files: Vec<(&str, &[u8])> = UPSTREAM_FILES.to_vec();
    seed_scans(&pool, &alien_files);

    let mut cmd = DeltaCmd::new(&pool, false);
    cmd.execute(std::slice::from_ref(&id)).unwrap();
    let rel = pool.path_typed(FileType::Deltacode, &id);
    let first = pool.read(&rel).unwrap();

    // rerun with cache on: byte-identical artifact
    cmd.execute(std::slice::from_ref(&id)).unwrap();
    assert_eq!(pool.read(&rel).unwrap(), first);
}

#[test]
fn duplicate_add_requires_force() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::new(dir.path().join("pool"), true).unwrap();

    let inner = alien_inner_tar(dir.path());
    let aliensrc = dir.path().join("zlib-1.2.11-r0.aliensrc");
    write_aliensrc(&aliensrc, &inner);

    add_to_pool(&pool, &aliensrc, false).unwrap();
    assert!(matches!(
        add_to_pool(&pool, &aliensrc, false),
        Err(a4f::A4fError::DuplicatePackage(_))
    ));
    add_to_pool(&pool, &aliensrc, true).unwrap();
}
