//! Minimal SPDX 2.2 document model with tag-value reader and writer
//!
//! Carries exactly what the pipeline needs: one package, its files with
//! SHA-1 checksums, concluded/in-file license assertions, copyright texts,
//! and `LicenseRef-` extracted licenses. The tag-value twin format is what
//! the scanner emits and what the clearing server imports and exports.

pub mod alien;
pub mod debian;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{A4fError, A4fResult};

/// SHA-1 of the empty file; such entries never witness a file move.
pub const EMPTY_FILE_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

// ─── License identifiers ───────────────────────────────────────────

/// Deprecated or misspelled SPDX identifiers and their canonical forms.
static LICENSE_ID_REPAIR: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("GPL-1.0", "GPL-1.0-only"),
        ("GPL-1.0+", "GPL-1.0-or-later"),
        ("GPL-2.0", "GPL-2.0-only"),
        ("GPL-2.0+", "GPL-2.0-or-later"),
        ("GPL-3.0", "GPL-3.0-only"),
        ("GPL-3.0+", "GPL-3.0-or-later"),
        ("LGPL-2.0", "LGPL-2.0-only"),
        ("LGPL-2.0+", "LGPL-2.0-or-later"),
        ("LGPL-2.1", "LGPL-2.1-only"),
        ("LGPL-2.1+", "LGPL-2.1-or-later"),
        ("LGPL-3.0", "LGPL-3.0-only"),
        ("LGPL-3.0+", "LGPL-3.0-or-later"),
        ("LPGL-2.1-or-later", "LGPL-2.1-or-later"),
    ])
});

/// Map a deprecated SPDX identifier to its canonical spelling.
pub fn repair_license_id(id: &str) -> String {
    LICENSE_ID_REPAIR
        .get(id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Normalize a license token for set comparison: whitespace collapsed,
/// deprecated ids repaired. `NOASSERTION`/`NONE` normalize to empty.
pub fn normalize_license_id(id: &str) -> Option<String> {
    let collapsed: String = id.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty()
        || collapsed.eq_ignore_ascii_case("NOASSERTION")
        || collapsed.eq_ignore_ascii_case("NONE")
    {
        return None;
    }
    Some(repair_license_id(&collapsed))
}

/// A license slot: a real expression or one of the two SPDX sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseInfo {
    NoAssertion,
    None,
    Expr(String),
}

impl LicenseInfo {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "NOASSERTION" | "" => LicenseInfo::NoAssertion,
            "NONE" => LicenseInfo::None,
            other => LicenseInfo::Expr(other.to_string()),
        }
    }

    pub fn as_tag_value(&self) -> String {
        match self {
            LicenseInfo::NoAssertion => "NOASSERTION".to_string(),
            LicenseInfo::None => "NONE".to_string(),
            LicenseInfo::Expr(e) => e.clone(),
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, LicenseInfo::Expr(_))
    }
}

impl Default for LicenseInfo {
    fn default() -> Self {
        LicenseInfo::NoAssertion
    }
}

// ─── Document parts ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpdxFile {
    /// `./`-prefixed path relative to the package root.
    pub name: String,
    pub spdx_id: String,
    pub checksum_sha1: String,
    #[serde(default)]
    pub license_concluded: LicenseInfo,
    #[serde(default)]
    pub license_info_in_file: Vec<LicenseInfo>,
    /// Copyright text, or the NOASSERTION/NONE sentinels verbatim.
    #[serde(default)]
    pub copyright_text: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl SpdxFile {
    /// Path with the leading `./` stripped, for map lookups.
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix("./").unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedLicense {
    /// `LicenseRef-` prefixed identifier.
    pub license_id: String,
    pub extracted_text: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpdxPackage {
    pub name: String,
    pub spdx_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub originator: Option<String>,
    #[serde(default)]
    pub download_location: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default = "default_true")]
    pub files_analyzed: bool,
    #[serde(default)]
    pub verification_code: String,
    #[serde(default)]
    pub license_concluded: LicenseInfo,
    #[serde(default)]
    pub license_declared: LicenseInfo,
    #[serde(default)]
    pub license_info_from_files: Vec<LicenseInfo>,
    #[serde(default)]
    pub copyright_text: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub files: Vec<SpdxFile>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpdxDocument {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub creators: Vec<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub creator_comment: Option<String>,
    pub package: SpdxPackage,
    #[serde(default)]
    pub extracted_licenses: Vec<ExtractedLicense>,
}

/// Deterministic SPDXRef for a file path.
pub fn file_spdx_id(name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(name.as_bytes());
    format!("SPDXRef-file-{}", hex::encode(hasher.finalize()))
}

impl SpdxPackage {
    /// SPDX package verification code: sha1 over the sorted list of file
    /// sha1 values.
    pub fn calc_verification_code(&self) -> String {
        use sha1::{Digest as _, Sha1};
        let mut sums: Vec<&str> = self.files.iter().map(|f| f.checksum_sha1.as_str()).collect();
        sums.sort_unstable();
        let mut hasher = Sha1::new();
        for s in sums {
            hasher.update(s.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl SpdxDocument {
    pub fn new(name: &str) -> Self {
        SpdxDocument {
            name: name.to_string(),
            namespace: format!(
                "http://spdx.org/spdxdocs/{name}-{}",
                uuid::Uuid::new_v4()
            ),
            creators: vec![format!(
                "Tool: {}-{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )],
            created: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            creator_comment: None,
            package: SpdxPackage::default(),
            extracted_licenses: Vec::new(),
        }
    }

    // ── Tag-value writer ───────────────────────────────────────────

    pub fn to_tag_value(&self) -> String {
        let mut out = String::new();
        let mut tag = |name: &str, value: &str| {
            if value.contains('\n') {
                let _ = writeln!(out, "{name}: <text>{value}</text>");
            } else {
                let _ = writeln!(out, "{name}: {value}");
            }
        };

        tag("SPDXVersion", "SPDX-2.2");
        tag("DataLicense", "CC0-1.0");
        tag("SPDXID", "SPDXRef-DOCUMENT");
        tag("DocumentName", &self.name);
        tag("DocumentNamespace", &self.namespace);
        for creator in &self.creators {
            tag("Creator", creator);
        }
        tag("Created", &self.created);
        if let Some(comment) = &self.creator_comment {
            tag("CreatorComment", comment);
        }

        let p = &self.package;
        tag("PackageName", &p.name);
        tag("SPDXID", &p.spdx_id);
        if let Some(v) = &p.version {
            tag("PackageVersion", v);
        }
        if let Some(f) = &p.file_name {
            tag("PackageFileName", f);
        }
        if let Some(s) = &p.supplier {
            tag("PackageSupplier", s);
        }
        if let Some(o) = &p.originator {
            tag("PackageOriginator", o);
        }
        tag(
            "PackageDownloadLocation",
            p.download_location.as_deref().unwrap_or("NOASSERTION"),
        );
        tag(
            "FilesAnalyzed",
            if p.files_analyzed { "true" } else { "false" },
        );
        if !p.verification_code.is_empty() {
            tag("PackageVerificationCode", &p.verification_code);
        }
        if let Some(h) = &p.homepage {
            tag("PackageHomePage", h);
        }
        tag("PackageLicenseConcluded", &p.license_concluded.as_tag_value());
        for l in &p.license_info_from_files {
            tag("PackageLicenseInfoFromFiles", &l.as_tag_value());
        }
        tag("PackageLicenseDeclared", &p.license_declared.as_tag_value());
        tag(
            "PackageCopyrightText",
            if p.copyright_text.is_empty() {
                "NOASSERTION"
            } else {
                &p.copyright_text
            },
        );
        if let Some(c) = &p.comment {
            tag("PackageComment", c);
        }

        for file in &p.files {
            tag("FileName", &file.name);
            tag("SPDXID", &file.spdx_id);
            let sha1 = if file.checksum_sha1.is_empty() {
                EMPTY_FILE_SHA1
            } else {
                &file.checksum_sha1
            };
            tag("FileChecksum", &format!("SHA1: {sha1}"));
            tag("LicenseConcluded", &file.license_concluded.as_tag_value());
            if file.license_info_in_file.is_empty() {
                tag("LicenseInfoInFile", "NOASSERTION");
            } else {
                for l in &file.license_info_in_file {
                    tag("LicenseInfoInFile", &l.as_tag_value());
                }
            }
            tag(
                "FileCopyrightText",
                if file.copyright_text.is_empty() {
                    "NONE"
                } else {
                    &file.copyright_text
                },
            );
            if let Some(c) = &file.comment {
                tag("FileComment", c);
            }
        }

        for lic in &self.extracted_licenses {
            tag("LicenseID", &lic.license_id);
            tag("ExtractedText", &lic.extracted_text);
            if let Some(n) = &lic.name {
                tag("LicenseName", n);
            }
            if let Some(c) = &lic.comment {
                tag("LicenseComment", c);
            }
        }

        out
    }

    // ── Tag-value parser ───────────────────────────────────────────

    /// Parse a tag-value document. Tolerant of unknown tags; strict about
    /// structure (exactly one package expected).
    pub fn parse_tag_value(text: &str) -> A4fResult<SpdxDocument> {
        let mut doc = SpdxDocument::default();
        let mut in_package = false;
        let mut current_file: Option<SpdxFile> = None;
        let mut current_license: Option<ExtractedLicense> = None;

        for (tag, value) in TagValueLines::new(text) {
            match tag.as_str() {
                "DocumentName" => doc.name = value,
                "DocumentNamespace" => doc.namespace = value,
                "Creator" => doc.creators.push(value),
                "Created" => doc.created = value,
                "CreatorComment" => doc.creator_comment = Some(value),
                "PackageName" => {
                    if in_package {
                        return Err(A4fError::Spdx(
                            "multiple packages in tag-value document".to_string(),
                        ));
                    }
                    in_package = true;
                    doc.package.name = value;
                }
                "SPDXID" => {
                    if let Some(file) = current_file.as_mut() {
                        file.spdx_id = value;
                    } else if in_package && doc.package.spdx_id.is_empty() {
                        doc.package.spdx_id = value;
                    }
                }
                "PackageVersion" => doc.package.version = Some(value),
                "PackageFileName" => doc.package.file_name = Some(value),
                "PackageSupplier" => doc.package.supplier = Some(value),
                "PackageOriginator" => doc.package.originator = Some(value),
                "PackageDownloadLocation" => doc.package.download_location = Some(value),
                "PackageHomePage" => doc.package.homepage = Some(value),
                "FilesAnalyzed" => doc.package.files_analyzed = value != "false",
                "PackageVerificationCode" => doc.package.verification_code = value,
                "PackageLicenseConcluded" => {
                    doc.package.license_concluded = LicenseInfo::parse(&value)
                }
                "PackageLicenseDeclared" => {
                    doc.package.license_declared = LicenseInfo::parse(&value)
                }
                "PackageLicenseInfoFromFiles" => doc
                    .package
                    .license_info_from_files
                    .push(LicenseInfo::parse(&value)),
                "PackageCopyrightText" => doc.package.copyright_text = value,
                "PackageComment" => doc.package.comment = Some(value),
                "FileName" => {
                    if let Some(file) = current_file.take() {
                        doc.package.files.push(file);
                    }
                    current_file = Some(SpdxFile {
                        name: value,
                        ..SpdxFile::default()
                    });
                }
                "FileChecksum" => {
                    if let Some(file) = current_file.as_mut() {
                        if let Some(sha1) = value.strip_prefix("SHA1:") {
                            file.checksum_sha1 = sha1.trim().to_string();
                        }
                    }
                }
                "LicenseConcluded" => {
                    if let Some(file) = current_file.as_mut() {
                        file.license_concluded = LicenseInfo::parse(&value);
                    }
                }
                "LicenseInfoInFile" => {
                    if let Some(file) = current_file.as_mut() {
                        file.license_info_in_file.push(LicenseInfo::parse(&value));
                    }
                }
                "FileCopyrightText" => {
                    if let Some(file) = current_file.as_mut() {
                        file.copyright_text = value;
                    }
                }
                "FileComment" => {
                    if let Some(file) = current_file.as_mut() {
                        file.comment = Some(value);
                    }
                }
                "LicenseID" => {
                    if let Some(file) = current_file.take() {
                        doc.package.files.push(file);
                    }
                    if let Some(lic) = current_license.take() {
                        doc.extracted_licenses.push(lic);
                    }
                    current_license = Some(ExtractedLicense {
                        license_id: value,
                        ..ExtractedLicense::default()
                    });
                }
                "ExtractedText" => {
                    if let Some(lic) = current_license.as_mut() {
                        lic.extracted_text = value;
                    }
                }
                "LicenseName" => {
                    if let Some(lic) = current_license.as_mut() {
                        lic.name = Some(value);
                    }
                }
                "LicenseComment" => {
                    if let Some(lic) = current_license.as_mut() {
                        lic.comment = Some(value);
                    }
                }
                _ => {}
            }
        }
        if let Some(file) = current_file.take() {
            doc.package.files.push(file);
        }
        if let Some(lic) = current_license.take() {
            doc.extracted_licenses.push(lic);
        }
        if doc.package.name.is_empty() {
            return Err(A4fError::Spdx(
                "tag-value document carries no package".to_string(),
            ));
        }
        Ok(doc)
    }
}

/// Iterator over `Tag: value` pairs, joining `<text>...</text>` blocks that
/// span lines.
struct TagValueLines<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> TagValueLines<'a> {
    fn new(text: &'a str) -> Self {
        TagValueLines { lines: text.lines() }
    }
}

impl<'a> Iterator for TagValueLines<'a> {
    type Item = (String, String);

    fn next(&mut self) -> Option<(String, String)> {
        loop {
            let line = self.lines.next()?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (tag, rest) = match line.split_once(':') {
                Some((t, r)) => (t.trim().to_string(), r.trim_start()),
                None => continue,
            };
            if let Some(start) = rest.strip_prefix("<text>") {
                if let Some(inner) = start.strip_suffix("</text>") {
                    return Some((tag, inner.to_string()));
                }
                let mut value = start.to_string();
                for cont in self.lines.by_ref() {
                    if let Some(inner) = cont.trim_end().strip_suffix("</text>") {
                        value.push('\n');
                        value.push_str(inner);
                        return Some((tag, value));
                    }
                    value.push('\n');
                    value.push_str(cont);
                }
                return Some((tag, value));
            }
            return Some((tag, rest.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> SpdxDocument {
        let mut doc = SpdxDocument::new("zlib-1.2.11-r0");
        doc.package = SpdxPackage {
            name: "zlib".to_string(),
            spdx_id: "SPDXRef-zlib-1.2.11-r0".to_string(),
            version: Some("1.2.11-r0".to_string()),
            license_concluded: LicenseInfo::Expr("Zlib".to_string()),
            license_declared: LicenseInfo::Expr("Zlib".to_string()),
            copyright_text: "Copyright (c) 1995-2017 Jean-loup Gailly\nand Mark Adler"
                .to_string(),
            ..SpdxPackage::default()
        };
        doc.package.files.push(SpdxFile {
            name: "./adler32.c".to_string(),
            spdx_id: file_spdx_id("./adler32.c"),
            checksum_sha1: "e1cb0d5c92da8e9a8c2635dfa249c341dfd00322".to_string(),
            license_concluded: LicenseInfo::Expr("Zlib".to_string()),
            license_info_in_file: vec![LicenseInfo::Expr("Zlib".to_string())],
            copyright_text: "Copyright (c) 1995 Mark Adler".to_string(),
            comment: None,
        });
        doc.extracted_licenses.push(ExtractedLicense {
            license_id: "LicenseRef-zlib-acknowledgement".to_string(),
            extracted_text: "line one\nline two".to_string(),
            name: None,
            comment: None,
        });
        doc.package.verification_code = doc.package.calc_verification_code();
        doc
    }

    #[test]
    fn tag_value_roundtrip() {
        let doc = sample_doc();
        let text = doc.to_tag_value();
        let parsed = SpdxDocument::parse_tag_value(&text).unwrap();

        assert_eq!(parsed.name, doc.name);
        assert_eq!(parsed.package.name, "zlib");
        assert_eq!(parsed.package.version.as_deref(), Some("1.2.11-r0"));
        assert_eq!(parsed.package.files.len(), 1);
        let file = &parsed.package.files[0];
        assert_eq!(file.bare_name(), "adler32.c");
        assert_eq!(file.license_concluded, LicenseInfo::Expr("Zlib".into()));
        assert_eq!(file.checksum_sha1, "e1cb0d5c92da8e9a8c2635dfa249c341dfd00322");
        // multi-line copyright survives the <text> wrapping
        assert!(parsed.package.copyright_text.contains('\n'));
        assert_eq!(parsed.extracted_licenses.len(), 1);
        assert_eq!(
            parsed.extracted_licenses[0].extracted_text,
            "line one\nline two"
        );
    }

    #[test]
    fn sentinels_parse_to_variants() {
        assert_eq!(LicenseInfo::parse("NOASSERTION"), LicenseInfo::NoAssertion);
        assert_eq!(LicenseInfo::parse("NONE"), LicenseInfo::None);
        assert_eq!(
            LicenseInfo::parse("MIT OR Apache-2.0"),
            LicenseInfo::Expr("MIT OR Apache-2.0".into())
        );
    }

    #[test]
    fn deprecated_ids_are_repaired() {
        assert_eq!(repair_license_id("GPL-2.0"), "GPL-2.0-only");
        assert_eq!(repair_license_id("LGPL-2.1+"), "LGPL-2.1-or-later");
        assert_eq!(repair_license_id("MIT"), "MIT");
    }

    #[test]
    fn normalization_drops_sentinels() {
        assert_eq!(normalize_license_id("NOASSERTION"), None);
        assert_eq!(normalize_license_id("none"), None);
        assert_eq!(normalize_license_id(" GPL-2.0 "), Some("GPL-2.0-only".into()));
    }

    #[test]
    fn verification_code_is_order_independent() {
        let mut a = sample_doc();
        a.package.files.push(SpdxFile {
            name: "./zlib.h".to_string(),
            checksum_sha1: "0000000000000000000000000000000000000001".to_string(),
            ..SpdxFile::default()
        });
        let code1 = a.package.calc_verification_code();
        a.package.files.reverse();
        assert_eq!(code1, a.package.calc_verification_code());
    }
}
