//! DEP-5 `debian/copyright` to SPDX extraction
//!
//! Reads the Debian source triple (upstream tarball + packaging overlay),
//! parses the machine-readable copyright file plus `debian/control` and
//! `debian/changelog`, and produces an SPDX document where every file
//! matched by a `Files:` stanza carries the stanza's license as
//! LicenseConcluded. Debian license shortnames are mapped to SPDX
//! identifiers; unknown shortnames become `LicenseRef-` extracted licenses
//! with the stand-alone paragraph text attached.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::archive::Archive;
use crate::deb822::{field, parse_deb822};
use crate::spdx::{
    file_spdx_id, ExtractedLicense, LicenseInfo, SpdxDocument, SpdxFile, SpdxPackage,
};
use crate::{A4fError, A4fResult};

// ─── DEP-5 model ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CopyrightHeader {
    pub upstream_name: Option<String>,
    pub upstream_contact: Option<String>,
    pub license: Option<LicenseField>,
    pub copyright: Option<String>,
    pub comment: Option<String>,
}

/// A DEP-5 `License:` field: the first line is the expression synopsis,
/// any folded continuation is the license text itself.
#[derive(Debug, Clone, Default)]
pub struct LicenseField {
    pub synopsis: String,
    pub text: Option<String>,
}

impl LicenseField {
    fn parse(raw: &str) -> Self {
        match raw.split_once('\n') {
            Some((synopsis, text)) => LicenseField {
                synopsis: synopsis.trim().to_string(),
                text: Some(text.to_string()),
            },
            None => LicenseField {
                synopsis: raw.trim().to_string(),
                text: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilesParagraph {
    pub patterns: Vec<String>,
    pub copyright: String,
    pub license: LicenseField,
}

impl FilesParagraph {
    /// DEP-5 wildcards: `*` matches anything including `/`, `?` a single
    /// character; everything else is literal.
    pub fn matcher(&self) -> A4fResult<Regex> {
        let mut alternatives = Vec::new();
        for pattern in &self.patterns {
            let mut regex = String::from("^");
            for c in pattern.chars() {
                match c {
                    '*' => regex.push_str(".*"),
                    '?' => regex.push('.'),
                    c => regex.push_str(&regex::escape(&c.to_string())),
                }
            }
            regex.push('$');
            alternatives.push(regex);
        }
        Regex::new(&alternatives.join("|"))
            .map_err(|e| A4fError::CorruptInput(format!("bad DEP-5 files pattern: {e}")))
    }

    pub fn is_catchall(&self) -> bool {
        self.patterns == ["*"]
    }
}

#[derive(Debug, Clone, Default)]
pub struct LicenseParagraph {
    pub synopsis: String,
    pub text: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DebCopyright {
    pub header: CopyrightHeader,
    pub files: Vec<FilesParagraph>,
    pub licenses: Vec<LicenseParagraph>,
}

const DEP5_FORMAT_MARKER: &str = "packaging-manuals/copyright-format/1.0";

impl DebCopyright {
    /// Parse a machine-readable `debian/copyright`. A missing or foreign
    /// `Format:` header means the file is not DEP-5.
    pub fn parse(text: &str) -> A4fResult<Self> {
        let stanzas = parse_deb822(text);
        let header_stanza = stanzas.first().ok_or_else(|| {
            A4fError::CorruptInput("debian/copyright is empty".to_string())
        })?;
        let format = field(header_stanza, "Format")
            .or_else(|| field(header_stanza, "Format-Specification"))
            .unwrap_or("");
        if !format.contains(DEP5_FORMAT_MARKER) {
            return Err(A4fError::CorruptInput(
                "debian/copyright is not machine readable (no DEP-5 Format header)".to_string(),
            ));
        }

        let header = CopyrightHeader {
            upstream_name: field(header_stanza, "Upstream-Name").map(str::to_string),
            upstream_contact: field(header_stanza, "Upstream-Contact")
                .map(|c| c.lines().next().unwrap_or("").trim().to_string()),
            license: field(header_stanza, "License").map(LicenseField::parse),
            copyright: field(header_stanza, "Copyright").map(str::to_string),
            comment: field(header_stanza, "Comment").map(str::to_string),
        };

        let mut files = Vec::new();
        let mut licenses = Vec::new();
        for stanza in &stanzas[1..] {
            if let Some(patterns) = field(stanza, "Files") {
                let license_raw = field(stanza, "License").ok_or_else(|| {
                    A4fError::CorruptInput(
                        "DEP-5 Files paragraph without a License field".to_string(),
                    )
                })?;
                files.push(FilesParagraph {
                    patterns: patterns.split_whitespace().map(str::to_string).collect(),
                    copyright: field(stanza, "Copyright").unwrap_or("").to_string(),
                    license: LicenseField::parse(license_raw),
                });
            } else if let Some(license_raw) = field(stanza, "License") {
                let parsed = LicenseField::parse(license_raw);
                licenses.push(LicenseParagraph {
                    synopsis: parsed.synopsis,
                    text: parsed.text.unwrap_or_default(),
                    comment: field(stanza, "Comment").map(str::to_string),
                });
            }
        }

        Ok(DebCopyright {
            header,
            files,
            licenses,
        })
    }
}

// ─── License shortname mapping ─────────────────────────────────────

/// DEP-5 shortnames (lowercase) that differ from their SPDX identifier.
static DEB2SPDX_IDENTIFIERS: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("apache", "Apache-1.0"),
        ("artistic", "Artistic-1.0"),
        ("cc-by", "CC-BY-1.0"),
        ("cc-by-sa", "CC-BY-SA-1.0"),
        ("cc-by-nd", "CC-BY-ND-1.0"),
        ("cc-by-nc", "CC-BY-NC-1.0"),
        ("cc-by-nc-sa", "CC-BY-NC-SA-1.0"),
        ("cc-by-nc-nd", "CC-BY-NC-ND-1.0"),
        ("cc0", "CC0-1.0"),
        ("cddl", "CDDL-1.0"),
        ("cpl", "CPL-1.0"),
        ("efl", "EFL-1.0"),
        ("expat", "MIT"),
        ("gpl", "GPL-1.0-only"),
        ("gpl-1.0", "GPL-1.0-only"),
        ("gpl-1", "GPL-1.0-only"),
        ("gpl-1.0+", "GPL-1.0-or-later"),
        ("gpl-1+", "GPL-1.0-or-later"),
        ("gpl-2.0", "GPL-2.0-only"),
        ("gpl-2", "GPL-2.0-only"),
        ("gpl-2.0+", "GPL-2.0-or-later"),
        ("gpl-2+", "GPL-2.0-or-later"),
        ("gpl-3.0", "GPL-3.0-only"),
        ("gpl-3", "GPL-3.0-only"),
        ("gpl-3.0+", "GPL-3.0-or-later"),
        ("gpl-3+", "GPL-3.0-or-later"),
        ("lgpl", "LGPL-2.0-only"),
        ("lgpl-2.0", "LGPL-2.0-only"),
        ("lgpl-2", "LGPL-2.0-only"),
        ("lgpl-2.0+", "LGPL-2.0-or-later"),
        ("lgpl-2+", "LGPL-2.0-or-later"),
        ("lgpl-2.1", "LGPL-2.1-only"),
        ("lgpl-2.1+", "LGPL-2.1-or-later"),
        ("lgpl-3.0", "LGPL-3.0-only"),
        ("lgpl-3", "LGPL-3.0-only"),
        ("lgpl-3.0+", "LGPL-3.0-or-later"),
        ("lgpl-3+", "LGPL-3.0-or-later"),
        ("gfdl", "GFDL-1.1-only"),
        ("gfdl-1.1", "GFDL-1.1-only"),
        ("gfdl-1.1+", "GFDL-1.1-or-later"),
        ("gfdl-1.2", "GFDL-1.2-only"),
        ("gfdl-1.2+", "GFDL-1.2-or-later"),
        ("gfdl-1.3", "GFDL-1.3-only"),
        ("gfdl-1.3+", "GFDL-1.3-or-later"),
        ("lppl", "LPPL-1.0"),
        ("mpl", "MPL-1.1"),
        ("perl", "Artistic-1.0-Perl"),
        ("python", "Python-2.0"),
        ("qpl", "QPL-1.0"),
        ("zope-1.1", "ZPL-1.1"),
        ("zope-2.0", "ZPL-2.0"),
        ("zope-2.1", "ZPL-2.1"),
    ])
});

/// SPDX identifiers commonly seen verbatim in debian/copyright, keyed by
/// lowercase form.
static KNOWN_SPDX_IDS: Lazy<BTreeMap<String, &'static str>> = Lazy::new(|| {
    [
        "MIT",
        "ISC",
        "Zlib",
        "X11",
        "OpenSSL",
        "curl",
        "Apache-1.0",
        "Apache-1.1",
        "Apache-2.0",
        "Artistic-1.0",
        "Artistic-1.0-Perl",
        "Artistic-2.0",
        "BSD-2-Clause",
        "BSD-3-Clause",
        "BSD-4-Clause",
        "BSL-1.0",
        "CC0-1.0",
        "CC-BY-1.0",
        "CC-BY-3.0",
        "CC-BY-4.0",
        "CC-BY-SA-1.0",
        "CC-BY-SA-3.0",
        "CC-BY-SA-4.0",
        "CDDL-1.0",
        "CPL-1.0",
        "EFL-1.0",
        "EPL-1.0",
        "EPL-2.0",
        "GFDL-1.1-only",
        "GFDL-1.1-or-later",
        "GFDL-1.2-only",
        "GFDL-1.2-or-later",
        "GFDL-1.3-only",
        "GFDL-1.3-or-later",
        "GPL-1.0-only",
        "GPL-1.0-or-later",
        "GPL-2.0-only",
        "GPL-2.0-or-later",
        "GPL-3.0-only",
        "GPL-3.0-or-later",
        "LGPL-2.0-only",
        "LGPL-2.0-or-later",
        "LGPL-2.1-only",
        "LGPL-2.1-or-later",
        "LGPL-3.0-only",
        "LGPL-3.0-or-later",
        "LPPL-1.0",
        "MPL-1.1",
        "MPL-2.0",
        "PSF-2.0",
        "Python-2.0",
        "QPL-1.0",
        "Unlicense",
        "WTFPL",
        "ZPL-1.1",
        "ZPL-2.0",
        "ZPL-2.1",
    ]
    .into_iter()
    .map(|id| (id.to_lowercase(), id))
    .collect()
});

/// Convert a DEP-5 shortname into an SPDX identifier, if one exists.
pub fn spdx_id_for_shortname(shortname: &str) -> Option<String> {
    let lower = shortname.to_lowercase();
    let mapped = DEB2SPDX_IDENTIFIERS.get(lower.as_str()).copied();
    let candidate = mapped.unwrap_or(shortname);
    KNOWN_SPDX_IDS
        .get(&candidate.to_lowercase())
        .map(|id| id.to_string())
}

/// Convert a DEP-5 license expression into an SPDX expression, e.g.
/// `GPL-2+ or Artistic-2.0, and BSD-3-clause` becomes
/// `(GPL-2.0-or-later OR Artistic-2.0) AND BSD-3-Clause`.
/// Returns the expression and every atom it mentions.
pub fn deb_to_spdx_expr(deb_expr: &str) -> (String, Vec<String>) {
    let mut expr = deb_expr.split_whitespace().collect::<Vec<_>>().join(" ");
    expr = expr
        .replace(" or ", " OR ")
        .replace(" and ", " AND ")
        .replace(" with ", "-with-")
        .replace(" exception", "-exception")
        .replace(" Exception", "-exception");
    if expr.contains(',') {
        expr = format!("( {}", expr.replace(',', " ) "));
    }

    let mut atoms = Vec::new();
    let elements: Vec<String> = expr
        .split_whitespace()
        .map(|token| {
            if matches!(token, "(" | ")" | "OR" | "AND") {
                return token.to_string();
            }
            let resolved = spdx_id_for_shortname(token).unwrap_or_else(|| {
                format!("LicenseRef-{}", token.replace('+', "-or-later"))
            });
            atoms.push(resolved.clone());
            resolved
        })
        .collect();

    let expr = elements.join(" ").replace("( ", "(").replace(" )", ")");
    (expr, atoms)
}

/// Default extracted text for `LicenseRef-public-domain`.
const PUBLIC_DOMAIN_TEXT: &str = "Public domain software is software that is not copyrighted. \
If the source code is in the public domain, that is a special case of noncopylefted free \
software, which means that some copies or modified versions may not be free at all. \
Under the Berne Convention anything written down is automatically copyrighted, so a program \
in the public domain must carry an explicit disclaimer of copyright.";

// ─── Debian2Spdx ───────────────────────────────────────────────────

/// Extracts an SPDX document from a Debian source package.
pub struct Debian2Spdx {
    orig: Archive,
    overlay: Archive,
    /// Prefix inside the overlay archive where `debian/` lives: empty for
    /// quilt overlays, `<rootdir>/` for native single-tarball sources.
    overlay_prefix: String,
}

impl Debian2Spdx {
    /// Quilt/1.0 layout: separate upstream tarball and packaging overlay.
    pub fn new(debsrc_orig: &std::path::Path, debsrc_debian: Option<&std::path::Path>) -> A4fResult<Self> {
        let orig = Archive::open(debsrc_orig)?;
        match debsrc_debian {
            Some(overlay_path) => Ok(Debian2Spdx {
                orig,
                overlay: Archive::open(overlay_path)?,
                overlay_prefix: String::new(),
            }),
            None => {
                // 3.0 (native): the one tarball carries debian/ inside its
                // root folder
                let overlay = Archive::open(debsrc_orig)?;
                let root = overlay.rootfolder()?;
                let overlay_prefix = if root.is_empty() {
                    String::new()
                } else {
                    format!("{root}/")
                };
                Ok(Debian2Spdx {
                    orig,
                    overlay,
                    overlay_prefix,
                })
            }
        }
    }

    fn read_overlay(&self, name: &str) -> A4fResult<String> {
        let member = format!("{}{name}", self.overlay_prefix);
        let bytes = self.overlay.read_member(&member).or_else(|_| {
            // some overlays carry an extra leading "debian/" root
            self.overlay.read_member(name)
        })?;
        String::from_utf8(bytes)
            .map_err(|_| A4fError::CorruptInput(format!("{name} is not UTF-8")))
    }

    /// Raw `debian/copyright` text, for manual inspection when the DEP-5
    /// parse fails.
    pub fn raw_copyright(&self) -> A4fResult<String> {
        self.read_overlay("debian/copyright")
    }

    /// Run the whole extraction.
    pub fn generate(&self) -> A4fResult<SpdxDocument> {
        let copyright_text = self.raw_copyright().map_err(|_| {
            A4fError::NotFound("no debian/copyright in debian source package".to_string())
        })?;
        let copyright = DebCopyright::parse(&copyright_text)?;

        let control_text = self.read_overlay("debian/control")?;
        let control = parse_deb822(&control_text);
        let source_stanza = control
            .iter()
            .find(|s| field(s, "Source").is_some())
            .cloned()
            .or_else(|| control.first().cloned())
            .unwrap_or_default();

        let changelog = self.read_overlay("debian/changelog")?;
        let (pkg_name, pkg_version) = parse_changelog_head(&changelog)?;
        let upstream_version = pkg_version
            .rsplit_once('-')
            .map(|(u, _)| u)
            .unwrap_or(&pkg_version);
        // epoch is part of the version, never of file names
        let upstream_version = upstream_version
            .split_once(':')
            .map(|(_, rest)| rest)
            .unwrap_or(upstream_version)
            .to_string();

        // one SPDX file per upstream file, keyed by root-stripped path
        let checksums = self.orig.checksums("")?;
        let mut files: BTreeMap<String, SpdxFile> = BTreeMap::new();
        for (path, sha1) in &checksums {
            files.insert(
                path.clone(),
                SpdxFile {
                    name: path.clone(),
                    spdx_id: file_spdx_id(path),
                    checksum_sha1: sha1.clone(),
                    license_concluded: LicenseInfo::NoAssertion,
                    license_info_in_file: vec![LicenseInfo::NoAssertion],
                    copyright_text: String::new(),
                    comment: None,
                },
            );
        }

        let mut extracted: BTreeMap<String, ExtractedLicense> = BTreeMap::new();
        let mut catchall: Option<&FilesParagraph> = None;

        for paragraph in &copyright.files {
            let (expr, atoms) = deb_to_spdx_expr(&paragraph.license.synopsis);
            for atom in &atoms {
                self.collect_extracted(atom, &paragraph.license, &copyright, &mut extracted);
            }
            let matcher = paragraph.matcher()?;
            for (path, file) in files.iter_mut() {
                if matcher.is_match(path) {
                    file.license_concluded = LicenseInfo::Expr(expr.clone());
                    if !paragraph.is_catchall() {
                        file.copyright_text = paragraph.copyright.clone();
                    }
                }
            }
            if paragraph.is_catchall() {
                // copyright info in a catchall paragraph belongs to the
                // package, not to every single file
                catchall = Some(paragraph);
            }
        }

        // package-level license: header, else the catchall paragraph
        let package_license = copyright
            .header
            .license
            .as_ref()
            .or(catchall.map(|c| &c.license))
            .ok_or_else(|| {
                A4fError::CorruptInput("no license declared in debian/copyright".to_string())
            })?;
        let (package_expr, package_atoms) = deb_to_spdx_expr(&package_license.synopsis);
        for atom in &package_atoms {
            self.collect_extracted(atom, package_license, &copyright, &mut extracted);
        }

        let package_copyright = copyright
            .header
            .copyright
            .clone()
            .or_else(|| catchall.map(|c| c.copyright.clone()).filter(|c| !c.is_empty()))
            .ok_or_else(|| {
                A4fError::CorruptInput("no copyright declared in debian/copyright".to_string())
            })?;

        let maintainer = field(&source_stanza, "Maintainer").unwrap_or("");
        let pool_subdir = if pkg_name.starts_with("lib") {
            &pkg_name[..4.min(pkg_name.len())]
        } else {
            &pkg_name[..1.min(pkg_name.len())]
        };
        let file_name = format!("{pkg_name}_{upstream_version}.orig.tar.xz");

        let mut package = SpdxPackage {
            name: pkg_name.clone(),
            spdx_id: format!("SPDXRef-{pkg_name}-{upstream_version}"),
            version: Some(upstream_version.clone()),
            file_name: Some(file_name.clone()),
            supplier: Some(format!("Organization: {maintainer}")),
            originator: copyright
                .header
                .upstream_name
                .as_ref()
                .map(|n| match &copyright.header.upstream_contact {
                    Some(c) => format!("Organization: {n} ({c})"),
                    None => format!("Organization: {n}"),
                }),
            download_location: Some(format!(
                "http://deb.debian.org/debian/pool/main/{pool_subdir}/{pkg_name}/{file_name}"
            )),
            homepage: field(&source_stanza, "Homepage").map(str::to_string),
            files_analyzed: true,
            verification_code: String::new(),
            license_concluded: LicenseInfo::Expr(package_expr.clone()),
            license_declared: LicenseInfo::Expr(package_expr),
            license_info_from_files: Vec::new(),
            copyright_text: package_copyright,
            comment: copyright.header.comment.clone(),
            files: Vec::new(),
        };

        for (_, mut file) in files {
            file.name = format!("./{}", file.name);
            package.files.push(file);
        }
        package.verification_code = package.calc_verification_code();

        let mut doc = SpdxDocument::new(&format!("{pkg_name}-{upstream_version}"));
        doc.creator_comment = Some(format!(
            "This document was created using license information from debian source \
             package {pkg_name}-{pkg_version}"
        ));
        doc.package = package;
        doc.extracted_licenses = extracted.into_values().collect();
        Ok(doc)
    }

    /// Register an extracted license for a `LicenseRef-` atom, pulling its
    /// text from the inline field, a stand-alone paragraph, or the
    /// public-domain default.
    fn collect_extracted(
        &self,
        atom: &str,
        inline: &LicenseField,
        copyright: &DebCopyright,
        extracted: &mut BTreeMap<String, ExtractedLicense>,
    ) {
        if !atom.starts_with("LicenseRef-") || extracted.contains_key(atom) {
            return;
        }
        let shortname = atom
            .trim_start_matches("LicenseRef-")
            .replace("-or-later", "+");
        let standalone = copyright
            .licenses
            .iter()
            .find(|p| p.synopsis.eq_ignore_ascii_case(&shortname));

        let (text, comment) = if let Some(text) = inline.text.clone().filter(|t| !t.is_empty()) {
            (text, None)
        } else if let Some(paragraph) = standalone {
            (paragraph.text.clone(), paragraph.comment.clone())
        } else if atom.eq_ignore_ascii_case("LicenseRef-public-domain") {
            (PUBLIC_DOMAIN_TEXT.to_string(), None)
        } else {
            tracing::warn!("no license text found for {atom} in debian/copyright");
            (format!("License text for {shortname} not provided."), None)
        };

        extracted.insert(
            atom.to_string(),
            ExtractedLicense {
                license_id: atom.to_string(),
                extracted_text: text,
                name: Some(shortname),
                comment,
            },
        );
    }
}

/// `package (version) distribution; urgency=...`
fn parse_changelog_head(changelog: &str) -> A4fResult<(String, String)> {
    let head = changelog
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| A4fError::CorruptInput("debian/changelog is empty".to_string()))?;
    let name = head.split_whitespace().next().unwrap_or("").to_string();
    let version = head
        .split('(')
        .nth(1)
        .and_then(|rest| rest.split(')').next())
        .map(str::to_string)
        .ok_or_else(|| {
            A4fError::CorruptInput("debian/changelog head carries no version".to_string())
        })?;
    if name.is_empty() {
        return Err(A4fError::CorruptInput(
            "debian/changelog head carries no package name".to_string(),
        ));
    }
    Ok((name, version))
}
