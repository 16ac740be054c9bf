//! Audit-state harvesting and final SPDX production
//!
//! After the auditors have worked an upload, two artifacts come back into
//! the pool: the FOSSY_JSON snapshot of the clearing state, and the final
//! SPDX. The server's SPDX export loses the alien package metadata and
//! still carries deprecated license identifiers and upload-rooted file
//! paths, so both are repaired before the document is persisted.

use serde_json::json;

use crate::config::Settings;
use crate::fossy::client::ClearingClient;
use crate::fossy::upload::upload_name;
use crate::models::fossy::FossyModel;
use crate::package::AlienPackage;
use crate::pool::{FileType, IfExists, PackageId, Pool};
use crate::spdx::{repair_license_id, LicenseInfo, SpdxDocument};
use crate::{A4fError, A4fResult};

/// Snapshot the clearing state of one upload into a FOSSY_JSON document.
pub fn fetch_audit_state(
    client: &dyn ClearingClient,
    pool: &Pool,
    settings: &Settings,
    package: &AlienPackage,
) -> A4fResult<FossyModel> {
    let name = upload_name(package);
    let upload = client.find_upload(&name)?.ok_or_else(|| {
        A4fError::NotFound(format!("{name} has not been uploaded to the clearing server"))
    })?;

    tracing::info!("[{name}] fetching summary and license findings");
    let summary = client.summary(upload.id)?;
    let licenses = client.licenses(upload.id)?;

    let mut metadata = serde_json::Map::new();
    metadata.insert("name".to_string(), json!(package.id.name));
    metadata.insert("version".to_string(), json!(package.id.version));
    if !package.id.variant.is_empty() {
        metadata.insert("variant".to_string(), json!(package.id.variant));
    }

    let model = FossyModel {
        origin: settings.fossy_server.clone(),
        metadata,
        summary,
        licenses,
    };
    pool.write_json_typed(FileType::FossyJson, &package.id, &model, IfExists::Overwrite)?;
    Ok(model)
}

/// Strip the upload-root prefix the clearing server adds to file paths and
/// re-anchor them at `./`.
fn canonicalize_path(path: &str, upload_name: &str, rootfolder: &str) -> String {
    let mut p = path.trim_start_matches("./");
    for prefix in [upload_name, rootfolder] {
        if prefix.is_empty() {
            continue;
        }
        if let Some(rest) = p.strip_prefix(prefix) {
            p = rest.trim_start_matches('/');
        }
    }
    format!("./{p}")
}

fn repair_expression(info: &LicenseInfo) -> LicenseInfo {
    match info {
        LicenseInfo::Expr(expr) => {
            let repaired: Vec<String> = expr
                .split_whitespace()
                .map(|token| {
                    let stripped = token.trim_matches(|c| c == '(' || c == ')');
                    if stripped.is_empty() || matches!(stripped, "AND" | "OR" | "WITH") {
                        token.to_string()
                    } else {
                        token.replace(stripped, &repair_license_id(stripped))
                    }
                })
                .collect();
            LicenseInfo::Expr(repaired.join(" "))
        }
        other => other.clone(),
    }
}

/// Build the final SPDX for a cleared upload: download the server's
/// export, repair identifiers and paths, then re-attach the alien
/// package-level metadata the import dropped.
pub fn produce_final_spdx(
    client: &dyn ClearingClient,
    pool: &Pool,
    package: &mut AlienPackage,
) -> A4fResult<SpdxDocument> {
    let name = upload_name(package);
    let upload = client.find_upload(&name)?.ok_or_else(|| {
        A4fError::NotFound(format!("{name} has not been uploaded to the clearing server"))
    })?;

    tracing::info!("[{name}] generating SPDX report on the clearing server");
    let report_text = client.spdx_report(upload.id)?;
    let mut doc = SpdxDocument::parse_tag_value(&report_text)?;

    package.expand(false, false, true)?;
    let rootfolder = package
        .main_internal_archive()
        .and_then(|a| a.rootfolder.clone())
        .unwrap_or_default();

    for file in &mut doc.package.files {
        file.name = canonicalize_path(&file.name, &name, &rootfolder);
        file.spdx_id = crate::spdx::file_spdx_id(&file.name);
        file.license_concluded = repair_expression(&file.license_concluded);
        file.license_info_in_file = file
            .license_info_in_file
            .iter()
            .map(repair_expression)
            .collect();
    }
    doc.package.license_concluded = repair_expression(&doc.package.license_concluded);
    doc.package.license_declared = repair_expression(&doc.package.license_declared);

    // the server drops alien package metadata on import; re-attach it from
    // the alien SPDX when present, and always restore the identity fields
    let alien_spdx_rel = pool.path_typed(
        FileType::AlienSpdx,
        &PackageId::new(&package.id.name, &package.id.version),
    );
    if let Ok(text) = pool.read_text(&alien_spdx_rel) {
        if let Ok(alien_doc) = SpdxDocument::parse_tag_value(&text) {
            doc.package.supplier = alien_doc.package.supplier.clone();
            doc.package.originator = alien_doc.package.originator.clone();
            doc.package.download_location = alien_doc.package.download_location.clone();
            doc.package.homepage = alien_doc.package.homepage.clone();
            if doc.package.license_declared == LicenseInfo::NoAssertion {
                doc.package.license_declared = alien_doc.package.license_declared.clone();
            }
        }
    }
    doc.package.name = package.id.name.clone();
    doc.package.version = Some(package.id.version.clone());
    doc.package.file_name = Some(package.archive_name.clone());
    doc.package.spdx_id = format!("SPDXRef-{}-{}", package.id.name, package.id.version);
    doc.name = format!("{}-{}", package.id.name, package.id.version);
    doc.package.verification_code = doc.package.calc_verification_code();

    let out = doc.to_tag_value();
    pool.write_typed(
        FileType::FinalSpdx,
        &package.id,
        out.as_bytes(),
        IfExists::Overwrite,
    )?;
    tracing::info!("[{name}] final SPDX written to the pool");
    Ok(doc)
}

/// CycloneDX 1.5 rendering of a final SPDX document, for consumers that
/// want an SBOM instead of the SPDX tag-value file.
pub fn render_cyclonedx(doc: &SpdxDocument, package: &AlienPackage) -> A4fResult<String> {
    let components: Vec<serde_json::Value> = doc
        .package
        .files
        .iter()
        .filter(|f| f.license_concluded.is_assertion())
        .map(|f| {
            json!({
                "type": "file",
                "name": f.bare_name(),
                "hashes": [{"alg": "SHA-1", "content": f.checksum_sha1}],
                "licenses": [{"expression": f.license_concluded.as_tag_value()}],
            })
        })
        .collect();

    let sbom = json!({
        "bomFormat": "CycloneDX",
        "specVersion": "1.5",
        "version": 1,
        "serialNumber": format!("urn:uuid:{}", uuid::Uuid::new_v4()),
        "metadata": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "tools": [{
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }],
            "component": {
                "type": "library",
                "name": package.id.name,
                "version": package.id.version,
                "purl": format!("pkg:generic/{}@{}", package.id.name, package.id.version),
                "licenses": match &doc.package.license_declared {
                    LicenseInfo::Expr(expr) => json!([{"expression": expr}]),
                    _ => json!([]),
                }
            }
        },
        "components": components,
        "dependencies": []
    });
    Ok(serde_json::to_string_pretty(&sbom)?)
}

/// Write the SBOM next to the final SPDX.
pub fn write_sbom(pool: &Pool, package: &AlienPackage, doc: &SpdxDocument) -> A4fResult<()> {
    let rendered = render_cyclonedx(doc, package)?;
    let rel = std::path::Path::new("userland")
        .join(&package.id.name)
        .join(&package.id.version)
        .join(format!(
            "{}-{}.cyclonedx.json",
            package.id.name, package.id.version
        ));
    pool.write(&rel, rendered.as_bytes(), IfExists::Overwrite)?;
    tracing::info!("[{}] SBOM written to {}", package.id, rel.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_canonicalization() {
        assert_eq!(
            canonicalize_path("acl@2.2.53-r0/acl-2.2.53/COPYING", "acl@2.2.53-r0", "acl-2.2.53"),
            "./COPYING"
        );
        assert_eq!(
            canonicalize_path("src/main.c", "acl@2.2.53-r0", ""),
            "./src/main.c"
        );
        assert_eq!(canonicalize_path("./already.c", "x", ""), "./already.c");
    }

    #[test]
    fn expression_repair_handles_parens() {
        let info = LicenseInfo::Expr("(GPL-2.0 OR LGPL-2.1+) AND MIT".to_string());
        assert_eq!(
            repair_expression(&info),
            LicenseInfo::Expr("(GPL-2.0-only OR LGPL-2.1-or-later) AND MIT".to_string())
        );
        assert_eq!(
            repair_expression(&LicenseInfo::NoAssertion),
            LicenseInfo::NoAssertion
        );
    }
}
