//! Upload orchestration for the clearing server
//!
//! The upload payload is the `files/` subtree of the `.aliensrc`,
//! repacked as a `.tar.xz` with no leading directory so the server
//! unpacks the source paths directly under the upload root. Upload names
//! are `<name>@<version>`; an existing upload with that name is reused
//! instead of re-transferred.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Settings;
use crate::fossy::client::{wait_for_jobs, ClearingClient};
use crate::package::AlienPackage;
use crate::pool::{FileType, Pool};
use crate::{A4fError, A4fResult};

/// Deterministic upload name for an identity (a subset of purl).
pub fn upload_name(package: &AlienPackage) -> String {
    format!("{}@{}", package.id.name, package.id.version)
}

/// Repack the `.aliensrc` `files/` subtree into `dest` as `.tar.xz`,
/// entries rooted at the top level.
pub fn repack_files_subtree(package: &AlienPackage, dest: &Path) -> A4fResult<()> {
    let staging = tempfile::tempdir()?;
    package.archive.extract(staging.path())?;
    // extract() strips the leading component, so `files/x` landed at `x`
    // already when the archive has the canonical aliensrc layout; when the
    // manifest rode along at top level it is not part of files/ and must
    // not be uploaded
    let manifest = staging.path().join("aliensrc.json");
    let _ = std::fs::remove_file(manifest);

    let out = File::create(dest)?;
    let encoder = xz2::write::XzEncoder::new(out, 6);
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", staging.path())?;
    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(A4fError::Io)?;
    Ok(())
}

/// Upload one package: reuse an existing upload when the name already
/// exists, otherwise transfer the repacked payload, then make sure the
/// scanner agents are scheduled. Returns the upload id and whether a
/// transfer actually happened.
pub fn upload_package(
    client: &dyn ClearingClient,
    package: &mut AlienPackage,
) -> A4fResult<(u64, bool)> {
    let name = upload_name(package);
    package.expand(false, false, false)?;

    if let Some(existing) = client.find_upload(&name)? {
        tracing::info!(
            "[{name}] already uploaded (id {}), skipping file transfer",
            existing.id
        );
        return Ok((existing.id, false));
    }

    let staging = tempfile::tempdir()?;
    let tarball = staging.path().join(format!("{name}.tar.xz"));
    repack_files_subtree(package, &tarball)?;

    let description = package
        .metadata
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or("")
        .to_string();
    let upload_id = client.upload(&name, &tarball, &description)?;
    tracing::info!("[{name}] uploaded with id {upload_id}");

    client.schedule_agents(upload_id)?;
    tracing::info!("[{name}] scanner agents scheduled, waiting for completion");
    wait_for_jobs(client, upload_id)?;
    Ok((upload_id, true))
}

/// Convert the alien SPDX tag-value document to RDF/XML with the external
/// SPDX tool and import it, turning its concluded licenses into decisions
/// on the clearing server.
pub fn import_alien_spdx(
    client: &dyn ClearingClient,
    pool: &Pool,
    settings: &Settings,
    package: &AlienPackage,
    upload_id: u64,
) -> A4fResult<()> {
    let id = &package.id;
    let spdx_rel = pool.path_typed(
        FileType::AlienSpdx,
        &crate::pool::PackageId::new(&id.name, &id.version),
    );
    if !pool.exists(&spdx_rel) {
        tracing::info!("[{id}] no alien SPDX in the pool, nothing to import");
        return Ok(());
    }

    let tv_path = pool.abspath(&spdx_rel);
    let rdf_path = tv_path.with_extension("rdf.xml");
    convert_tag_value_to_rdf(settings, &tv_path, &rdf_path)?;

    client.import_spdx(upload_id, &rdf_path)?;
    wait_for_jobs(client, upload_id)?;
    tracing::info!("[{id}] SPDX report imported into upload {upload_id}");
    Ok(())
}

/// `SPDX_TOOLS_CMD <in> <out>`; exit code 0 on success, never retried.
pub fn convert_tag_value_to_rdf(
    settings: &Settings,
    input: &Path,
    output: &Path,
) -> A4fResult<PathBuf> {
    let mut parts = settings.spdx_tools_cmd.split_whitespace();
    let program = parts.next().ok_or_else(|| {
        A4fError::Config("SPDX_TOOLS_CMD is empty".to_string())
    })?;
    let args: Vec<&str> = parts.collect();

    tracing::debug!(
        "converting {} to RDF/XML via {}",
        input.display(),
        settings.spdx_tools_cmd
    );
    let result = Command::new(program)
        .args(&args)
        .arg(input)
        .arg(output)
        .output()
        .map_err(|e| A4fError::SubprocessFailure(format!("cannot start SPDX tool: {e}")))?;
    if !result.status.success() {
        return Err(A4fError::SubprocessFailure(format!(
            "SPDX tool exited with {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr)
        )));
    }
    Ok(output.to_path_buf())
}
