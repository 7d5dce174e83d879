use anyhow::{anyhow, Context, Result};
use cbng_provision_core::{ArchiveType, ProvisionError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::fs_utils::{entry_exists, remove_dir_all_if_exists};
use crate::runtime::error_chain_has_not_found;
use crate::{CopyReport, ExtractStatus, InstallReport, ProvisionLayout, ProvisionRuntime};

pub const EXECUTABLE_MODE: u32 = 0o555;

pub fn install<R>(
    layout: &ProvisionLayout,
    archive_type: ArchiveType,
    executables: &[String],
    runtime: &mut R,
) -> Result<InstallReport>
where
    R: ProvisionRuntime + ?Sized,
{
    let extract = ensure_extracted(layout, archive_type, runtime)?;
    let copy = copy_payload(&layout.payload_dir(), layout.workspace_dir())?;
    mark_executables(layout.workspace_dir(), executables)?;

    Ok(InstallReport {
        extract,
        copy,
        executables: executables.to_vec(),
    })
}

pub fn ensure_extracted<R>(
    layout: &ProvisionLayout,
    archive_type: ArchiveType,
    runtime: &mut R,
) -> Result<ExtractStatus>
where
    R: ProvisionRuntime + ?Sized,
{
    let sentinel = layout.sentinel_path();
    if sentinel.is_file() {
        info!(sentinel = %sentinel.display(), "archive already extracted, skipping");
        return Ok(ExtractStatus::AlreadyExtracted);
    }

    let staging_dir = layout.staging_dir();
    fs::create_dir_all(staging_dir)
        .with_context(|| format!("failed to create {}", staging_dir.display()))?;

    info!(
        archive = %layout.archive_path().display(),
        staging = %staging_dir.display(),
        archive_type = archive_type.as_str(),
        "extracting archive"
    );
    extract_archive(
        layout.archive_path(),
        staging_dir,
        &layout.deb_scratch_dir(),
        archive_type,
        runtime,
    )?;

    if !sentinel.is_file() {
        return Err(ProvisionError::ArchiveLayout {
            path: sentinel,
            detail: "primary binary missing after extraction".to_string(),
        }
        .into());
    }
    Ok(ExtractStatus::Extracted)
}

pub(crate) fn extract_archive<R>(
    archive_path: &Path,
    staging_dir: &Path,
    deb_scratch_dir: &Path,
    archive_type: ArchiveType,
    runtime: &mut R,
) -> Result<()>
where
    R: ProvisionRuntime + ?Sized,
{
    match archive_type {
        ArchiveType::Deb => extract_deb(archive_path, staging_dir, deb_scratch_dir, runtime),
        ArchiveType::TarGz | ArchiveType::TarXz | ArchiveType::TarZst => runtime.run_command(
            &mut build_tar_extract_command(archive_path, staging_dir),
            "failed to extract tar archive",
        ),
        ArchiveType::Zip => runtime.run_command(
            &mut build_unzip_command(archive_path, staging_dir),
            "failed to extract zip archive",
        ),
    }
}

fn extract_deb<R>(
    archive_path: &Path,
    staging_dir: &Path,
    scratch_dir: &Path,
    runtime: &mut R,
) -> Result<()>
where
    R: ProvisionRuntime + ?Sized,
{
    let mut command = build_dpkg_deb_extract_command(archive_path, staging_dir);
    match runtime.run_command(&mut command, "failed to extract deb archive with dpkg-deb") {
        Ok(()) => Ok(()),
        Err(err) if error_chain_has_not_found(&err) => {
            warn!("dpkg-deb was not found on PATH; falling back to ar + tar");
            extract_deb_with_ar(archive_path, staging_dir, scratch_dir, runtime)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn extract_deb_with_ar<R>(
    archive_path: &Path,
    staging_dir: &Path,
    scratch_dir: &Path,
    runtime: &mut R,
) -> Result<()>
where
    R: ProvisionRuntime + ?Sized,
{
    // ar writes members into its working directory.
    let archive_path = fs::canonicalize(archive_path)
        .with_context(|| format!("failed to resolve {}", archive_path.display()))?;
    remove_dir_all_if_exists(scratch_dir)
        .with_context(|| format!("failed to clear {}", scratch_dir.display()))?;
    fs::create_dir_all(scratch_dir)
        .with_context(|| format!("failed to create {}", scratch_dir.display()))?;

    let unpack_result = (|| {
        runtime.run_command(
            &mut build_ar_extract_command(&archive_path, scratch_dir),
            "failed to unpack deb archive with ar",
        )?;
        let data_member = find_deb_data_member(scratch_dir)?;
        runtime.run_command(
            &mut build_tar_extract_command(&data_member, staging_dir),
            "failed to extract deb data member with tar",
        )
    })();

    let cleanup_result = remove_dir_all_if_exists(scratch_dir);

    match (unpack_result, cleanup_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(unpack_err), Ok(())) => Err(unpack_err),
        (Ok(()), Err(cleanup_err)) => Err(cleanup_err)
            .with_context(|| format!("failed to cleanup {}", scratch_dir.display())),
        (Err(unpack_err), Err(cleanup_err)) => Err(anyhow!(
            "{unpack_err:#}; additionally failed to cleanup {}: {cleanup_err}",
            scratch_dir.display()
        )),
    }
}

pub(crate) fn find_deb_data_member(scratch_dir: &Path) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(scratch_dir)
        .with_context(|| format!("failed to read {}", scratch_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("data.tar") && entry.file_type()?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        ProvisionError::ArchiveLayout {
            path: scratch_dir.join("data.tar.*"),
            detail: "deb archive has no data member".to_string(),
        }
        .into()
    })
}

pub(crate) fn build_dpkg_deb_extract_command(archive_path: &Path, staging_dir: &Path) -> Command {
    let mut command = Command::new("dpkg-deb");
    command.arg("-x").arg(archive_path).arg(staging_dir);
    command
}

pub(crate) fn build_ar_extract_command(archive_path: &Path, scratch_dir: &Path) -> Command {
    let mut command = Command::new("ar");
    command.arg("x").arg(archive_path).current_dir(scratch_dir);
    command
}

pub(crate) fn build_tar_extract_command(archive_path: &Path, dst: &Path) -> Command {
    let mut command = Command::new("tar");
    command.arg("-xf").arg(archive_path).arg("-C").arg(dst);
    command
}

pub(crate) fn build_unzip_command(archive_path: &Path, dst: &Path) -> Command {
    let mut command = Command::new("unzip");
    command.arg("-q").arg("-o").arg(archive_path).arg("-d").arg(dst);
    command
}

/// Copies each top-level entry of `payload_dir` into `workspace_dir` unless
/// an entry with the same name is already there.
pub fn copy_payload(payload_dir: &Path, workspace_dir: &Path) -> Result<CopyReport> {
    match fs::metadata(payload_dir) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(ProvisionError::ArchiveLayout {
                path: payload_dir.to_path_buf(),
                detail: "package payload is not a directory".to_string(),
            }
            .into());
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ProvisionError::ArchiveLayout {
                path: payload_dir.to_path_buf(),
                detail: "package payload directory missing from extracted archive".to_string(),
            }
            .into());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", payload_dir.display()));
        }
    }

    let mut entries = fs::read_dir(payload_dir)
        .with_context(|| format!("failed to read {}", payload_dir.display()))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("failed reading entries of {}", payload_dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut report = CopyReport::default();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let src_path = entry.path();
        let dst_path = workspace_dir.join(entry.file_name());

        if entry_exists(&dst_path)
            .with_context(|| format!("failed to stat {}", dst_path.display()))?
        {
            debug!(entry = %name, "workspace entry exists, skipping copy");
            report.skipped.push(name);
            continue;
        }

        let metadata = match fs::metadata(&src_path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %src_path.display(), "skipping dangling payload symlink");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", src_path.display()));
            }
        };

        if metadata.is_dir() {
            ensure_not_ancestor_link(&src_path, payload_dir)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if metadata.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        } else {
            warn!(path = %src_path.display(), "skipping special file in payload");
            continue;
        }

        debug!(entry = %name, "copied payload entry into workspace");
        report.copied.push(name);
    }

    info!(
        copied = report.copied.len(),
        skipped = report.skipped.len(),
        workspace = %workspace_dir.display(),
        "payload copied"
    );
    Ok(report)
}

/// Copies `src` into `dst`, following symlinks so the copy does not point
/// back into the staging tree.
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    let mut entries = fs::read_dir(src)
        .with_context(|| format!("failed to read {}", src.display()))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("failed reading entries of {}", src.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = match fs::metadata(&src_path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(path = %src_path.display(), "skipping dangling payload symlink");
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", src_path.display()));
            }
        };

        if metadata.is_dir() {
            ensure_not_ancestor_link(&src_path, src)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if metadata.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        } else {
            warn!(path = %src_path.display(), "skipping special file in payload");
        }
    }
    Ok(())
}

/// A directory link that resolves to one of its own ancestors would recurse
/// forever.
fn ensure_not_ancestor_link(link_path: &Path, parent: &Path) -> Result<()> {
    let is_link = fs::symlink_metadata(link_path)
        .with_context(|| format!("failed to stat {}", link_path.display()))?
        .file_type()
        .is_symlink();
    if !is_link {
        return Ok(());
    }

    let target = fs::canonicalize(link_path)
        .with_context(|| format!("failed to resolve {}", link_path.display()))?;
    let parent = fs::canonicalize(parent)
        .with_context(|| format!("failed to resolve {}", parent.display()))?;
    if parent.starts_with(&target) {
        return Err(ProvisionError::ArchiveLayout {
            path: link_path.to_path_buf(),
            detail: format!("symlink loops back to {}", target.display()),
        }
        .into());
    }
    Ok(())
}

/// Applies `EXECUTABLE_MODE` to each named workspace file, whatever its
/// current mode.
pub fn mark_executables(workspace_dir: &Path, names: &[String]) -> Result<()> {
    for name in names {
        let path = workspace_dir.join(name);
        let metadata = fs::metadata(&path).with_context(|| {
            format!(
                "expected executable '{name}' is missing from workspace: {}",
                path.display()
            )
        })?;
        if !metadata.is_file() {
            return Err(anyhow!(
                "expected executable '{name}' is not a regular file: {}",
                path.display()
            ));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            fs::set_permissions(&path, fs::Permissions::from_mode(EXECUTABLE_MODE))
                .with_context(|| format!("failed to set executable mode on {}", path.display()))?;
        }
        debug!(path = %path.display(), "marked executable");
    }
    Ok(())
}
