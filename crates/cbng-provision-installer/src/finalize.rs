use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use cbng_provision_core::ProvisionError;
use tracing::info;

use crate::ProvisionLayout;

/// Removes the staging tree and archive, then drops the package marker.
///
/// Both intermediates must still exist; finding either gone means something
/// else touched the pipeline's paths.
pub fn finalize(layout: &ProvisionLayout) -> Result<()> {
    remove_staging_dir(layout.staging_dir())?;
    remove_archive(layout.archive_path())?;
    write_package_marker(layout)?;
    Ok(())
}

fn remove_staging_dir(staging_dir: &Path) -> Result<()> {
    match fs::symlink_metadata(staging_dir) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(missing("staging directory", staging_dir)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(missing("staging directory", staging_dir));
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to stat staging dir: {}", staging_dir.display()));
        }
    }
    fs::remove_dir_all(staging_dir)
        .with_context(|| format!("failed to remove staging dir: {}", staging_dir.display()))?;
    info!(path = %staging_dir.display(), "removed staging directory");
    Ok(())
}

fn remove_archive(archive_path: &Path) -> Result<()> {
    match fs::remove_file(archive_path) {
        Ok(()) => {
            info!(path = %archive_path.display(), "removed archive");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(missing("archive file", archive_path))
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove archive: {}", archive_path.display())),
    }
}

/// Fails if the marker directory already exists.
pub fn write_package_marker(layout: &ProvisionLayout) -> Result<()> {
    let marker_dir = layout.marker_dir();
    if let Some(parent) = marker_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::create_dir(&marker_dir).with_context(|| {
        format!(
            "failed to create package marker dir: {}",
            marker_dir.display()
        )
    })?;

    let marker_path = layout.marker_path();
    File::create(&marker_path)
        .with_context(|| format!("failed to create package marker: {}", marker_path.display()))?;
    info!(path = %marker_path.display(), "wrote package marker");
    Ok(())
}

fn missing(what: &str, path: &Path) -> anyhow::Error {
    ProvisionError::InconsistentState {
        what: what.to_string(),
        path: path.to_path_buf(),
    }
    .into()
}
