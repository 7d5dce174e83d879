use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::{FetchStatus, ProvisionRuntime};

/// Downloads `url` to `archive_path` unless a regular file is already there.
///
/// The body lands in `<name>.part` first and is renamed into place only after
/// the transfer succeeds.
pub fn ensure_archive_present<R>(
    url: &str,
    archive_path: &Path,
    runtime: &mut R,
) -> Result<FetchStatus>
where
    R: ProvisionRuntime + ?Sized,
{
    match fs::metadata(archive_path) {
        Ok(metadata) if metadata.is_file() => {
            info!(path = %archive_path.display(), "archive already present, skipping download");
            return Ok(FetchStatus::CacheHit);
        }
        Ok(_) => {
            return Err(anyhow!(
                "archive path exists but is not a regular file: {}",
                archive_path.display()
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to inspect {}", archive_path.display()));
        }
    }

    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create archive dir: {}", parent.display()))?;
    }

    let part_path = archive_path.with_file_name(format!(
        "{}.part",
        archive_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("archive")
    ));
    remove_file_if_exists(&part_path)
        .with_context(|| format!("failed to clear stale {}", part_path.display()))?;

    info!(url, path = %archive_path.display(), "downloading archive");
    let bytes = match runtime.download(url, &part_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if let Err(cleanup_err) = remove_file_if_exists(&part_path) {
                warn!(path = %part_path.display(), error = %cleanup_err, "failed to remove partial download");
            }
            return Err(err).with_context(|| format!("failed to download {url}"));
        }
    };

    fs::rename(&part_path, archive_path).with_context(|| {
        format!(
            "failed to move downloaded archive into place: {}",
            archive_path.display()
        )
    })?;

    info!(bytes, path = %archive_path.display(), "archive downloaded");
    Ok(FetchStatus::Downloaded { bytes })
}
