use std::path::Path;

use anyhow::{Context, Result};
use cbng_provision_core::ProvisionError;
use cbng_provision_security::{verify_ed25519_signature_file, verify_sha256_file};
use tracing::{info, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::{ArchiveVerification, IntegrityExpectation};

/// Hashes the archive and checks it against whatever the config pins.
///
/// A rejected archive is removed so the next run fetches it again.
pub fn verify_archive(
    archive_path: &Path,
    expectation: IntegrityExpectation<'_>,
) -> Result<ArchiveVerification> {
    let expected = expectation.sha256.unwrap_or_default();
    let (checksum_ok, actual) = verify_sha256_file(archive_path, expected)?;

    let checksum_verified = match expectation.sha256 {
        Some(expected) if !checksum_ok => {
            discard_rejected_archive(archive_path);
            return Err(ProvisionError::ChecksumMismatch {
                path: archive_path.to_path_buf(),
                expected: expected.to_ascii_lowercase(),
                actual,
            }
            .into());
        }
        Some(_) => true,
        None => {
            warn!(
                path = %archive_path.display(),
                sha256 = %actual,
                "no sha256 pinned for archive; trusting transport"
            );
            false
        }
    };

    let signature_verified = match (expectation.signature, expectation.public_key) {
        (Some(signature), Some(public_key)) => {
            let ok = verify_ed25519_signature_file(archive_path, public_key, signature)
                .with_context(|| {
                    format!("failed to check signature of {}", archive_path.display())
                })?;
            if !ok {
                discard_rejected_archive(archive_path);
                return Err(ProvisionError::SignatureInvalid {
                    path: archive_path.to_path_buf(),
                }
                .into());
            }
            true
        }
        _ => false,
    };

    info!(
        path = %archive_path.display(),
        sha256 = %actual,
        checksum_verified,
        signature_verified,
        "archive verified"
    );
    Ok(ArchiveVerification {
        sha256: actual,
        checksum_verified,
        signature_verified,
    })
}

fn discard_rejected_archive(archive_path: &Path) {
    if let Err(err) = remove_file_if_exists(archive_path) {
        warn!(path = %archive_path.display(), error = %err, "failed to remove rejected archive");
    }
}
