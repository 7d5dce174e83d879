use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn sha256_hex_reader<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buf)
            .context("failed reading data for sha256")?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_hex_file(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open {} for sha256", path.display()))?;
    sha256_hex_reader(BufReader::new(file))
        .with_context(|| format!("failed to hash {}", path.display()))
}

/// Returns the actual digest alongside the comparison result so callers can
/// report both sides of a mismatch.
pub fn verify_sha256_file(path: &Path, expected_hex: &str) -> Result<(bool, String)> {
    let actual = sha256_hex_file(path)?;
    let matches = actual.eq_ignore_ascii_case(expected_hex.trim());
    Ok((matches, actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn sha256_hex_matches_known_vectors() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
        assert_eq!(sha256_hex(b"abc"), ABC_SHA256);
    }

    #[test]
    fn reader_digest_matches_slice_digest_across_buffer_boundary() {
        let payload = vec![0x5a_u8; 64 * 1024 + 17];
        let from_reader = sha256_hex_reader(payload.as_slice()).expect("reader must hash");
        assert_eq!(from_reader, sha256_hex(&payload));
    }

    #[test]
    fn verify_file_is_case_insensitive_and_reports_actual() {
        let path = std::env::temp_dir().join(format!(
            "cbng-provision-security-{}-checksum.bin",
            std::process::id()
        ));
        fs::write(&path, b"abc").expect("must write sample");

        let (ok, actual) =
            verify_sha256_file(&path, &ABC_SHA256.to_ascii_uppercase()).expect("must hash");
        assert!(ok);
        assert_eq!(actual, ABC_SHA256);

        let (ok, actual) = verify_sha256_file(&path, EMPTY_SHA256).expect("must hash");
        assert!(!ok);
        assert_eq!(actual, ABC_SHA256);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn verify_file_errors_for_missing_path() {
        let missing = std::env::temp_dir().join("cbng-provision-security-missing.bin");
        let err = verify_sha256_file(&missing, EMPTY_SHA256).expect_err("missing file must fail");
        assert!(err.to_string().contains("failed to open"));
    }
}
