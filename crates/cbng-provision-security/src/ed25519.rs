use std::path::Path;

use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// An Ed25519 public key decoded from its hex form.
#[derive(Debug, Clone)]
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn from_public_key_hex(public_key_hex: &str) -> Result<Self> {
        let bytes = decode_fixed::<32>(public_key_hex, "public key")?;
        let key = VerifyingKey::from_bytes(&bytes).context("invalid Ed25519 public key bytes")?;
        Ok(Self { key })
    }

    /// `Ok(false)` means a well-formed signature that does not match.
    pub fn verify_hex(&self, payload: &[u8], signature_hex: &str) -> Result<bool> {
        let bytes = decode_fixed::<64>(signature_hex, "signature")?;
        let signature = Signature::from_bytes(&bytes);
        Ok(self.key.verify(payload, &signature).is_ok())
    }
}

pub fn verify_ed25519_signature_file(
    path: &Path,
    public_key_hex: &str,
    signature_hex: &str,
) -> Result<bool> {
    let verifier = Ed25519Verifier::from_public_key_hex(public_key_hex)?;
    let payload = std::fs::read(path)
        .with_context(|| format!("failed to read {} for signature check", path.display()))?;
    verifier.verify_hex(&payload, signature_hex)
}

fn decode_fixed<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value.trim())
        .with_context(|| format!("failed to decode Ed25519 {what} hex"))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        anyhow!("invalid Ed25519 {what} length: expected {N} bytes, got {len}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7_u8; 32])
    }

    fn public_key_hex() -> String {
        hex::encode(signing_key().verifying_key().to_bytes())
    }

    fn sign_hex(payload: &[u8]) -> String {
        hex::encode(signing_key().sign(payload).to_bytes())
    }

    #[test]
    fn accepts_signature_over_payload() {
        let verifier = Ed25519Verifier::from_public_key_hex(&public_key_hex()).expect("valid key");
        let verified = verifier
            .verify_hex(b"cluebotng-core", &sign_hex(b"cluebotng-core"))
            .expect("verification must complete");
        assert!(verified);
    }

    #[test]
    fn rejects_signature_for_other_payload() {
        let verifier = Ed25519Verifier::from_public_key_hex(&public_key_hex()).expect("valid key");
        let verified = verifier
            .verify_hex(b"tampered", &sign_hex(b"cluebotng-core"))
            .expect("verification must complete");
        assert!(!verified);
    }

    #[test]
    fn errors_for_malformed_hex_or_length() {
        assert!(Ed25519Verifier::from_public_key_hex("zz").is_err());
        let err = Ed25519Verifier::from_public_key_hex("00").expect_err("short key must fail");
        assert!(err.to_string().contains("expected 32 bytes, got 1"));

        let verifier = Ed25519Verifier::from_public_key_hex(&public_key_hex()).expect("valid key");
        assert!(verifier.verify_hex(b"", "zz").is_err());
        let err = verifier.verify_hex(b"", "00").expect_err("short signature must fail");
        assert!(err.to_string().contains("expected 64 bytes, got 1"));
    }

    #[test]
    fn verifies_file_contents() {
        let path = std::env::temp_dir().join(format!(
            "cbng-provision-security-{}-signed.bin",
            std::process::id()
        ));
        std::fs::write(&path, b"archive bytes").expect("must write sample");

        let ok = verify_ed25519_signature_file(&path, &public_key_hex(), &sign_hex(b"archive bytes"))
            .expect("verification must complete");
        assert!(ok);

        let ok = verify_ed25519_signature_file(&path, &public_key_hex(), &sign_hex(b"other"))
            .expect("verification must complete");
        assert!(!ok);

        let _ = std::fs::remove_file(&path);
    }
}
