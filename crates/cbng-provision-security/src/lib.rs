mod checksum;
mod ed25519;

pub use checksum::{sha256_hex, sha256_hex_file, sha256_hex_reader, verify_sha256_file};
pub use ed25519::{verify_ed25519_signature_file, Ed25519Verifier};
