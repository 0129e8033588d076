//! Content digests.
//!
//! [`model_fingerprint`] is the lookup key into the model descriptor
//! catalog. Its two-tier rule must stay byte-for-byte compatible with the
//! existing catalog files: MD5 over the trailing [`FINGERPRINT_WINDOW`]
//! bytes, or over the whole file when it is shorter than the window.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

/// Size of the trailing window hashed for model fingerprints.
pub const FINGERPRINT_WINDOW: u64 = 10_000 * 1024;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Stream a file through SHA-256 and return its hex digest.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint a model artifact using the default window.
pub fn model_fingerprint(path: &Path) -> std::io::Result<String> {
    model_fingerprint_with_window(path, FINGERPRINT_WINDOW)
}

/// Fingerprint a model artifact over a trailing window of `window` bytes.
pub fn model_fingerprint_with_window(path: &Path, window: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();

    if len >= window {
        // `window` fits in i64 for any realistic configuration.
        file.seek(SeekFrom::End(-(window as i64)))?;
    }

    let mut hasher = Md5::new();
    std::io::copy(&mut (&mut file).take(window), &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
