//! SHA-256 digests for processor checksums and EXPAND dedupe keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Hex SHA-256 of the compact JSON encoding of `value`.
///
/// The encoding is streamed into the hasher. Map keys hash in iteration
/// order, so stable digests need `BTreeMap`-backed values.
pub fn sha256_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut writer = DigestWriter(Sha256::new());
    serde_json::to_writer(&mut writer, value)?;
    Ok(format!("{:x}", writer.0.finalize()))
}

struct DigestWriter(Sha256);

impl std::io::Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
