use std::io::{self, Write};

use sha2::{Digest, Sha256};

/// Unkeyed SHA-256 over everything written to it.
#[derive(Default)]
pub struct DigestWriter {
    hasher: Sha256,
}

impl DigestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hex SHA-256 of the application key, safe to echo back to senders.
pub fn key_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_known_input() {
        let mut writer = DigestWriter::new();
        writer.write_all(b"abc").unwrap();
        assert_eq!(
            writer.finalize_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_key_hash_is_stable_hex() {
        let hash = key_hash("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
