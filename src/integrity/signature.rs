use std::io::{self, Write};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::IntegrityError;

type HmacSha256 = Hmac<Sha256>;

/// Incremental HMAC-SHA256 over everything written to it.
pub struct SignatureWriter {
    mac: HmacSha256,
}

impl SignatureWriter {
    pub fn new(key: &[u8]) -> Result<Self, IntegrityError> {
        let mac = HmacSha256::new_from_slice(key).map_err(|_| IntegrityError::InvalidKey)?;
        Ok(Self { mac })
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.mac.update(bytes);
    }

    /// Compare against a hex signature in constant time.
    ///
    /// Either hex casing is accepted. Anything that does not decode as hex
    /// fails the same way a mismatch does.
    pub fn verify(self, signature_hex: &str) -> Result<(), IntegrityError> {
        let expected =
            hex::decode(signature_hex.trim()).map_err(|_| IntegrityError::AuthenticationFailed)?;
        self.mac
            .verify_slice(&expected)
            .map_err(|_| IntegrityError::AuthenticationFailed)
    }

    /// Lowercase hex of the MAC over the bytes written so far.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.mac.finalize().into_bytes())
    }
}

impl Write for SignatureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.mac.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hex HMAC-SHA256 of `payload` under `key`, in the form senders put in `X-Signature`.
pub fn compute_signature(payload: &[u8], key: &[u8]) -> Result<String, IntegrityError> {
    let mut writer = SignatureWriter::new(key)?;
    writer.mac.update(payload);
    Ok(writer.finalize_hex())
}

pub fn verify_signature(payload: &[u8], signature_hex: &str, key: &[u8]) -> bool {
    let Ok(mut writer) = SignatureWriter::new(key) else {
        return false;
    };
    writer.mac.update(payload);
    writer.verify(signature_hex).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"app-key";
    const BODY: &[u8] = br#"[{"event_type":"invoice.created"}]"#;

    #[test]
    fn test_matching_signature_verifies() {
        let signature = compute_signature(BODY, KEY).unwrap();
        assert!(verify_signature(BODY, &signature, KEY));
    }

    #[test]
    fn test_uppercase_hex_verifies() {
        let signature = compute_signature(BODY, KEY).unwrap().to_uppercase();
        assert!(verify_signature(BODY, &signature, KEY));
    }

    #[test]
    fn test_single_bit_flip_in_body_fails() {
        let signature = compute_signature(BODY, KEY).unwrap();
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(!verify_signature(&tampered, &signature, KEY), "byte {i}");
        }
    }

    #[test]
    fn test_single_bit_flip_in_signature_fails() {
        let signature = compute_signature(BODY, KEY).unwrap();
        let mut raw = hex::decode(&signature).unwrap();
        raw[0] ^= 0x80;
        assert!(!verify_signature(BODY, &hex::encode(raw), KEY));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signature = compute_signature(BODY, b"other-key").unwrap();
        assert!(!verify_signature(BODY, &signature, KEY));
    }

    #[test]
    fn test_malformed_signature_fails() {
        assert!(!verify_signature(BODY, "not-hex", KEY));
        assert!(!verify_signature(BODY, "", KEY));
        assert!(!verify_signature(BODY, "abcd", KEY));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut writer = SignatureWriter::new(KEY).unwrap();
        for chunk in BODY.chunks(5) {
            writer.write_all(chunk).unwrap();
        }
        assert_eq!(writer.finalize_hex(), compute_signature(BODY, KEY).unwrap());
    }
}
