//! Invocation signatures.
//!
//! `X-Task-Name` alone proves nothing: any caller can set it. Every
//! invocation therefore also carries `X-Task-Signature`, a hex
//! HMAC-SHA256 keyed by the application key over the task name, a newline
//! and the payload. Handlers refuse requests without a valid one.

use crate::integrity::{IntegrityError, SignatureWriter};

fn task_mac(key: &[u8], name: &str, payload: &[u8]) -> Result<SignatureWriter, IntegrityError> {
    let mut writer = SignatureWriter::new(key)?;
    writer.update(name.as_bytes());
    writer.update(b"\n");
    writer.update(payload);
    Ok(writer)
}

/// Hex signature for one invocation of task `name`.
pub fn sign_task(key: &[u8], name: &str, payload: &[u8]) -> Result<String, IntegrityError> {
    Ok(task_mac(key, name, payload)?.finalize_hex())
}

/// Constant-time check of an invocation signature.
///
/// Task names never contain a newline; one that does could shift bytes
/// across the separator, so it is refused outright.
pub fn verify_task(key: &[u8], name: &str, payload: &[u8], signature_hex: &str) -> bool {
    if name.contains('\n') {
        return false;
    }
    task_mac(key, name, payload).is_ok_and(|mac| mac.verify(signature_hex).is_ok())
}
