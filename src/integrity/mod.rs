//! Keyed signatures over inbound webhook bodies and content digests over
//! fetched resources. Both hashers are plain [`std::io::Write`] sinks so they
//! can ride along on a single [`FanOut`](crate::streaming::FanOut) pass.

mod digest;
mod signature;

pub use digest::{DigestWriter, key_hash};
pub use signature::{SignatureWriter, compute_signature, verify_signature};

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    /// Missing, malformed and mismatching signatures all map here.
    #[error("signature verification failed")]
    AuthenticationFailed,

    #[error("invalid signing key")]
    InvalidKey,
}
