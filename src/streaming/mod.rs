//! Streaming building blocks shared by ingress and the archiver.
//!
//! Untrusted bodies are never buffered whole before being bounded: a
//! [`BoundedReader`] caps the source, and a single [`drain`] pass feeds every
//! interested sink (signature, digest, compressor, raw buffer) through a
//! [`FanOut`] writer.

mod bounded;
mod codec;
mod counting;
mod error;
mod fanout;

pub use bounded::{BoundedReader, CapExceeded};
pub use codec::{Packer, SCRATCH_BUFFER_SIZE, drain, pack, pack_bytes, unpack, unpack_to};
pub use counting::CountingWriter;
pub use error::{StreamError, StreamResult};
pub use fanout::FanOut;
