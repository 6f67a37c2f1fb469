use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::io::{AsyncRead, ReadBuf};

/// Error payload carried inside an [`io::Error`] when a [`BoundedReader`]
/// crosses its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("read ceiling of {limit} bytes exceeded")]
pub struct CapExceeded {
    pub limit: u64,
}

impl CapExceeded {
    fn into_io(self) -> io::Error {
        io::Error::other(self)
    }

    /// Returns the ceiling if `err` was raised by a [`BoundedReader`].
    pub fn from_io(err: &io::Error) -> Option<u64> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<CapExceeded>())
            .map(|cap| cap.limit)
    }
}

/// Async reader that fails once more than `limit` bytes have passed through.
///
/// The read that pushes the running total over the ceiling reports the error
/// even though the inner reader produced data. Reading exactly `limit` bytes
/// and then hitting end of stream completes normally.
#[derive(Debug)]
pub struct BoundedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R> BoundedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Total bytes pulled from the inner reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for BoundedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;

        this.read += (buf.filled().len() - before) as u64;
        if this.read > this.limit {
            return Poll::Ready(Err(CapExceeded { limit: this.limit }.into_io()));
        }

        Poll::Ready(Ok(()))
    }
}
