use std::io::{self, Write};

/// Writer that keeps an exact tally of the bytes accepted by its inner sink.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_across_writes() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"hello").unwrap();
        writer.write_all(b", ").unwrap();
        writer.write_all(b"world").unwrap();

        assert_eq!(writer.written(), 12);
        assert_eq!(writer.into_inner(), b"hello, world");
    }

    #[test]
    fn test_starts_at_zero() {
        let writer = CountingWriter::new(Vec::<u8>::new());
        assert_eq!(writer.written(), 0);
    }
}
