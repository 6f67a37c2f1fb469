use std::io::{self, Write};

/// Writer that forwards every write, in full, to each attached sink in order.
///
/// A failing sink aborts the write; sinks earlier in the list will already
/// have seen the bytes.
#[derive(Default)]
pub struct FanOut<'a> {
    sinks: Vec<&'a mut (dyn Write + Send)>,
}

impl<'a> FanOut<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: &'a mut (dyn Write + Send)) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Write for FanOut<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in self.sinks.iter_mut() {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::CountingWriter;

    #[test]
    fn test_every_sink_sees_every_byte() {
        let mut first = Vec::new();
        let mut second = CountingWriter::new(Vec::new());

        {
            let mut fan = FanOut::new().with(&mut first).with(&mut second);
            fan.write_all(b"abc").unwrap();
            fan.write_all(b"def").unwrap();
            assert_eq!(fan.len(), 2);
        }

        assert_eq!(first, b"abcdef");
        assert_eq!(second.written(), 6);
        assert_eq!(second.into_inner(), b"abcdef");
    }

    #[test]
    fn test_no_sinks_accepts_everything() {
        let mut fan = FanOut::new();
        assert!(fan.is_empty());
        assert_eq!(fan.write(b"ignored").unwrap(), 7);
    }
}
