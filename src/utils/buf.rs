/// Forward-only reader over a caller-provided byte slice. The cursor
/// state machines consume their source through this so that partial
/// progress survives across `execute` steps.
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Hand out at most `n` bytes, advancing the cursor by however
    /// many were actually available.
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let end = (self.pos + n).min(self.buf.len());
        let out = &self.buf[self.pos..end];
        self.pos = end;
        out
    }
}

/// Forward-only writer over a caller-provided byte slice.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn written(&self) -> usize {
        self.pos
    }

    pub fn avail(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Copy as much of `src` as fits, returning the number of bytes
    /// accepted.
    pub fn push(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.avail());
        self.buf[self.pos..self.pos + n].copy_from_slice(&src[..n]);
        self.pos += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_clamps_to_end() {
        let data = [1u8, 2, 3];
        let mut r = SliceReader::new(&data);
        assert_eq!(r.take(2), &[1, 2]);
        assert_eq!(r.take(5), &[3]);
        assert!(r.is_empty());
        assert_eq!(r.take(1), &[] as &[u8]);
    }

    #[test]
    fn test_writer_clamps_to_end() {
        let mut data = [0u8; 3];
        let mut w = SliceWriter::new(&mut data);
        assert_eq!(w.push(&[7, 8]), 2);
        assert_eq!(w.push(&[9, 10]), 1);
        assert_eq!(w.written(), 3);
        assert_eq!(data, [7, 8, 9]);
    }
}
