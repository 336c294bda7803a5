//! Growable read buffer owned by one servicing context.
//!
//! ```text
//!   0          offset           offset+available        capacity
//!   │ consumed │ unread bytes   │ free                   │
//! ```
//!
//! Invariant: `capacity >= offset + available`. Grows by ~50% (at least
//! one byte) when an append does not fit; never shrinks.

#[derive(Debug)]
pub struct ReadBuffer {
    buf: Vec<u8>,
    offset: usize,
    available: usize,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: vec![0; capacity], offset: 0, available: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unread bytes.
    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// The unread bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.available]
    }

    /// Append `bytes` after the unread region, growing if needed.
    pub fn append(&mut self, bytes: &[u8]) {
        let end = self.offset + self.available;
        let needed = end + bytes.len();
        if needed > self.capacity() {
            let mut cap = self.capacity();
            while cap < needed {
                cap = (cap + cap / 2).max(cap + 1);
            }
            self.buf.resize(cap, 0);
        }
        self.buf[end..needed].copy_from_slice(bytes);
        self.available += bytes.len();
    }

    /// Mark `n` unread bytes as consumed. Clamped to what is available.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.available);
        self.offset += n;
        self.available -= n;
        if self.available == 0 {
            self.offset = 0;
        }
    }

    /// Move the unread bytes to the front.
    pub fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }
        self.buf.copy_within(self.offset..self.offset + self.available, 0);
        self.offset = 0;
    }

    /// Drop all unread bytes.
    pub fn clear(&mut self) {
        self.offset = 0;
        self.available = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(rb: &ReadBuffer) {
        assert!(rb.capacity() >= rb.offset() + rb.available());
    }

    #[test]
    fn test_append_consume_compact() {
        let mut rb = ReadBuffer::with_capacity(8);
        rb.append(b"hello");
        rb.consume(2);
        assert_eq!(rb.data(), b"llo");
        assert_eq!(rb.offset(), 2);
        rb.compact();
        assert_eq!(rb.offset(), 0);
        assert_eq!(rb.data(), b"llo");
        check(&rb);
    }

    #[test]
    fn test_growth_is_fifty_percent() {
        let mut rb = ReadBuffer::with_capacity(10);
        rb.append(&[1; 10]);
        assert_eq!(rb.capacity(), 10);
        rb.append(&[2; 1]);
        assert_eq!(rb.capacity(), 15);
        rb.append(&[3; 30]);
        assert!(rb.capacity() >= 41);
        assert_eq!(rb.available(), 41);
        check(&rb);
    }

    #[test]
    fn test_growth_from_zero() {
        let mut rb = ReadBuffer::with_capacity(0);
        rb.append(b"abc");
        assert_eq!(rb.data(), b"abc");
        check(&rb);
    }

    #[test]
    fn test_never_shrinks() {
        let mut rb = ReadBuffer::with_capacity(4);
        rb.append(&[0; 100]);
        let cap = rb.capacity();
        rb.consume(100);
        rb.compact();
        rb.clear();
        assert_eq!(rb.capacity(), cap);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_consume_clamps_and_resets() {
        let mut rb = ReadBuffer::with_capacity(4);
        rb.append(b"ab");
        rb.consume(10);
        assert!(rb.is_empty());
        assert_eq!(rb.offset(), 0);
    }

    #[test]
    fn test_invariant_under_mixed_ops() {
        let mut rb = ReadBuffer::with_capacity(3);
        let mut expected = Vec::new();
        for i in 0..200u32 {
            let chunk: Vec<u8> = (0..(i % 7) as u8).collect();
            rb.append(&chunk);
            expected.extend_from_slice(&chunk);
            let take = (i as usize * 3) % 5;
            let take = take.min(expected.len());
            rb.consume(take);
            expected.drain(..take);
            if i % 4 == 0 {
                rb.compact();
            }
            assert_eq!(rb.data(), &expected[..]);
            check(&rb);
        }
    }
}
