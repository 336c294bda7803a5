//! Inbound FIFO: reactor thread → servicing context.
//!
//! Chunks are appended by the reactor thread only and drained by the one
//! servicing context. `Stop` is ordinary queue data, so everything
//! appended before it is still delivered.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use sam_core::lock;

use crate::read_buffer::ReadBuffer;

#[derive(Debug, PartialEq, Eq)]
pub enum InboundChunk {
    Data(Vec<u8>),
    Stop,
}

/// Result of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub bytes: usize,
    /// A `Stop` was reached; anything queued after it was discarded.
    pub stopped: bool,
}

#[derive(Debug, Default)]
pub struct InboundFifo {
    chunks: Mutex<VecDeque<InboundChunk>>,
    ready: Condvar,
}

impl InboundFifo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chunk: InboundChunk) {
        lock(&self.chunks).push_back(chunk);
        self.ready.notify_one();
    }

    pub fn push_data(&self, data: Vec<u8>) {
        self.push(InboundChunk::Data(data));
    }

    pub fn push_stop(&self) {
        self.push(InboundChunk::Stop);
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.chunks).is_empty()
    }

    /// Heap bytes held by queued chunks.
    #[cfg(test)]
    pub(crate) fn retained_capacity(&self) -> usize {
        lock(&self.chunks)
            .iter()
            .map(|chunk| match chunk {
                InboundChunk::Data(d) => d.capacity(),
                InboundChunk::Stop => 0,
            })
            .sum()
    }

    /// Move pending chunks into `rb`, stopping at `Stop`.
    ///
    /// With `block`, waits until at least one chunk is present.
    pub fn drain_into(&self, rb: &mut ReadBuffer, block: bool) -> Drained {
        let mut chunks = lock(&self.chunks);
        if block {
            while chunks.is_empty() {
                chunks = self.ready.wait(chunks).unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }
        let mut out = Drained::default();
        while let Some(chunk) = chunks.pop_front() {
            match chunk {
                InboundChunk::Data(data) => {
                    out.bytes += data.len();
                    rb.append(&data);
                }
                InboundChunk::Stop => {
                    out.stopped = true;
                    chunks.clear();
                    break;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_order_and_stop() {
        let fifo = InboundFifo::new();
        fifo.push_data(b"ab".to_vec());
        fifo.push_data(b"cd".to_vec());
        fifo.push_stop();
        fifo.push_data(b"late".to_vec());

        let mut rb = ReadBuffer::with_capacity(4);
        let d = fifo.drain_into(&mut rb, false);
        assert_eq!(d, Drained { bytes: 4, stopped: true });
        assert_eq!(rb.data(), b"abcd");
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_nonblocking_empty() {
        let fifo = InboundFifo::new();
        let mut rb = ReadBuffer::with_capacity(4);
        assert_eq!(fifo.drain_into(&mut rb, false), Drained::default());
    }

    #[test]
    fn test_blocking_wakes_on_push() {
        let fifo = Arc::new(InboundFifo::new());
        let consumer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || {
                let mut rb = ReadBuffer::with_capacity(4);
                let mut total = Vec::new();
                loop {
                    let d = fifo.drain_into(&mut rb, true);
                    total.extend_from_slice(rb.data());
                    rb.clear();
                    if d.stopped {
                        return total;
                    }
                }
            })
        };
        for i in 0..50u8 {
            fifo.push_data(vec![i]);
            if i % 10 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        fifo.push_stop();
        let got = consumer.join().unwrap();
        assert_eq!(got, (0..50u8).collect::<Vec<_>>());
    }
}
