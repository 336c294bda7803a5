//! Outbound queue: any thread → reactor thread.
//!
//! Producers append raw buffers (and at most one `Close`); the reactor
//! pops the head, sends what it can and puts any remainder back at the
//! head. Once a close has been accepted, further items are refused.

use std::collections::VecDeque;
use std::sync::Mutex;

use sam_core::lock;

#[derive(Debug, PartialEq, Eq)]
pub enum OutboundItem {
    /// `buf[pos..]` is still to be sent.
    Data { buf: Vec<u8>, pos: usize },
    Close,
}

impl OutboundItem {
    /// Unsent bytes.
    pub fn remaining(&self) -> usize {
        match self {
            OutboundItem::Data { buf, pos } => buf.len().saturating_sub(*pos),
            OutboundItem::Close => 0,
        }
    }
}

/// Queue depth snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboundDepth {
    pub items: usize,
    pub bytes: usize,
}

#[derive(Debug, Default)]
struct State {
    items: VecDeque<OutboundItem>,
    bytes: usize,
    closing: bool,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    state: Mutex<State>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` (from `pos`) and/or a close marker.
    ///
    /// Returns the queued byte count afterwards, or `None` if a close was
    /// already accepted and nothing was queued.
    pub fn push(&self, data: Option<(Vec<u8>, usize)>, close: bool) -> Option<usize> {
        let mut st = lock(&self.state);
        if st.closing {
            return None;
        }
        if let Some((buf, pos)) = data {
            if pos < buf.len() {
                st.bytes += buf.len() - pos;
                st.items.push_back(OutboundItem::Data { buf, pos });
            }
        }
        if close {
            st.closing = true;
            st.items.push_back(OutboundItem::Close);
        }
        Some(st.bytes)
    }

    pub fn pop(&self) -> Option<OutboundItem> {
        let mut st = lock(&self.state);
        let item = st.items.pop_front()?;
        st.bytes -= item.remaining();
        Some(item)
    }

    /// Put a partially sent item back at the head.
    pub fn requeue(&self, item: OutboundItem) {
        let mut st = lock(&self.state);
        st.bytes += item.remaining();
        st.items.push_front(item);
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).items.is_empty()
    }

    pub fn depth(&self) -> OutboundDepth {
        let st = lock(&self.state);
        OutboundDepth { items: st.items.len(), bytes: st.bytes }
    }

    /// Refuse further items and discard everything queued. Returns the
    /// number of bytes dropped.
    pub fn shut(&self) -> usize {
        let mut st = lock(&self.state);
        st.closing = true;
        st.items.clear();
        std::mem::take(&mut st.bytes)
    }
}
