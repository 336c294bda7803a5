//! `FramedCallback` — SAM message framing on top of a buffered client.
//!
//! Decodes complete wire messages out of the client's input and hands
//! them to a `MessageHandler`. A malformed message poisons the stream:
//! the peer gets a best-effort `error[reason=...]`, the connection is
//! closed and any further input is discarded.

use std::sync::atomic::{AtomicBool, Ordering};

use sam_wire::{Codec, Container};
use tracing::warn;

use crate::buffered_client::{BufferedClient, ClientCallback};

/// Application handler for decoded messages.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, client: &BufferedClient, message: Container);

    fn on_close(&self, _client: &BufferedClient) {}
}

pub struct FramedCallback<H> {
    handler: H,
    codec: Codec,
    failed: AtomicBool,
}

impl<H: MessageHandler> FramedCallback<H> {
    pub fn new(handler: H, codec: Codec) -> Self {
        Self { handler, codec, failed: AtomicBool::new(false) }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: MessageHandler> ClientCallback for FramedCallback<H> {
    fn process_input(&self, client: &BufferedClient, data: &[u8]) -> usize {
        if self.failed.load(Ordering::Relaxed) {
            return data.len();
        }
        let mut consumed = 0;
        loop {
            match self.codec.decode(&data[consumed..]) {
                Ok(Some(decoded)) => {
                    consumed += decoded.consumed;
                    self.handler.on_message(client, decoded.message);
                }
                Ok(None) => return consumed,
                Err(e) => {
                    warn!(
                        client = %client.id(),
                        error = %e,
                        "malformed message, closing connection"
                    );
                    self.failed.store(true, Ordering::Relaxed);
                    let reply = Container::new("error").with("reason", e.to_string());
                    // Best effort: the queue may already be closed.
                    let _ = client.send_message(&reply);
                    let _ = client.close();
                    return data.len();
                }
            }
        }
    }

    fn process_close(&self, client: &BufferedClient) {
        self.handler.on_close(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffered_client::tests::MockTransport;
    use crate::config::{ClientConfig, TaskMode};
    use sam_core::{lock, ClientId, HandleResult, ReactorClient};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    /// Echoes every message back and records its name.
    #[derive(Default)]
    struct Echo {
        names: Mutex<Vec<String>>,
        closed: AtomicUsize,
    }

    impl MessageHandler for Arc<Echo> {
        fn on_message(&self, client: &BufferedClient, message: Container) {
            lock(&self.names).push(message.name().to_string());
            client.send_message(&message).unwrap();
        }

        fn on_close(&self, _client: &BufferedClient) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup() -> (Arc<MockTransport>, Arc<Echo>, Arc<BufferedClient>) {
        let t = MockTransport::new(usize::MAX);
        let echo = Arc::new(Echo::default());
        let cb = Arc::new(FramedCallback::new(Arc::clone(&echo), Codec::default()));
        let config = ClientConfig::new().task_mode(TaskMode::Pool).read_chunk_size(5);
        let client = BufferedClient::new(ClientId::new(1), Box::new(Arc::clone(&t)), cb, config);
        (t, echo, client)
    }

    fn pump(client: &BufferedClient) {
        while client.handle_input() != HandleResult::Default {}
        client.do_work();
    }

    fn flush(client: &BufferedClient) -> Option<HandleResult> {
        let mut last = None;
        while client.events().contains(sam_core::Interest::WRITE) {
            last = Some(client.handle_output());
        }
        last
    }

    #[test]
    fn test_decodes_across_chunks() {
        let (t, echo, client) = setup();
        let a = sam_wire::encode(&Container::new("a").with("k", "v")).unwrap();
        let b = sam_wire::encode(&Container::new("b")).unwrap();
        let mut wire = a.as_bytes().to_vec();
        wire.extend_from_slice(b.as_bytes());

        t.feed(&wire[..7]);
        pump(&client);
        assert!(lock(&echo.names).is_empty());
        t.feed(&wire[7..]);
        pump(&client);
        assert_eq!(*lock(&echo.names), vec!["a".to_string(), "b".to_string()]);

        flush(&client);
        assert_eq!(t.output(), wire);
    }

    #[test]
    fn test_malformed_replies_and_closes() {
        let (t, echo, client) = setup();
        t.feed(b"{SAM0100:00019x[k]}then more");
        pump(&client);
        assert!(lock(&echo.names).is_empty());

        assert_eq!(flush(&client), Some(HandleResult::Close));
        let out = t.output();
        let reply = sam_wire::decode(&out).unwrap().unwrap().message;
        assert_eq!(reply.name(), "error");
        assert!(reply.field("reason").unwrap().contains("malformed"));

        t.feed(b"{SAM0100:00019ok[]}");
        pump(&client);
        assert!(lock(&echo.names).is_empty());

        client.handle_close();
        client.do_work();
        assert_eq!(echo.closed.load(Ordering::SeqCst), 1);
    }
}
