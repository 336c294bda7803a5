//! # sam-reactor — Reactor, worker pool and buffered clients
//!
//! Implements the `sam-core` traits over non-blocking sockets:
//!
//! ```text
//!   Acceptor ──accept──▶ BufferedClient ──add_client──▶ Reactor (poll loop)
//!                            │    ▲                         │
//!                   inbound  │    │ outbound                │ Schedule
//!                     FIFO   ▼    │  queue                  ▼
//!                  task thread / WorkerPool ──▶ ClientCallback (FramedCallback)
//! ```
//!
//! ## Modules
//!
//! - `reactor` - poll loop, control queue, destroy cycle, `ReactorHandle`
//! - `worker_pool` - fixed pool driven by the run-state machine
//! - `buffered_client` - buffered connection and the `ClientCallback` trait
//! - `framed` - SAM message framing over a buffered client
//! - `listener` - blocking accept thread for TCP and Unix-domain sockets
//! - `socket` - `Transport` over non-blocking stream sockets
//! - `waker` - coalescing self-pipe
//! - `read_buffer`, `inbound`, `outbound` - per-client byte queues
//! - `config` - reactor and client configuration

pub mod buffered_client;
pub mod config;
pub mod framed;
pub mod inbound;
pub mod listener;
pub mod outbound;
pub mod reactor;
pub mod read_buffer;
pub mod socket;
pub mod waker;
pub mod worker_pool;

pub use buffered_client::{BufferedClient, ClientCallback};
pub use config::{ClientConfig, ReactorConfig, TaskMode};
pub use framed::{FramedCallback, MessageHandler};
pub use listener::{Acceptor, BoundAddr, CallbackFactory};
pub use outbound::OutboundDepth;
pub use reactor::{Reactor, ReactorHandle};
pub use socket::SocketTransport;
pub use worker_pool::WorkerPool;
