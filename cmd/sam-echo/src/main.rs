//! SAM Echo Server
//!
//! Admin-style server on top of the SAM reactor: every connection is a
//! buffered client speaking framed SAM messages.
//!
//! Messages:
//!     ping[seq=N]   → pong[seq=N]
//!     stats[]       → stats[id=..,bytes_in=..,bytes_out=..]
//!     bye[]         → bye[] then close
//!     anything else → echoed back unchanged
//!
//! Usage:
//!     cargo build --release -p sam-echo
//!     SAM_LOG=debug ./target/release/sam-echo --listen 127.0.0.1:9997 --workers 4 --mode pool
//!     ./target/release/sam-echo --unix /tmp/sam.sock

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sam_core::{ClientId, ReactorClient, SequenceAllocator};
use sam_reactor::{
    Acceptor, BufferedClient, CallbackFactory, ClientCallback, ClientConfig, FramedCallback,
    MessageHandler, Reactor, ReactorConfig, TaskMode,
};
use sam_wire::{Codec, Container};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static RUNNING: AtomicBool = AtomicBool::new(true);

/// SAM echo server
#[derive(Parser, Debug)]
#[command(name = "sam-echo")]
#[command(about = "Echo server for the SAM admin transport")]
#[command(version)]
struct Args {
    /// TCP address to listen on
    #[arg(long, short = 'l', default_value = "127.0.0.1:9997")]
    listen: String,

    /// Also listen on a Unix-domain socket at this path
    #[arg(long)]
    unix: Option<PathBuf>,

    /// Worker pool size (defaults to SAM_NUM_WORKERS or 4)
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Client servicing mode: thread or pool (defaults to SAM_TASK_MODE)
    #[arg(long, short = 'm')]
    mode: Option<TaskMode>,
}

struct Echo;

impl MessageHandler for Echo {
    fn on_message(&self, client: &BufferedClient, message: Container) {
        let reply = match message.name() {
            "ping" => {
                let mut pong = Container::new("pong");
                if let Some(seq) = message.field("seq") {
                    pong.set("seq", seq);
                }
                pong
            }
            "stats" => Container::new("stats")
                .with("id", client.id().to_string())
                .with("bytes_in", client.core().bytes_in().to_string())
                .with("bytes_out", client.core().bytes_out().to_string()),
            _ => message,
        };
        let bye = reply.name() == "bye";
        // Failures are logged by the client.
        let _ = client.send_message(&reply);
        if bye {
            let _ = client.close();
        }
    }

    fn on_close(&self, client: &BufferedClient) {
        debug!(client = %client.id(), "connection finished");
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("SAM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
        libc::signal(libc::SIGTERM, handle_sigint as usize);
    }

    let mut reactor_config = ReactorConfig::from_env();
    if let Some(n) = args.workers {
        reactor_config = reactor_config.num_workers(n);
    }
    let mut client_config = ClientConfig::from_env();
    if let Some(mode) = args.mode {
        client_config = client_config.task_mode(mode);
    }
    client_config.validate().context("invalid client configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workers = reactor_config.num_workers,
        mode = %client_config.task_mode,
        "starting sam-echo"
    );

    let mut reactor = Reactor::start(reactor_config).context("failed to start reactor")?;

    let codec = Codec::new(client_config.codec);
    let factory: Arc<CallbackFactory> = Arc::new(move |_id: ClientId| {
        Arc::new(FramedCallback::new(Echo, codec)) as Arc<dyn ClientCallback>
    });
    let ids = Arc::new(SequenceAllocator::default());

    let mut acceptors = vec![Acceptor::bind_tcp(
        args.listen.as_str(),
        reactor.handle(),
        ids.clone(),
        client_config.clone(),
        Arc::clone(&factory),
    )
    .with_context(|| format!("failed to listen on {}", args.listen))?];

    if let Some(path) = &args.unix {
        let acceptor = Acceptor::bind_unix(path, reactor.handle(), ids, client_config, factory)
            .with_context(|| format!("failed to listen on {}", path.display()))?;
        acceptors.push(acceptor);
    }

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!(clients = reactor.client_count(), "shutting down");
    for acceptor in &mut acceptors {
        acceptor.stop();
    }
    reactor.shutdown();
    Ok(())
}

extern "C" fn handle_sigint(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}
