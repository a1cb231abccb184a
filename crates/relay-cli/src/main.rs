use std::io;

use clap::Parser;
use relay_core::config::{
    DEFAULT_BACKLOG, DEFAULT_BLOCKING_TIMEOUT_MS, DEFAULT_SESSION_EXPIRY_MS, DEFAULT_SOCKET_PORT,
};
use relay_core::{RelayConfig, RelayServer};

#[derive(Parser)]
#[command(name = "relay-server", about = "Rendezvous and byte-relay server for a peer-to-peer file transfer tool")]
struct Args {
    /// Address the HTTP control endpoint binds.
    #[arg(long, env = "RELAY_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// Address the TCP relay server binds.
    #[arg(long, env = "RELAY_SOCKET_ADDR", default_value = "0.0.0.0:10000")]
    socket_addr: String,

    /// Port advertised to clients as `socketPort` in control responses.
    #[arg(long, env = "RELAY_SOCKET_PORT", default_value_t = DEFAULT_SOCKET_PORT)]
    socket_port: u16,

    /// Worker thread count hint, accepted for forward compatibility; unused
    /// by the thread-per-connection accept loop.
    #[arg(long, env = "RELAY_WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// TCP accept backlog.
    #[arg(long, env = "RELAY_BACKLOG", default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// How long `Initiate`/`Listen` may park before timing out, in milliseconds.
    #[arg(long, env = "RELAY_BLOCKING_TIMEOUT_MS", default_value_t = DEFAULT_BLOCKING_TIMEOUT_MS)]
    blocking_timeout_ms: u64,

    /// Session lifetime from creation to expiry, in milliseconds.
    #[arg(long, env = "RELAY_SESSION_EXPIRY_MS", default_value_t = DEFAULT_SESSION_EXPIRY_MS)]
    session_expiry_ms: u64,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        RelayConfig {
            http_addr: args.http_addr,
            socket_addr: args.socket_addr,
            socket_port: args.socket_port,
            worker_threads: args.worker_threads,
            backlog: args.backlog,
            blocking_timeout: std::time::Duration::from_millis(args.blocking_timeout_ms),
            session_expiry: std::time::Duration::from_millis(args.session_expiry_ms),
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let http_addr = args.http_addr.clone();
    let socket_addr = args.socket_addr.clone();
    let config: RelayConfig = args.into();

    let server = RelayServer::new(config);

    if let Err(err) = server.start() {
        eprintln!("failed to start relay server: {err}");
        std::process::exit(1);
    }

    println!("relay server listening — control on {http_addr}, data plane on {socket_addr} — press Enter to stop");
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();

    server.stop();
}
