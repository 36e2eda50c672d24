//! Demo replica.
//!
//! Every line read from stdin is submitted for total-order delivery; a line
//! of the form `@<id> <text>` is sent to member `<id>` point-to-point instead.
//! Deliveries are printed to stdout as `<serial> <text>`. End of input shuts
//! the replica down.

use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::process;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use atomcast::{
    ChannelHandle, CommConfig, CommError, CommListener, GroupChannel, MembershipView, Payload, ProcessId, TcpTransport,
    EXIT_BIND_FAILURE,
};

#[derive(Parser, Debug)]
#[command(name = "atomcast-server", about = "Run one member of an atomic broadcast group")]
struct Args {
    /// Index of this process in --members.
    #[arg(long)]
    id: ProcessId,

    /// Member addresses in id order, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    members: Vec<SocketAddr>,

    /// Heartbeat period in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    heartbeat_ms: u64,

    /// Silence after which a member is declared failed, in milliseconds.
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

struct StdoutListener;

impl CommListener for StdoutListener {
    fn on_all_processes_ready(&mut self) {
        info!("all members up");
    }

    fn on_process_failed(&mut self, id: ProcessId) {
        warn!(process_id = id, "member failed");
    }

    fn on_receive_p2p_message(&mut self, from: ProcessId, payload: Payload) {
        println!("@{} {}", from, String::from_utf8_lossy(&payload));
    }

    fn on_receive_total_order_message(&mut self, serial: u64, payload: Payload) {
        println!("{} {}", serial, String::from_utf8_lossy(&payload));
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version are not errors.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };
    if let Err(e) = run(args) {
        error!(error = %e, "replica stopped");
        let code = match e {
            CommError::Bind { .. } => EXIT_BIND_FAILURE,
            _ => 1,
        };
        process::exit(code);
    }
}

fn run(args: Args) -> Result<(), CommError> {
    let config = CommConfig::with_heartbeat(
        Duration::from_millis(args.heartbeat_ms),
        Duration::from_millis(args.timeout_ms),
    );
    config.validate()?;

    let view = MembershipView::from_addresses(&args.members, args.id)?;
    let transport = TcpTransport::bind(&view, &config)?;
    let mut channel = GroupChannel::new(view, &config, transport, StdoutListener)?;

    let (handle, commands) = ChannelHandle::new();
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || read_input(handle))?;

    channel.run(commands)
}

fn read_input(handle: ChannelHandle) {
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.is_empty() {
            continue;
        }

        let sent = match parse_p2p(&line) {
            Some((to, text)) => handle.send_p2p(to, text.as_bytes().to_vec()),
            None => handle.submit(line.into_bytes()),
        };
        if sent.is_err() {
            return;
        }
    }
    let _ = handle.shutdown();
}

fn parse_p2p(line: &str) -> Option<(ProcessId, &str)> {
    let rest = line.strip_prefix('@')?;
    let (id, text) = rest.split_once(' ')?;
    Some((id.parse().ok()?, text))
}
