mod config;
mod events;
mod session;
mod simulation;
mod tcp;

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use clap::{Parser, ValueEnum};

use config::PeerConfig;
use events::SessionEvent;
use netmelee::PeerOptions;
use netmelee::config::{FLEET_SIZE, SHIP_TYPE_COUNT};
use session::Session;
use tcp::TcpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Server,
    Client,
}

#[derive(Parser)]
#[command(name = "netmelee-peer")]
#[command(about = "Headless netplay peer for two-player ship battles")]
struct Args {
    #[arg(short, long, value_enum, default_value_t = Role::Server)]
    role: Role,

    #[arg(long, default_value = "127.0.0.1", help = "Host to connect to (client only)")]
    host: String,

    #[arg(short, long, default_value_t = netmelee::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 10, help = "Seconds to wait for the other peer")]
    connect_timeout: u64,

    #[arg(short, long, default_value_t = 2)]
    input_delay: u32,

    #[arg(long, default_value_t = 1, help = "Must match on both peers")]
    checksum_interval: u32,

    #[arg(long, default_value_t = 1)]
    rounds: u32,

    #[arg(long, default_value_t = 24 * 60, help = "Frame limit per battle")]
    max_frames: u32,

    #[arg(long, value_delimiter = ',', default_values_t = [0u8, 5, 10, 15])]
    fleet: Vec<u8>,

    #[arg(long, default_value = "Headless")]
    team_name: String,

    #[arg(long, help = "Battle seed (server only); derived from the clock if unset")]
    seed: Option<u32>,

    #[arg(long, help = "Append a packet trace to this file")]
    debug_log: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    ensure!(!args.fleet.is_empty(), "the fleet needs at least one ship");
    ensure!(
        args.fleet.len() <= FLEET_SIZE,
        "a fleet holds at most {} ships",
        FLEET_SIZE
    );
    if let Some(&ship) = args.fleet.iter().find(|&&s| s >= SHIP_TYPE_COUNT) {
        bail!("unknown ship type {} (max {})", ship, SHIP_TYPE_COUNT - 1);
    }

    let options = match args.role {
        Role::Server => PeerOptions::server(args.port),
        Role::Client => PeerOptions::client(args.host.clone(), args.port),
    };
    let seed = args.seed.unwrap_or_else(clock_seed);
    let config = PeerConfig {
        team_name: args.team_name,
        fleet: args.fleet,
        input_delay: args.input_delay,
        checksum_interval: args.checksum_interval,
        max_frames: args.max_frames,
        rounds: args.rounds,
        seed,
        ..PeerConfig::for_options(options.clone())
    };

    let timeout = Duration::from_secs(args.connect_timeout);
    let (stream, addr) = match args.role {
        Role::Server => tcp::accept(&options, timeout),
        Role::Client => tcp::connect(&options, timeout),
    }
    .with_context(|| format!("connecting on port {}", options.port))?;
    let transport = TcpTransport::new(stream)?;
    log::info!("Connected to {}", transport.peer_addr().unwrap_or(addr));

    let debug_sink = match &args.debug_log {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            Some(Box::new(file) as Box<dyn Write>)
        }
        None => None,
    };

    let mut session = Session::new(
        config,
        Box::new(transport),
        args.role == Role::Server,
        debug_sink,
    )?;
    let running = session.running();

    while running.load(Ordering::SeqCst) {
        session.tick_once();

        for event in session.drain_events() {
            match event {
                SessionEvent::Connected => log::info!("Peer handshake complete"),
                SessionEvent::RemoteTeam { name } => log::info!("Opponent team: {}", name),
                SessionEvent::RoundStarted {
                    round,
                    seed,
                    input_delay,
                } => log::info!(
                    "Round {} started (seed {:#010x}, input delay {})",
                    round,
                    seed,
                    input_delay
                ),
                SessionEvent::RoundFinished {
                    round,
                    frames,
                    winner,
                } => log::info!(
                    "Round {} finished after {} frames, winner: {:?}",
                    round,
                    frames,
                    winner
                ),
                SessionEvent::SyncLost { frame } => {
                    log::error!("Simulations diverged at frame {}", frame)
                }
                SessionEvent::RoundTrip { id, rtt } => {
                    log::debug!("Ping {} round trip {:?}", id, rtt)
                }
                SessionEvent::Disconnected { reason } => {
                    log::info!("Session {}", reason.as_str())
                }
                SessionEvent::Error { message } => log::error!("{}", message),
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    let stats = session.connection().stats();
    log::info!(
        "Sent {} packets ({} bytes), received {} packets ({} bytes)",
        stats.packets_sent,
        stats.bytes_sent,
        stats.packets_received,
        stats.bytes_received
    );
    for (kind, sent, received) in stats.by_type() {
        log::debug!("  {:<18} sent {:>6}  received {:>6}", kind.name(), sent, received);
    }

    let outcome = session.outcome();
    let rounds = session.rounds_played();
    session.close();
    match outcome {
        Some(reason) if reason.is_clean() => {
            log::info!("Played {} round(s)", rounds);
            Ok(())
        }
        Some(reason) => bail!("session ended early: {}", reason.as_str()),
        None => bail!("session stopped without an outcome"),
    }
}

fn clock_seed() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or(0x5EED)
}
