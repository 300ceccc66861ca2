use wolgate::config;
use wolgate::logging;
use wolgate::store;
use wolgate::web;
use wolgate::wol;

use clap::{Args, Parser, Subcommand};
use config::{Config, Overrides};
use log::{error, info};
use nix::sys::signal::{SigSet, Signal};
use std::num::NonZeroU32;
use std::sync::Arc;
use wol::WakeService;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about = "Lightweight Wake-on-LAN gateway", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "WOLGATE_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log file path. Empty logs to stderr.
    #[arg(long = "log", global = true, env = "WOLGATE_LOG__FILE")]
    log_file: Option<String>,

    /// Log level: debug, info, warn, error
    #[arg(long, global = true, env = "WOLGATE_LOG__LEVEL")]
    log_level: Option<String>,

    /// Maximum log file size in MB
    #[arg(long, global = true, env = "WOLGATE_LOG__MAX_SIZE")]
    log_max_size: Option<u64>,

    /// Maximum number of backup log files
    #[arg(long, global = true, env = "WOLGATE_LOG__MAX_BACKUPS")]
    log_max_backups: Option<usize>,

    /// Maximum age of backup log files in days
    #[arg(long, global = true, env = "WOLGATE_LOG__MAX_AGE")]
    log_max_age: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the web management service
    Server(ServerArgs),
    /// Send a WOL magic packet to a device
    Wake(WakeArgs),
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// HTTP listen address
    #[arg(long, env = "WOLGATE_SERVER__LISTEN")]
    listen: Option<String>,

    /// Device data file path
    #[arg(long, env = "WOLGATE_SERVER__DATA")]
    data: Option<String>,

    /// Network interface to send magic packets from
    #[arg(long, env = "WOLGATE_WAKE__IFACE")]
    iface: Option<String>,

    /// Broadcast address for magic packets
    #[arg(long, env = "WOLGATE_WAKE__BROADCAST")]
    broadcast: Option<String>,

    /// If true, log magic packets instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct WakeArgs {
    /// Target MAC address, in AA:BB:CC:DD:EE:FF, AA-BB-CC-DD-EE-FF or AABB.CCDD.EEFF form
    #[arg(long)]
    mac: String,

    /// Network interface
    #[arg(long)]
    iface: Option<String>,

    /// Broadcast address
    #[arg(long)]
    bcast: Option<String>,

    /// Number of packets to send
    #[arg(long, default_value_t = wol::DEFAULT_REPEAT)]
    count: NonZeroU32,
}

impl Cli {
    fn log_overrides(&self) -> Overrides {
        Overrides {
            log_file: self.log_file.clone(),
            log_level: self.log_level.clone(),
            log_max_size: self.log_max_size,
            log_max_backups: self.log_max_backups,
            log_max_age: self.log_max_age,
            ..Default::default()
        }
    }
}

fn run_server(cli: &Cli, args: &ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(&cli.config)?;
    config.apply(&cli.log_overrides());
    config.apply(&Overrides {
        listen: args.listen.clone(),
        data: args.data.clone(),
        iface: args.iface.clone(),
        broadcast: args.broadcast.clone(),
        ..Default::default()
    });

    logging::init(&config.log)?;
    info!("wolgate {} starting...", VERSION);

    let store = Arc::new(store::DeviceStore::open(&config.server.data)?);
    let iface = Some(config.wake.iface.as_str());
    let broadcast = Some(config.wake.broadcast.as_str());
    let wol = if args.dry_run {
        info!("dry run: magic packets will only be logged");
        WakeService::with_transmitter(iface, broadcast, Arc::new(wol::noop::LogOnlyTransmitter))?
    } else {
        WakeService::new(iface, broadcast)?
    };
    let handler = web::Handler::new(store, wol);

    // Blocked before the server spawns its workers so they inherit the mask.
    let mut shutdown = SigSet::empty();
    shutdown.add(Signal::SIGINT);
    shutdown.add(Signal::SIGTERM);
    shutdown.thread_block()?;

    info!("Server listening on {}", config.server.listen);
    info!("Data file: {}", config.server.data);
    let server = rouille::Server::new(config.server.listen.as_str(), move |request| {
        handler.handle(request)
    })
    .map_err(|e| e.to_string())?;
    serve_until(server, &shutdown)?;
    info!("Server stopped");
    Ok(())
}

/// Runs `server` on its own thread until one of the blocked signals in
/// `shutdown` arrives, then stops it and waits for it to finish.
fn serve_until<F>(
    server: rouille::Server<F>,
    shutdown: &SigSet,
) -> Result<Signal, Box<dyn std::error::Error>>
where
    F: Send + Sync + 'static + Fn(&rouille::Request) -> rouille::Response,
{
    let (server_thread, stop) = server.stoppable();
    let signal = shutdown.wait()?;
    info!("Received {}, shutting down...", signal.as_str());
    // The receiver is only gone if the server thread already exited.
    let _ = stop.send(());
    server_thread
        .join()
        .map_err(|_| "server thread panicked")?;
    Ok(signal)
}

fn run_wake(cli: &Cli, args: &WakeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: {}", e);
        Config::default()
    });
    config.apply(&cli.log_overrides());
    config.apply(&Overrides {
        iface: args.iface.clone(),
        broadcast: args.bcast.clone(),
        ..Default::default()
    });

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Warning: {}", e);
    }

    let wol = WakeService::new(
        Some(config.wake.iface.as_str()),
        Some(config.wake.broadcast.as_str()),
    )?;

    info!("Sending WOL packet to {}", args.mac);
    if !config.wake.iface.is_empty() {
        info!("Interface: {}", config.wake.iface);
    }
    info!("Broadcast: {}", wol.target().addr);

    if let Err(e) = wol.send_repeated(&args.mac, args.count) {
        error!("Failed to send WOL packet: {}", e);
        return Err(e.into());
    }

    info!("WOL packet sent successfully to {}", args.mac);
    println!("WOL packet sent to {}", args.mac);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Server(args) => run_server(&cli, args),
        Command::Wake(args) => run_wake(&cli, args),
        Command::Version => {
            println!("wolgate version {}", VERSION);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use nix::sys::signal::raise;

    #[test]
    fn test_cli_wake() {
        let cli = Cli::try_parse_from(["wolgate", "wake", "--mac", "AA:BB:CC:DD:EE:FF"]).unwrap();
        match cli.command {
            Command::Wake(args) => {
                assert_eq!(args.mac, "AA:BB:CC:DD:EE:FF");
                assert_eq!(args.count, wol::DEFAULT_REPEAT);
            }
            other => panic!("expected wake, got {:?}", other),
        }
        assert!(Cli::try_parse_from(["wolgate", "wake", "--mac", "x", "--count", "0"]).is_err());
    }

    #[test]
    fn test_serve_until_stops_on_signal() {
        // Signal masks are per thread; SIGUSR1 stays pending for this one.
        let mut shutdown = SigSet::empty();
        shutdown.add(Signal::SIGUSR1);
        shutdown.thread_block().unwrap();

        let server =
            rouille::Server::new("127.0.0.1:0", |_| rouille::Response::empty_404()).unwrap();
        raise(Signal::SIGUSR1).unwrap();
        assert_eq!(serve_until(server, &shutdown).unwrap(), Signal::SIGUSR1);
    }
}
