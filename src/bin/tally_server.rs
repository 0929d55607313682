use std::{
    error::Error,
    io::{self, BufRead},
    net::SocketAddr,
    thread,
    time::Duration,
};

use clap::Parser;
use log::info;
use tally::{ServerConfig, Shutdown, StatServer};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    #[arg(long, default_value = "0.0.0.0:8080")]
    address: SocketAddr,
    /// Threads in the shared compute pool [default: available parallelism]
    #[arg(long)]
    compute_threads: Option<usize>,
    /// Largest worker count a single array may request
    #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(u32).range(1..))]
    max_workers: u32,
    /// Milliseconds live sessions get to finish after shutdown
    #[arg(long, default_value_t = 5000)]
    grace_period_ms: u64,
    /// Close connections idle for this many seconds
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        let defaults = ServerConfig::default();
        Self {
            address: cli.address,
            compute_threads: cli.compute_threads.unwrap_or(defaults.compute_threads),
            max_workers_per_request: cli.max_workers,
            grace_period: Duration::from_millis(cli.grace_period_ms),
            idle_timeout: cli.idle_timeout_secs.map(Duration::from_secs),
            ..defaults
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let shutdown = Shutdown::new();

    let on_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("received interrupt, shutting down server");
        on_signal.trigger();
    })?;

    let on_console = shutdown.clone();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("q") {
                info!("received shutdown command, shutting down server");
                on_console.trigger();
                break;
            }
        }
    });

    let server = StatServer::bind(cli.into(), shutdown)?;
    println!("Press 'q' then Enter to shut down the server");

    server.listen()?;
    Ok(())
}
