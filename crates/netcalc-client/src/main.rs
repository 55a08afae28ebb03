//! netcalc client binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect to 127.0.0.1:12345
//! netcalc-client
//!
//! # Connect elsewhere and give up reconnecting sooner
//! netcalc-client 4000 10.0.0.5 --max-backoff-secs 8
//! ```

use std::{
    error::Error,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use netcalc_client::{Client, ClientConfig, LatencyChart, UndecodablePolicy};
use netcalc_core::{
    DEFAULT_HOST, DEFAULT_PORT, SystemEnv,
    logging::{LogConfig, init_logging, log_new_start},
    shutdown_signal,
};
use tokio::io::BufReader;

/// netcalc interactive client
#[derive(Parser, Debug)]
#[command(name = "netcalc-client")]
#[command(about = "Networked calculator client")]
#[command(version)]
struct Args {
    /// Server port
    #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Server address
    #[arg(default_value = DEFAULT_HOST)]
    ip: IpAddr,

    /// Append-only log file
    #[arg(long, default_value = "client.log")]
    log_file: PathBuf,

    /// Log level for the log file (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Stop reconnecting once the next delay would exceed this many seconds
    #[arg(long, default_value = "32")]
    max_backoff_secs: u64,

    /// Drop a request whose response cannot be decoded instead of resending it
    #[arg(long)]
    discard_undecodable: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let runtime = tokio::runtime::Runtime::new()?;

    let result = runtime.block_on(run(args));

    // A blocked stdin read would otherwise keep the runtime alive.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let log_config = LogConfig {
        file: args.log_file,
        level: args.log_level,
        console_level: Some("warn".to_string()),
        ansi: true,
    };
    let _log_guard = init_logging(&log_config, std::io::stderr)?;
    log_new_start("netcalc-client");

    let config = ClientConfig {
        server_address: SocketAddr::new(args.ip, args.port).to_string(),
        backoff_ceiling: Duration::from_secs(args.max_backoff_secs),
        undecodable: if args.discard_undecodable {
            UndecodablePolicy::Discard
        } else {
            UndecodablePolicy::Retry
        },
        ..Default::default()
    };
    tracing::info!(server = %config.server_address, "client starting");

    let mut client = Client::new(
        config,
        SystemEnv::new(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        LatencyChart::default(),
    );

    let result = client.run_until(shutdown_signal()).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, fatal = e.is_fatal(), "client stopped");
    }
    Ok(result?)
}
