//! netcalc server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 127.0.0.1:12345 with the live connection table
//! netcalc-server
//!
//! # Listen on all interfaces, plain log output
//! netcalc-server 4000 0.0.0.0 --headless
//! ```

use std::{error::Error, net::IpAddr, path::PathBuf, time::Duration};

use clap::Parser;
use netcalc_core::{
    DEFAULT_HOST, DEFAULT_PORT,
    logging::{LogConfig, init_logging, log_new_start},
    shutdown_signal,
};
use netcalc_server::{
    LogBuffer, Server, ServerConfig, ServerError, StatusDisplay, status::DEFAULT_REFRESH_MS,
};

/// netcalc arithmetic server
#[derive(Parser, Debug)]
#[command(name = "netcalc-server")]
#[command(about = "Networked calculator server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Address to bind to
    #[arg(default_value = DEFAULT_HOST)]
    ip: IpAddr,

    /// Append-only log file
    #[arg(long, default_value = "server.log")]
    log_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to stdout instead of drawing the connection table
    #[arg(long)]
    headless: bool,

    /// Upper bound between table redraws, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REFRESH_MS)]
    refresh_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let log_buffer = LogBuffer::default();

    let log_config = LogConfig {
        file: args.log_file.clone(),
        level: args.log_level.clone(),
        console_level: None,
        ansi: args.headless,
    };
    let log_guard = if args.headless {
        init_logging(&log_config, std::io::stdout)
    } else {
        init_logging(&log_config, log_buffer.make_writer())
    }
    .map_err(ServerError::from)?;

    log_new_start("netcalc-server");

    let bind_address = std::net::SocketAddr::new(args.ip, args.port).to_string();
    let server = Server::bind(ServerConfig { bind_address, ..Default::default() }).await?;
    tracing::info!("listening on {}", server.local_addr()?);

    let display = if args.headless {
        None
    } else {
        let display = StatusDisplay::spawn(
            server.registry(),
            log_buffer,
            Duration::from_millis(args.refresh_ms),
            std::io::stdout(),
        )
        .map_err(|e| ServerError::Internal(format!("status display: {e}")))?;
        Some(display)
    };

    let result = server.run(shutdown_signal()).await;

    if let Some(display) = display {
        display.stop();
    }
    tracing::info!("server stopped");
    drop(log_guard);

    result?;
    Ok(())
}
