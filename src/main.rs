//! httpmirror - An HTTP Mirror Server for Load-Test Assertions
//!
//! This is the main entry point for the mirror server. It sets up the TCP
//! listener and spawns one handler task per accepted connection.

use httpmirror::connection::{handle_connection, ConnectionStats};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: httpmirror::DEFAULT_HOST.to_string(),
            port: httpmirror::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("httpmirror version {}", httpmirror::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
httpmirror - An HTTP Mirror Server for Load-Test Assertions

USAGE:
    httpmirror [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 8081)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    httpmirror                     # Start on 127.0.0.1:8081
    httpmirror --port 8082         # Start on port 8082
    httpmirror --host 0.0.0.0      # Listen on all interfaces

BEHAVIOR:
    Every request is echoed back as the response body, preceded by a fixed
    "HTTP/1.0 200 OK" status line:

    $ curl -s -d hello http://127.0.0.1:8081/
    POST / HTTP/1.1
    Host: 127.0.0.1:8081
    ...
    Content-Length: 5

    hello
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Create connection statistics (shared across all handlers)
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        "httpmirror v{} listening on {}",
        httpmirror::VERSION,
        config.bind_address()
    );
    info!("Every request will be mirrored back to its sender. Use Ctrl+C to stop.");

    // Set up graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    info!(
        "Server shutdown complete ({} connections handled, {} requests mirrored)",
        stats
            .connections_accepted
            .load(std::sync::atomic::Ordering::Relaxed),
        stats
            .requests_mirrored
            .load(std::sync::atomic::Ordering::Relaxed)
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
