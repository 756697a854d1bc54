//! CLI for sending sidewire commands to a companion peer.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod jit;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use sidewire::{ServerConnection, StreamConnection};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(
    name = "sidewire",
    version,
    about = "Send privileged commands to a companion peer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Allow a process to execute unsigned code.
    #[command(visible_alias = "jit")]
    EnableJit(jit::EnableJitArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Where the peer is listening.
#[derive(clap::Args)]
#[group(required = true, multiple = false)]
pub(crate) struct Endpoint {
    /// Peer TCP address (e.g. 127.0.0.1:27015).
    #[arg(long)]
    tcp: Option<String>,

    /// Peer Unix socket path.
    #[arg(long)]
    unix: Option<PathBuf>,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    if let Err(e) = Cli::parse().dispatch().await {
        eprintln!("sidewire: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        match self.command {
            Command::EnableJit(args) => {
                let peer = args.endpoint.connect().await?;
                match peer {
                    Peer::Tcp(conn) => jit::run(ServerConnection::new(conn), args).await,
                    #[cfg(unix)]
                    Peer::Unix(conn) => jit::run(ServerConnection::new(conn), args).await,
                }
            }
            Command::Completion { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Self::command(),
                    "sidewire",
                    &mut std::io::stdout(),
                );
                Ok(())
            }
        }
    }
}

/// An established connection to the peer.
enum Peer {
    Tcp(StreamConnection<TcpStream>),
    #[cfg(unix)]
    Unix(StreamConnection<tokio::net::UnixStream>),
}

impl Endpoint {
    /// Connects to whichever endpoint was given.
    async fn connect(&self) -> Result<Peer> {
        if let Some(addr) = &self.tcp {
            let conn = StreamConnection::connect_tcp(addr.as_str())
                .await
                .with_context(|| format!("failed to connect to {addr}"))?;
            tracing::info!(peer = %conn, "connected");
            return Ok(Peer::Tcp(conn));
        }
        match &self.unix {
            Some(path) => connect_unix(path).await,
            None => anyhow::bail!("no peer endpoint given"),
        }
    }
}

#[cfg(unix)]
async fn connect_unix(path: &Path) -> Result<Peer> {
    let conn = StreamConnection::connect_unix(path)
        .await
        .with_context(|| format!("failed to connect to {}", path.display()))?;
    tracing::info!(peer = %conn, "connected");
    Ok(Peer::Unix(conn))
}

#[cfg(not(unix))]
async fn connect_unix(_path: &Path) -> Result<Peer> {
    anyhow::bail!("Unix sockets require Linux or macOS")
}
