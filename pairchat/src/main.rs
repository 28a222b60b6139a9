//! `PairChat`: chat with several contacts over a shared topic bus.
//!
//! Runs the interactive menu on stdin/stdout. Configuration via CLI flags,
//! environment variables, or config file (`~/.config/pairchat/config.toml`).
//!
//! ```bash
//! # Log in interactively
//! cargo run --bin pairchat
//!
//! # Log in as alice with a built-in peer that echoes every message
//! cargo run --bin pairchat -- --username alice --echo-peer echobot
//! ```

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use pairchat::config::{CliArgs, ClientConfig};
use pairchat::echo::EchoPeer;
use pairchat::menu::{self, Menu, SharedWriter};
use pairchat::session::SessionRegistry;
use pairchat::session::channel::InputSource;
use pairchat::theme;
use pairchat::transport::memory::MemoryBus;
use pairchat_proto::username::validate_username;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the menu.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("pairchat starting");

    let out: SharedWriter<io::Stdout> = Arc::new(Mutex::new(io::stdout()));
    let input = spawn_stdin_reader(config.input_buffer);

    {
        let mut stdout = out.lock();
        config.color.apply(&mut *stdout)?;
        writeln!(stdout, "PairChat\n----------------------------")?;
    }

    let username = match config.username.clone() {
        Some(name) if validate_username(&name).is_ok() => name,
        other => {
            if let Some(name) = other {
                eprintln!("Ignoring invalid username {name:?}");
            }
            let Some(name) = menu::login(&input, &out).await? else {
                return Ok(());
            };
            name
        }
    };
    writeln!(out.lock(), "----------------------------\n")?;

    let result = run(&username, &config, input, Arc::clone(&out)).await;

    {
        let mut stdout = out.lock();
        writeln!(stdout, "\nThanks for chatting.")?;
        theme::reset(&mut *stdout)?;
        stdout.flush()?;
    }
    tracing::info!("pairchat exiting");
    result
}

/// Starts the session layer, runs the menu, and tears everything down.
async fn run(
    username: &str,
    config: &ClientConfig,
    input: InputSource,
    out: SharedWriter<io::Stdout>,
) -> io::Result<()> {
    let bus = Arc::new(MemoryBus::new());
    let (registry, events) =
        SessionRegistry::new(username, Arc::clone(&bus), config.to_session_config())
            .map_err(io::Error::other)?;
    let registry = Arc::new(registry);
    let printer = menu::spawn_event_printer(events, Arc::clone(&out));

    let mut peers = Vec::new();
    for name in &config.echo_peers {
        match EchoPeer::spawn(name, username, Arc::clone(&bus), config.to_session_config()).await
        {
            Ok(peer) => {
                if let Err(e) = registry.add(name).await {
                    tracing::warn!(peer = name, error = %e, "echo peer not added as contact");
                }
                peers.push(peer);
            }
            Err(e) => eprintln!("Could not start echo peer {name}: {e}"),
        }
    }

    let mut home = Menu::new(
        Arc::clone(&registry),
        input,
        Arc::clone(&out),
        config.chat_log_dir.clone(),
        config.color,
    );
    let result = home.run().await;

    if let Err(e) = registry.shutdown().await {
        tracing::error!(error = %e, "sessions did not shut down cleanly");
        eprintln!("{e}");
    }
    for peer in peers {
        if let Err(e) = peer.shutdown().await {
            tracing::warn!(error = %e, "echo peer did not shut down cleanly");
        }
    }
    printer.abort();
    result
}

/// Forwards stdin lines into a channel from a dedicated thread.
///
/// The channel closes when stdin reaches EOF.
fn spawn_stdin_reader(capacity: usize) -> InputSource {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        tracing::debug!("stdin closed");
    });
    Arc::new(tokio::sync::Mutex::new(rx))
}

/// Initialize file-based logging.
///
/// Logs are written to a file (never stdout, since the menu owns it).
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("pairchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
