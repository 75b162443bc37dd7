//! Shell Relay CLI - opens an interactive remote shell through a terminal relay.
//!
//! This is the main binary entry point. See the `shell_relay` library
//! for the core functionality.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use zeroize::Zeroizing;

use shell_relay::{AuthMode, Config, SessionConfig};

// CLI
#[derive(Parser)]
#[command(name = "shell-relay")]
#[command(version)]
#[command(about = "Interactive remote shell over a WebSocket terminal relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a shell on a remote host through the relay
    Connect {
        /// Remote host, optionally host:port
        #[arg(long)]
        host: String,
        /// Remote login name
        #[arg(long, short = 'u')]
        username: String,
        /// Relay terminal endpoint (overrides config and SHELL_RELAY_URL)
        #[arg(long)]
        relay: Option<String>,
        /// Bearer token for the relay (overrides SHELL_RELAY_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// How credentials are sent to the relay (use "query" for relays
        /// that read credentials from the URL)
        #[arg(long, value_enum)]
        auth_mode: Option<AuthMode>,
    },
    /// Write the settings file if missing and print its location
    Config {
        /// Print the effective settings instead
        #[arg(long)]
        show: bool,
    },
}

fn log_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHELL_RELAY_LOG_FILE") {
        return PathBuf::from(path);
    }
    Config::config_dir()
        .unwrap_or_else(|_| std::env::temp_dir())
        .join("shell-relay.log")
}

/// Log to a file; the terminal belongs to the remote shell while connected.
fn init_logging() {
    let path = log_path();
    let target: Box<dyn Write + Send> = match std::fs::File::create(&path) {
        Ok(file) => Box::new(file),
        Err(e) => {
            eprintln!("warning: logging disabled, cannot create {}: {e}", path.display());
            Box::new(std::io::sink())
        }
    };
    let default_filter = shell_relay::env::Environment::current().default_log_filter();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .format_timestamp_secs()
        .init();
}

/// Human label for the detach byte, e.g. `Ctrl-]` for 0x1d.
fn key_label(key: u8) -> String {
    match key {
        0x01..=0x1f => format!("Ctrl-{}", char::from(key + 0x40)),
        _ => format!("0x{key:02x}"),
    }
}

/// Read the login password without echoing it.
///
/// `SHELL_RELAY_PASSWORD` wins; otherwise the operator is prompted. A
/// non-interactive stdin is read as a single line.
fn read_secret(username: &str, host: &str) -> Result<Zeroizing<String>> {
    if let Ok(secret) = std::env::var("SHELL_RELAY_PASSWORD") {
        return Ok(Zeroizing::new(secret));
    }

    eprint!("{username}@{host}'s password: ");
    std::io::stderr().flush()?;

    if !std::io::stdin().is_terminal() {
        let mut line = Zeroizing::new(String::new());
        std::io::stdin().read_line(&mut line)?;
        let trimmed = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
        return Ok(trimmed);
    }

    enable_raw_mode().context("failed to enable raw mode for password prompt")?;
    let result = read_secret_keys();
    let _ = disable_raw_mode();
    eprintln!();
    result
}

fn read_secret_keys() -> Result<Zeroizing<String>> {
    let mut secret = Zeroizing::new(String::new());
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                anyhow::bail!("password prompt cancelled");
            }
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) => secret.push(c),
            _ => {}
        }
    }
}

/// Resolves on SIGTERM or SIGHUP. Ctrl-C is a keystroke for the remote shell.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("failed to install signal handlers: {e}");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = term.recv() => log::info!("SIGTERM received"),
        _ = hup.recv() => log::info!("SIGHUP received"),
    }
}

#[cfg(unix)]
async fn run_connect(
    host: String,
    username: String,
    relay: Option<String>,
    token: Option<String>,
    auth_mode: Option<AuthMode>,
) -> Result<ExitCode> {
    use shell_relay::session::runner::{drive, RelayFactory};
    use shell_relay::{FatalMarkers, RelayTarget, SessionController};

    let mut config = Config::load()?;
    if let Some(relay) = relay {
        config.relay_url = relay;
    }
    if let Some(token) = token {
        config.token = token;
    }
    if let Some(mode) = auth_mode {
        config.auth_mode = mode;
    }

    let secret = read_secret(&username, &host)?;
    let login = SessionConfig::new(host, username, secret.as_str(), config.token.as_str());
    drop(secret);

    let target = RelayTarget::from_config(&config);
    let markers = FatalMarkers::with_extra(config.extra_fatal_markers.iter().cloned());
    let detach_key = (config.detach_key != 0).then_some(config.detach_key);

    log::info!(
        "Shell Relay v{} starting ({}, auth mode {})",
        env!("CARGO_PKG_VERSION"),
        shell_relay::env::Environment::current(),
        config.auth_mode
    );
    match detach_key {
        Some(key) => eprintln!("Connecting via {} ({} to detach)...", target.url, key_label(key)),
        None => eprintln!("Connecting via {}...", target.url),
    }

    let (mut controller, mut events) = SessionController::new(RelayFactory, target, markers);
    if let Err(e) = controller.connect(login) {
        eprintln!("{e}");
        return Ok(ExitCode::FAILURE);
    }

    let notice = drive(&mut controller, &mut events, detach_key, shutdown_signal()).await;
    drop(controller);

    eprintln!("\r\n{notice}");
    Ok(if notice.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(not(unix))]
async fn run_connect(
    _host: String,
    _username: String,
    _relay: Option<String>,
    _token: Option<String>,
    _auth_mode: Option<AuthMode>,
) -> Result<ExitCode> {
    anyhow::bail!("connect needs a unix terminal");
}

fn run_config(show: bool) -> Result<()> {
    let config = Config::load()?;
    if show {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        let path = Config::config_path()?;
        if !path.exists() {
            config.save_to(&path)?;
        }
        println!("{}", path.display());
    }

    if let Some(note) = config.auth_mode.compatibility_note() {
        eprintln!("note: {note}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();

    // Restore the terminal before the default hook prints the panic
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stdout(), crossterm::cursor::Show);
        default_hook(panic_info);
    }));

    let cli = Cli::parse();

    match cli.command {
        Commands::Connect {
            host,
            username,
            relay,
            token,
            auth_mode,
        } => run_connect(host, username, relay, token, auth_mode).await,
        Commands::Config { show } => {
            run_config(show)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_label() {
        assert_eq!(key_label(0x1d), "Ctrl-]");
        assert_eq!(key_label(0x01), "Ctrl-A");
        assert_eq!(key_label(0x7f), "0x7f");
    }

    #[test]
    fn test_connect_args_parse() {
        let cli = Cli::try_parse_from([
            "shell-relay",
            "connect",
            "--host",
            "10.0.0.5:22",
            "-u",
            "root",
            "--auth-mode",
            "query",
        ])
        .unwrap();

        match cli.command {
            Commands::Connect {
                host,
                username,
                relay,
                auth_mode,
                ..
            } => {
                assert_eq!(host, "10.0.0.5:22");
                assert_eq!(username, "root");
                assert!(relay.is_none());
                assert_eq!(auth_mode, Some(AuthMode::Query));
            }
            Commands::Config { .. } => panic!("expected connect"),
        }
    }

    #[test]
    fn test_connect_requires_host() {
        assert!(Cli::try_parse_from(["shell-relay", "connect", "-u", "root"]).is_err());
    }
}
