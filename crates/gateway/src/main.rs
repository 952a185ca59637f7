// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tracing::error;

use authgate::config::GatewayConfig;
use authgate::credential::epoch_secs;
use authgate::credential::persist::FileVault;
use authgate::credential::store::CredentialStore;
use authgate::scheduler::renewal_delay;
use authgate::{AccessCredential, ApiRequest, AuthSession, CredentialPair, RenewalCredential};

#[derive(Debug, Parser)]
#[command(name = "authgate", version, about = "Authenticated API calls with automatic credential renewal")]
struct Cli {
    #[command(flatten)]
    config: GatewayConfig,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "AUTHGATE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store an already-obtained credential pair.
    Login {
        /// Access token (JWT).
        #[arg(long)]
        token: String,
        /// Renewal token.
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Forget the stored credentials.
    Logout,
    /// Show the stored session.
    Status,
    /// Issue one authenticated call and print the response body.
    Call {
        /// HTTP method, e.g. GET or POST.
        method: String,
        /// Path relative to the base URL, e.g. /api/goals.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// Keep the session renewed and log notifications until interrupted.
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let vault = Arc::new(FileVault::in_dir(&cli.config.state_dir()));

    // Only `call` and `watch` run a live session; the others touch the stored
    // pair and exit without starting renewals they could not finish.
    match cli.command {
        Command::Login { token, refresh_token } => {
            let pair = CredentialPair::new(
                AccessCredential::new(token),
                refresh_token.map(RenewalCredential::new),
            );
            if pair.access.expires_at().is_none() {
                tracing::warn!("token has no readable expiry; it will only be renewed on 401");
            }
            CredentialStore::new(vault).set(pair);
            println!("logged in");
        }
        Command::Logout => {
            CredentialStore::new(vault).clear();
            println!("logged out");
        }
        Command::Status => print_status(&CredentialStore::rehydrate(vault), &cli.config),
        Command::Call { method, path, body } => {
            let session = AuthSession::start_one_shot(&cli.config, vault)?;
            let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = ApiRequest::new(method, path);
            if let Some(body) = body {
                request = request.with_body(serde_json::from_str(&body)?);
            }
            let result = session.gateway().call(request).await;
            // Let a renewal started on our behalf persist the rotated pair.
            let _ = session.coordinator().settled().await;
            let resp = result?;
            println!("{}", serde_json::to_string_pretty(&resp.data)?);
        }
        Command::Watch => {
            let session = AuthSession::start(&cli.config, vault)?;
            watch(&session).await?;
        }
    }

    Ok(())
}

fn print_status(store: &CredentialStore, config: &GatewayConfig) {
    let Some(pair) = store.get() else {
        println!("not logged in");
        return;
    };
    let Some(exp) = pair.access.expires_at() else {
        println!("expires_at: unknown");
        return;
    };
    println!("expires_at: {exp} (in {}s)", exp.saturating_sub(epoch_secs()));
    println!("renewal credential: {}", if pair.renewal.is_some() { "present" } else { "absent" });
    match renewal_delay(exp, epoch_secs(), config.safety_margin()) {
        Some(delay) => println!("next renewal in: {}s", delay.as_secs()),
        None => println!("next renewal: due"),
    }
}

async fn watch(session: &AuthSession) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    let mut resumed = resume_signal()?;
    tracing::info!("watching session, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = resumed.recv() => {
                tracing::info!("process resumed, re-validating credentials");
                session.on_resume();
            }
            event = events.recv() => match event {
                Ok(event) => tracing::info!(event = event.name(), "{event}"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "notification stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.shutdown();
    Ok(())
}

/// SIGCONT marks the process resuming after a stop.
#[cfg(unix)]
fn resume_signal() -> anyhow::Result<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{signal, SignalKind};
    let kind = SignalKind::from_raw(nix::sys::signal::Signal::SIGCONT as std::os::raw::c_int);
    Ok(signal(kind)?)
}

#[cfg(not(unix))]
fn resume_signal() -> anyhow::Result<NeverResumed> {
    Ok(NeverResumed)
}

#[cfg(not(unix))]
struct NeverResumed;

#[cfg(not(unix))]
impl NeverResumed {
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
