use std::io::{self, Write};
use std::sync::Arc;

use ada_auth::biometric::NoBiometrics;
use ada_auth::{AuthManager, BiometricVerifier, EnrollmentData};
use ada_client::{ServerClient, ServerEvent};
use ada_core::push::{self, Channel, Notification, NotificationSink, PushPayload};
use ada_core::ServerConfig;
use ada_prefs::PrefStore;
use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "ada-cli")]
#[command(about = "Terminal client for the A.D.A. assistant server")]
#[command(version)]
struct Cli {
    /// Server host override; persisted for later runs
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with username and passcode
    Login {
        username: Option<String>,
    },
    /// Enroll a new account
    Enroll {
        /// Path to an optional voice sample
        #[arg(long)]
        voice: Option<std::path::PathBuf>,
        /// Path to an optional face capture
        #[arg(long)]
        face: Option<std::path::PathBuf>,
    },
    /// Send a single message
    Send {
        message: String,
    },
    /// Start an interactive chat
    Chat,
    /// Show connection, telemetry and session state
    Status,
    /// Probe server health
    Health,
    /// Connect the realtime channel and print incoming events
    Listen,
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let prefs = Arc::new(PrefStore::open_default().context("opening preference store")?);

    if let Some(server) = &cli.server {
        prefs.set_server_url(server)?;
    }
    let mut config = ServerConfig::new();
    if let Some(host) = prefs.server_url()? {
        config.host = host;
    }

    let client = Arc::new(ServerClient::new(config)?);
    let biometrics = NoBiometrics;
    let auth = AuthManager::new(prefs.clone(), client.clone(), biometrics.is_available());

    match cli.command {
        Commands::Login { username } => login(&auth, username).await,
        Commands::Enroll { voice, face } => enroll(&auth, voice, face).await,
        Commands::Send { message } => send(&client, &message).await,
        Commands::Chat => chat(&client, &auth).await,
        Commands::Status => status(&client, &auth).await,
        Commands::Health => health(&client).await,
        Commands::Listen => listen(&client).await,
        Commands::Logout => {
            auth.logout();
            println!("{}", "Logged out.".green());
            Ok(())
        }
    }
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn print_auth_error(auth: &AuthManager) {
    if let Some(error) = auth.state().error {
        eprintln!("{} {error}", "error:".red());
    }
}

async fn login(auth: &AuthManager, username: Option<String>) -> anyhow::Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt("Username")?,
    };
    let passcode = prompt("Passcode")?;

    if auth.login(&username, &passcode).await {
        println!("{} Logged in as {}", "ok:".green(), username.bold());
    } else {
        print_auth_error(auth);
    }
    Ok(())
}

async fn enroll(
    auth: &AuthManager,
    voice: Option<std::path::PathBuf>,
    face: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let username = prompt("Username (3+ characters)")?;
    let passcode = prompt("Passcode (8+ characters)")?;
    let confirm_passcode = prompt("Confirm passcode")?;
    let terms = prompt("Accept the terms of use? [y/N]")?;

    let voice_data = match voice {
        Some(path) => Some(std::fs::read(&path).with_context(|| format!("reading {path:?}"))?),
        None => None,
    };
    let face_data = match face {
        Some(path) => Some(std::fs::read(&path).with_context(|| format!("reading {path:?}"))?),
        None => None,
    };

    let data = EnrollmentData {
        username: username.clone(),
        passcode,
        confirm_passcode,
        voice_data,
        face_data,
        agreed_to_terms: terms.eq_ignore_ascii_case("y"),
    };

    if auth.enroll_user(&data).await {
        println!("{} Enrolled and logged in as {}", "ok:".green(), username.bold());
    } else {
        print_auth_error(auth);
    }
    Ok(())
}

fn render_reply(response: Option<Value>) -> String {
    let Some(response) = response else {
        return "(empty response)".to_string();
    };
    response
        .get("response")
        .or_else(|| response.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

async fn send(client: &ServerClient, message: &str) -> anyhow::Result<()> {
    let response = client.send_message(message).await?;
    println!("{} {}", "A.D.A.:".cyan().bold(), render_reply(response));
    Ok(())
}

async fn chat(client: &ServerClient, auth: &AuthManager) -> anyhow::Result<()> {
    if !auth.is_authenticated() {
        eprintln!("{}", "Not logged in; replies may be rejected.".yellow());
    }
    println!("{}", "Interactive chat. Type 'exit' to quit.".dimmed());

    loop {
        let line = prompt(&"you".bold().to_string())?;
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        match client.send_message(&line).await {
            Ok(response) => {
                println!("{} {}", "A.D.A.:".cyan().bold(), render_reply(response))
            }
            Err(e) => eprintln!("{} {e}", "error:".red()),
        }
    }
    Ok(())
}

async fn status(client: &ServerClient, auth: &AuthManager) -> anyhow::Result<()> {
    client.check_server_health().await;
    let telemetry = client.telemetry();
    let auth_state = auth.state();

    println!("connection:  {:?}", client.connection_state());
    println!("latency:     {} ms", telemetry.latency_ms);
    println!(
        "server:      {}",
        telemetry.server_version.as_deref().unwrap_or("unknown")
    );
    println!(
        "heartbeat:   {}",
        telemetry
            .last_heartbeat
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    match auth_state.user {
        Some(user) => println!("session:     {} ({})", user.username.bold(), user.id),
        None => println!("session:     {}", "none".dimmed()),
    }
    Ok(())
}

async fn health(client: &ServerClient) -> anyhow::Result<()> {
    if client.check_server_health().await {
        let telemetry = client.telemetry();
        println!(
            "{} server {} reachable in {} ms",
            "ok:".green(),
            telemetry.server_version.as_deref().unwrap_or("unknown"),
            telemetry.latency_ms
        );
    } else {
        eprintln!("{} server unreachable", "error:".red());
    }
    Ok(())
}

/// Presents routed push notifications on the terminal.
struct TerminalSink;

#[async_trait]
impl NotificationSink for TerminalSink {
    async fn show(&self, notification: Notification) -> anyhow::Result<()> {
        let badge = match notification.channel {
            Channel::Urgent => "URGENT".red().bold(),
            Channel::Voice => "VOICE".magenta().bold(),
            Channel::Main => "NOTE".blue().bold(),
        };
        println!("[{badge}] {}: {}", notification.title.bold(), notification.body);
        Ok(())
    }
}

async fn handle_event(event: ServerEvent, sink: &TerminalSink) {
    let (label, data) = match event {
        ServerEvent::AdaResponse(data) => ("ada_response", data),
        ServerEvent::ConsciousnessUpdate(data) => ("consciousness_update", data),
        ServerEvent::EmotionState(data) => ("emotion_state", data),
    };

    // Push-shaped payloads go through the notification router; everything
    // else prints raw.
    if data.get("type").is_some() {
        if let Ok(payload) = serde_json::from_value::<PushPayload>(data.clone()) {
            match push::deliver(&payload, sink).await {
                Ok(Some((state, emotional_state))) => {
                    println!(
                        "[{}] state={state} emotion={emotional_state}",
                        "MIND".cyan().bold()
                    );
                }
                Ok(None) => {}
                Err(e) => eprintln!("{} {e}", "error:".red()),
            }
            return;
        }
    }
    println!("{} {data}", format!("[{label}]").dimmed());
}

async fn listen(client: &ServerClient) -> anyhow::Result<()> {
    let mut events = client.subscribe_events();
    let mut state_rx = client.subscribe_state();
    client.connect();

    println!("{}", "Listening for server events (Ctrl-C to stop)".dimmed());
    let sink = TerminalSink;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_ok() {
                    println!("{} {:?}", "[link]".dimmed(), *state_rx.borrow());
                }
            }
            event = events.recv() => match event {
                Ok(event) => handle_event(event, &sink).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("dropped {missed} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    client.disconnect();
    Ok(())
}
