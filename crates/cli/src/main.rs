// SPDX-License-Identifier: Apache-2.0

//! `teleclaude`: CLI surface for the local daemon.
//!
//! Exit codes: 0 success, 1 generic failure, 2 validation failure.

mod client;

use clap::{Parser, Subcommand};
use client::ClientError;
use std::time::Duration;
use teleclaude_core::session::AdapterKey;
use teleclaude_daemon::{Request, Response};

#[derive(Parser)]
#[command(name = "teleclaude", about = "TeleClaude coordination daemon CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon in the background.
    Start,
    /// Request a graceful daemon shutdown.
    Stop,
    /// List active sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Send a message into a session's input queue.
    Send {
        session_id: String,
        message: String,
        #[arg(long, default_value = "web")]
        origin: String,
    },
    /// Close a session.
    End {
        session_id: String,
        #[arg(long, default_value = "cli")]
        reason: String,
    },
    /// Push locally-built artifacts to the configured distribution target.
    Sync,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List active sessions.
    List,
    /// Promote a session to human relay.
    Escalate {
        session_id: String,
        #[arg(long, default_value = "manual escalation")]
        reason: String,
    },
}

fn parse_origin(s: &str) -> Result<AdapterKey, String> {
    match s {
        "telegram" => Ok(AdapterKey::Telegram),
        "discord" => Ok(AdapterKey::Discord),
        "whatsapp" => Ok(AdapterKey::WhatsApp),
        "web" => Ok(AdapterKey::Web),
        "tui" => Ok(AdapterKey::Tui),
        "mcp" => Ok(AdapterKey::Mcp),
        other => Err(format!("unknown origin adapter: {other}")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = run(cli.command).await;
    std::process::exit(code);
}

async fn run(command: Command) -> i32 {
    match command {
        Command::Start => match client::start_daemon(Duration::from_secs(10)).await {
            Ok(()) => {
                println!("daemon started");
                0
            }
            Err(e) => fail(e),
        },
        Command::Stop => match client::stop_daemon().await {
            Ok(()) => {
                println!("daemon stopping");
                0
            }
            Err(e) => fail(e),
        },
        Command::Sessions { action: SessionsAction::List } => match client::send_request(Request::ListSessions).await {
            Ok(Response::Sessions { sessions }) => {
                for s in sessions {
                    println!("{}\t{}\t{:?}", s.id, s.computer_name, s.lifecycle_status);
                }
                0
            }
            Ok(other) => fail_unexpected(&other),
            Err(e) => fail(e),
        },
        Command::Sessions { action: SessionsAction::Escalate { session_id, reason } } => {
            match client::send_request(Request::Escalate { id: session_id, reason }).await {
                Ok(Response::Ok) => 0,
                Ok(other) => fail_unexpected(&other),
                Err(e) => fail(e),
            }
        }
        Command::Send { session_id, message, origin } => {
            let Ok(origin) = parse_origin(&origin) else {
                eprintln!("invalid --origin: {origin}");
                return 2;
            };
            match client::send_request(Request::SendMessage { session_id, origin, content: message, source_message_id: None }).await {
                Ok(Response::Accepted { queued_id }) => {
                    println!("queued: {queued_id}");
                    0
                }
                Ok(other) => fail_unexpected(&other),
                Err(e) => fail(e),
            }
        }
        Command::End { session_id, reason } => match client::send_request(Request::EndSession { id: session_id, reason }).await {
            Ok(Response::Ok) => 0,
            Ok(other) => fail_unexpected(&other),
            Err(e) => fail(e),
        },
        Command::Sync => {
            eprintln!("sync is handled by the external artifact-distribution pipeline, not the daemon");
            0
        }
    }
}

fn fail(e: ClientError) -> i32 {
    eprintln!("{e}");
    1
}

fn fail_unexpected(response: &Response) -> i32 {
    match response {
        Response::Error { message } => {
            eprintln!("{message}");
            1
        }
        other => {
            eprintln!("unexpected response: {other:?}");
            1
        }
    }
}
