use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkup_client::api::HttpForumApi;
use linkup_client::auth::credentials::Credentials;
use linkup_client::config::ClientConfig;
use linkup_client::session::transport::WsTransport;
use linkup_client::session::{ForumSession, NoticeLevel, SessionOptions, SessionUpdate};

/// Terminal client for LinkUp forum chat.
#[derive(Parser)]
#[command(name = "linkup-client", version)]
struct Cli {
    /// Forum to open a session for
    forum_id: String,

    /// Path to the configuration file
    #[arg(long, default_value = "linkup.toml")]
    config: String,

    /// Bearer token, overriding the stored credentials
    #[arg(long)]
    token: Option<String>,

    /// Request membership before chatting
    #[arg(long)]
    join: bool,

    /// Passcode for a protected forum (implies --join)
    #[arg(long)]
    passcode: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config);
    let mut credentials = Credentials::load(&config.auth.credentials_path)?;
    if let Some(token) = cli.token.clone() {
        credentials.token = token;
    }

    info!(
        forum_id = %cli.forum_id,
        user = %credentials.user.name,
        "opening forum session"
    );

    let transport = WsTransport::new(config.server.ws_url.clone());
    let api = Arc::new(HttpForumApi::new(
        config.server.api_url.clone(),
        credentials.token.clone(),
    ));
    let options = SessionOptions::from_config(&config);

    let mut session =
        ForumSession::spawn(cli.forum_id, credentials, transport, api, options);

    if cli.join || cli.passcode.is_some() {
        session.join_forum(cli.passcode.clone());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = session.next_update() => {
                let Some(update) = update else { break };
                render(update);
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let line = line.trim().to_string();
                        match line.as_str() {
                            "/quit" => break,
                            "/retry" => session.retry_now(),
                            "" => {}
                            _ => {
                                // Typing activity, then the send itself
                                session.input_changed(line.clone());
                                session.send_message(line);
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

fn render(update: SessionUpdate) {
    match update {
        SessionUpdate::Connection(status) => {
            println!("-- connection: {:?}", status.state);
            if let Some(detail) = status.detail {
                println!("   {}", detail);
            }
        }
        SessionUpdate::Messages(messages) => {
            if let Some(last) = messages.last() {
                println!(
                    "[{}] {}: {}",
                    last.timestamp.format("%H:%M:%S"),
                    last.sender_name,
                    last.content
                );
            }
        }
        SessionUpdate::Attendees(attendees) => {
            let names: Vec<&str> = attendees.iter().map(|a| a.user_name.as_str()).collect();
            println!("-- attendees ({}): {}", names.len(), names.join(", "));
        }
        SessionUpdate::Typing(display) => {
            if let Some(text) = display.text {
                println!("-- {}", text);
            }
        }
        SessionUpdate::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
            };
            println!("!! [{}] {}", tag, notice.text);
        }
        SessionUpdate::ForumDeleted => {
            println!("!! this forum has been deleted; session closed");
        }
    }
}
