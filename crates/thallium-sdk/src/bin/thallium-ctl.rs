// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! thallium-ctl - command line client for a thallium-core server.
//!
//! ```text
//! thallium-ctl --session s1 send sign-request --message '{"id": 42, "guid": "..."}'
//! thallium-ctl --session s1 poll
//! thallium-ctl --session s1 watch --count 3
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use thallium_sdk::{ClientMessageBus, CommandKind, ReceivedMessage, SdkConfig};

#[derive(Parser, Debug)]
#[command(name = "thallium-ctl", version, about, long_about = None)]
struct Cli {
    /// RPC endpoint of the server
    #[arg(long, env = "THALLIUM_SERVER_URL")]
    server_url: Option<String>,

    /// Session to send and poll for
    #[arg(long, env = "THALLIUM_SESSION_ID")]
    session: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one command
    Send {
        /// Command name, e.g. sign-request
        command: String,

        /// JSON message body
        #[arg(long)]
        message: Option<String>,
    },
    /// Retrieve pending replies once
    Poll,
    /// Keep polling and print replies as they arrive
    Watch {
        /// Stop after this many replies
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thallium_sdk=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SdkConfig::new(cli.session);
    if let Some(url) = cli.server_url {
        config = config.with_server_url(url);
    }
    let bus = ClientMessageBus::from_config(&config)?;

    match cli.command {
        Command::Send { command, message } => {
            command
                .parse::<CommandKind>()
                .with_context(|| format!("cannot send '{}'", command))?;
            let message = message
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .context("--message is not valid JSON")?;

            bus.add(command, message);
            let sent = bus.send().await?;
            info!(sent, "Submitted");
        }
        Command::Poll => {
            for reply in bus.poll().await? {
                print_reply(&reply)?;
            }
        }
        Command::Watch { count } => watch(&bus, &config, count).await?,
    }

    Ok(())
}

async fn watch(bus: &ClientMessageBus, config: &SdkConfig, count: Option<usize>) -> Result<()> {
    let mut ticker = tokio::time::interval(config.poll_interval());
    let mut seen = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                for reply in bus.poll().await? {
                    print_reply(&reply)?;
                    seen += 1;
                }
                if count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_reply(reply: &ReceivedMessage) -> Result<()> {
    println!("{}", serde_json::to_string(reply)?);
    Ok(())
}
