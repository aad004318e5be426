/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use gateway::config::{Config, ConfigError, Defaults};
use gateway::shutdown_handle::ShutdownHandle;
use tokio::signal::unix::{SignalKind, signal};
use tracing::metadata::LevelFilter;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli);

    match cli.command {
        Command::Run(run_command) => {
            let spawn_handle = gateway::spawn((*run_command).try_into()?).await?;
            tracing::info!(trigger_address = %spawn_handle.local_addr(), "fixgate running");
            wait_for_shutdown_signal().await?;
            spawn_handle.shutdown_and_wait().await;
        }
        Command::DefaultRunConfig => {
            print!("{}", Config::default().into_annotated_config_file())
        }
        Command::SendTag(send_tag) => {
            gateway::trigger_server::send_tag(send_tag.address, &send_tag.tag, send_tag.newline)
                .await?;
            tracing::info!(tag = %send_tag.tag, address = %send_tag.address, "tag sent");
        }
    }

    Ok(())
}

#[derive(clap::Parser, Debug)]
struct Cli {
    #[clap(long, short, help = "Turn on debug logging (same as RUST_LOG=debug)")]
    debug: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Parser, Debug)]
enum Command {
    Run(Box<RunCommand>),
    #[clap(about = "Output a default TOML config file for use with run -c")]
    DefaultRunConfig,
    #[clap(about = "Send a single tag to a running trigger server, like a tag reader would")]
    SendTag(SendTagCommand),
}

#[derive(clap::Parser, Debug)]
struct RunCommand {
    #[clap(long, short, help = "Path to TOML configuration file")]
    config: Option<PathBuf>,
    #[clap(
        long,
        short,
        help = "Address to listen on for tag reads, overriding configuration file"
    )]
    listen_address: Option<String>,
    #[clap(long, help = "Outbox database URL, overriding configuration file")]
    database_url: Option<String>,
    #[clap(long, help = "MQTT broker host, overriding configuration file")]
    broker_host: Option<String>,
    #[clap(
        long,
        env = "FIXGATE_BROKER_PASSWORD",
        hide_env_values = true,
        help = "MQTT broker password"
    )]
    broker_password: Option<String>,
    #[clap(
        long,
        env = "FIXGATE_OAUTH_CLIENT_SECRET",
        hide_env_values = true,
        help = "OAuth2 client secret for the device manager"
    )]
    oauth_client_secret: Option<String>,
    #[clap(
        long,
        env = "FIXGATE_DEVICE_PASSWORD",
        hide_env_values = true,
        help = "Device manager password used to obtain a token"
    )]
    device_password: Option<String>,
}

impl TryInto<Config> for RunCommand {
    type Error = CliError;

    // Load the config file, or the default, allowing CLI flags and the environment to override the
    // corresponding settings.
    fn try_into(self) -> Result<Config, Self::Error> {
        let mut config = if let Some(config_path) = self.config {
            Config::load(&config_path)?
        } else {
            Config::default()
        };

        if let Some(address) = self.listen_address {
            config.listen_address =
                address
                    .parse()
                    .map_err(|error| CliError::InvalidListeningAddress {
                        addr: address,
                        error,
                    })?;
        }
        if let Some(database_url) = self.database_url {
            config.outbox.database_url = database_url;
        }
        if let Some(broker_host) = self.broker_host {
            config.broker.host = broker_host;
        }
        if let Some(broker_password) = self.broker_password {
            config.broker.password = Some(broker_password);
        }
        if let Some(oauth_client_secret) = self.oauth_client_secret {
            config.credentials.client_secret = Some(oauth_client_secret);
        }
        if let Some(device_password) = self.device_password {
            config.credentials.password = Some(device_password);
        }

        Ok(config)
    }
}

#[derive(clap::Parser, Debug)]
struct SendTagCommand {
    #[clap(help = "Tag identifier to send")]
    tag: String,
    #[clap(
        long,
        short,
        default_value_t = Defaults::listen_address(),
        help = "Address of the trigger server"
    )]
    address: SocketAddr,
    #[clap(long, action, help = "Terminate the tag with a newline (for newline framing)")]
    newline: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("Invalid listening address {addr}: {error}")]
    InvalidListeningAddress { addr: String, error: AddrParseError },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

async fn wait_for_shutdown_signal() -> eyre::Result<()> {
    let mut term_signal = signal(SignalKind::terminate())?;
    tokio::select! {
        biased;
        _ = term_signal.recv() => {
            tracing::info!("TERM signal received, shutting down");
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted, shutting down");
        }
    }
    Ok(())
}

fn setup_logging(cli: &Cli) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if cli.debug {
        Some(LevelFilter::DEBUG)
    } else {
        None
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::default().compact())
        .with(
            EnvFilter::builder()
                .with_default_directive(level.map(Into::into).unwrap_or(LevelFilter::INFO.into()))
                .from_env_lossy(),
        )
        .try_init()
    {
        panic!(
            "Failed to initialize trace logging for fixgate. It's possible some earlier code path \
            has already set a global default log subscriber: {e}"
        );
    }
}
