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

pub mod config;
pub mod context;
pub mod credentials;
pub mod delivery;
pub mod location;
pub mod message;
pub mod modem;
pub mod outbox;
pub mod shutdown_handle;
pub mod trigger_server;

use std::net::SocketAddr;
use std::sync::Arc;

use mqtt_publisher::{ClientCredentials, MqttPublisher, PublisherError, PublisherOptions};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{Config, ConfigError};
use crate::context::GatewayContext;
use crate::credentials::{
    CredentialError, CredentialStore, PasswordGrant, TokenSource, run_refresh_loop,
};
use crate::delivery::{CooldownTimer, DeliveryCoordinator, MqttBrokerPublisher};
use crate::location::{FixTracker, run_feed_loop};
use crate::modem::{ModemCache, ModemError};
use crate::outbox::{OutboxError, OutboxStore, SqliteOutbox, Sweeper, run_sweep_loop};
use crate::shutdown_handle::{ShutdownHandle, TaskHandle};

/// Run the gateway in the background, returning a [`SpawnHandle`] once the trigger server is
/// listening. When the handle is dropped, the gateway shuts down.
pub async fn spawn(config: Config) -> Result<SpawnHandle, SpawnError> {
    config.validate()?;
    let qos = config.broker.mqtt_qos()?;

    // 1) Open the outbox
    let outbox: Arc<dyn OutboxStore> =
        Arc::new(SqliteOutbox::connect(&config.outbox.database_url).await?);

    // 2) Connect to the broker
    let mut options = PublisherOptions::default()
        .with_qos(qos)
        .with_keep_alive(config.broker.keep_alive)
        .with_ack_timeout(config.broker.ack_timeout)
        .with_reconnect_delay(config.broker.reconnect_delay)
        .with_message_channel_capacity(config.broker.channel_capacity);
    if let Some(username) = &config.broker.username {
        options = options.with_credentials(ClientCredentials {
            username: username.clone(),
            password: config.broker.password.clone().unwrap_or_default(),
        });
    }
    let (mqtt, mqtt_event_loop) = MqttPublisher::connect(
        config.broker.host.clone(),
        config.broker.port,
        config.broker.client_id.clone(),
        options,
    )?;
    let publisher = Arc::new(MqttBrokerPublisher::new(mqtt, config.broker.topic.clone()));

    // 3) Shared state
    let credentials = CredentialStore::new();
    let cooldown = Arc::new(CooldownTimer::new(config.delivery.cooldown));
    let coordinator = Arc::new(DeliveryCoordinator::new(
        publisher.clone(),
        outbox.clone(),
        cooldown.clone(),
    ));
    let sweeper = Arc::new(Sweeper::new(outbox, publisher.clone(), cooldown));
    let context = Arc::new(GatewayContext {
        modem: Arc::new(ModemCache::new(&config.modem, credentials.clone())?),
        fixes: Arc::new(FixTracker::new()),
        credentials,
        coordinator,
    });

    // 4) Background loops
    let credential_refresh = match &config.credentials.token_url {
        Some(token_url) => {
            let source: Arc<dyn TokenSource> =
                Arc::new(PasswordGrant::new(&config.credentials, token_url)?);
            let store = context.credentials.clone();
            let refresh_interval = config.credentials.refresh_interval;
            let retry_interval = config.credentials.retry_interval;
            Some(TaskHandle::spawn(|shutdown| {
                run_refresh_loop(source, store, refresh_interval, retry_interval, shutdown)
            }))
        }
        None => {
            tracing::warn!("no credentials.token_url configured, modem status will not be refreshed");
            None
        }
    };

    let location_feed = {
        let url = config.location_feed.url.clone();
        let fixes = context.fixes.clone();
        let reconnect_interval = config.location_feed.reconnect_interval;
        TaskHandle::spawn(|shutdown| run_feed_loop(url, fixes, reconnect_interval, shutdown))
    };

    let outbox_sweeper = {
        let sweep_interval = config.outbox.sweep_interval;
        TaskHandle::spawn(|shutdown| run_sweep_loop(sweeper, sweep_interval, shutdown))
    };

    // 5) Start taking tags
    let trigger_server = trigger_server::spawn(
        config.listen_address,
        config.trigger_framing,
        context.clone(),
    )
    .await?;
    let local_addr = trigger_server.local_addr();

    // 6) Wait for a shutdown signal, then stop the above, tag intake first and broker last
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join_handle = tokio::spawn(async move {
        shutdown_rx.await.ok();
        trigger_server.shutdown_and_wait().await;
        outbox_sweeper.shutdown_and_wait().await;
        location_feed.shutdown_and_wait().await;
        if let Some(credential_refresh) = credential_refresh {
            credential_refresh.shutdown_and_wait().await;
        }

        tracing::info!(
            delivery = ?context.coordinator.stats(),
            publish = ?publisher.publish_stats(),
            "gateway stopping"
        );
        mqtt_event_loop.shutdown_and_wait().await;
    });

    Ok(SpawnHandle {
        shutdown_tx,
        join_handle,
        local_addr,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Error opening outbox: {0}")]
    Outbox(#[from] OutboxError),
    #[error("Error setting up MQTT publisher: {0}")]
    Publisher(#[from] PublisherError),
    #[error("Error setting up token refresh: {0}")]
    Credentials(#[from] CredentialError),
    #[error("Error setting up modem client: {0}")]
    Modem(#[from] ModemError),
    #[error("Error spawning trigger server: {0}")]
    TriggerServer(#[from] trigger_server::SpawnError),
}

pub struct SpawnHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl SpawnHandle {
    /// Address the trigger server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl ShutdownHandle<()> for SpawnHandle {
    fn into_parts(self) -> (oneshot::Sender<()>, JoinHandle<()>) {
        (self.shutdown_tx, self.join_handle)
    }
}
