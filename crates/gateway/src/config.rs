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

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use duration_str::deserialize_duration;
use mqtt_publisher::QoS;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
/// Configuration for fixgate. Fields are documented as comments in the output of [`Config::into_annotated_config_file`].
pub struct Config {
    #[serde(default = "Defaults::listen_address")]
    pub listen_address: SocketAddr,
    #[serde(default)]
    pub trigger_framing: TriggerFraming,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub location_feed: LocationFeedConfig,
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: Defaults::listen_address(),
            trigger_framing: TriggerFraming::default(),
            broker: BrokerConfig::default(),
            delivery: DeliveryConfig::default(),
            outbox: OutboxConfig::default(),
            location_feed: LocationFeedConfig::default(),
            modem: ModemConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

/// How bytes read from a trigger connection are split into tags.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFraming {
    /// Every read from the socket is one tag.
    #[default]
    Chunk,
    /// Tags are terminated by `\n` (a trailing `\r` is dropped).
    Newline,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    #[serde(default = "Defaults::broker_host")]
    pub host: String,
    #[serde(default = "Defaults::broker_port")]
    pub port: u16,
    #[serde(default = "Defaults::broker_client_id")]
    pub client_id: String,
    #[serde(default = "Defaults::broker_username")]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "Defaults::broker_topic")]
    pub topic: String,
    #[serde(default = "Defaults::broker_qos")]
    pub qos: u8,
    #[serde(
        default = "Defaults::broker_keep_alive",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub keep_alive: Duration,
    #[serde(
        default = "Defaults::broker_ack_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub ack_timeout: Duration,
    #[serde(
        default = "Defaults::broker_reconnect_delay",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub reconnect_delay: Duration,
    #[serde(default = "Defaults::broker_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: Defaults::broker_host(),
            port: Defaults::broker_port(),
            client_id: Defaults::broker_client_id(),
            username: Defaults::broker_username(),
            password: None,
            topic: Defaults::broker_topic(),
            qos: Defaults::broker_qos(),
            keep_alive: Defaults::broker_keep_alive(),
            ack_timeout: Defaults::broker_ack_timeout(),
            reconnect_delay: Defaults::broker_reconnect_delay(),
            channel_capacity: Defaults::broker_channel_capacity(),
        }
    }
}

impl BrokerConfig {
    pub fn mqtt_qos(&self) -> Result<QoS, ConfigError> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    #[serde(
        default = "Defaults::cooldown",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub cooldown: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            cooldown: Defaults::cooldown(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OutboxConfig {
    #[serde(default = "Defaults::database_url")]
    pub database_url: String,
    #[serde(
        default = "Defaults::sweep_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub sweep_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            database_url: Defaults::database_url(),
            sweep_interval: Defaults::sweep_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LocationFeedConfig {
    #[serde(default = "Defaults::location_feed_url")]
    pub url: String,
    #[serde(
        default = "Defaults::location_feed_reconnect_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub reconnect_interval: Duration,
}

impl Default for LocationFeedConfig {
    fn default() -> Self {
        Self {
            url: Defaults::location_feed_url(),
            reconnect_interval: Defaults::location_feed_reconnect_interval(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ModemConfig {
    #[serde(default = "Defaults::modem_status_url")]
    pub status_url: String,
    #[serde(
        default = "Defaults::request_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            status_url: Defaults::modem_status_url(),
            request_timeout: Defaults::request_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CredentialsConfig {
    /// OAuth2 token endpoint of the device manager. Without it no token is ever fetched and modem
    /// data is not refreshed.
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(
        default = "Defaults::refresh_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub refresh_interval: Duration,
    #[serde(
        default = "Defaults::retry_interval",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub retry_interval: Duration,
    #[serde(
        default = "Defaults::request_timeout",
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_url: None,
            client_id: String::new(),
            client_secret: None,
            username: String::new(),
            password: None,
            refresh_interval: Defaults::refresh_interval(),
            retry_interval: Defaults::retry_interval(),
            request_timeout: Defaults::request_timeout(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg = std::fs::read_to_string(path).map_err(|error| ConfigError::CouldNotRead {
            path: path.to_string_lossy().to_string(),
            error,
        })?;
        let config = toml::from_str::<Self>(&cfg).map_err(|error| ConfigError::InvalidToml {
            path: path.to_string_lossy().to_string(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.mqtt_qos()?;
        if self.broker.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.outbox.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("outbox.sweep_interval"));
        }
        if self.credentials.refresh_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("credentials.refresh_interval"));
        }
        Ok(())
    }

    pub fn into_annotated_config_file(self) -> String {
        let Self {
            listen_address,
            trigger_framing,
            broker,
            delivery,
            outbox,
            location_feed,
            modem,
            credentials,
        } = self;
        let listen_address = listen_address.to_string();
        let trigger_framing = match trigger_framing {
            TriggerFraming::Chunk => "chunk",
            TriggerFraming::Newline => "newline",
        };
        let broker_username = match broker.username {
            Some(username) => format!("username = {username:?}"),
            None => "# username = \"<username>\"".to_string(),
        };
        let broker_keep_alive = humantime::format_duration(broker.keep_alive).to_string();
        let broker_ack_timeout = humantime::format_duration(broker.ack_timeout).to_string();
        let broker_reconnect_delay = humantime::format_duration(broker.reconnect_delay).to_string();
        let cooldown = humantime::format_duration(delivery.cooldown).to_string();
        let sweep_interval = humantime::format_duration(outbox.sweep_interval).to_string();
        let feed_reconnect_interval =
            humantime::format_duration(location_feed.reconnect_interval).to_string();
        let modem_request_timeout = humantime::format_duration(modem.request_timeout).to_string();
        let refresh_interval = humantime::format_duration(credentials.refresh_interval).to_string();
        let retry_interval = humantime::format_duration(credentials.retry_interval).to_string();
        let credentials_request_timeout =
            humantime::format_duration(credentials.request_timeout).to_string();

        format!(
            r#"
#####
## This is a default config file for fixgate. Everything in this file is optional: Any non-comment
## line in this file simply represents default values. Commented lines with a single `#` represent
## examples for optional configuration which is not part of the default config.
#####

## What address to listen on for trigger (RFID tag) connections.
listen_address = {listen_address:?}

## How tags are split out of a trigger connection: "chunk" treats every read as one tag, "newline"
## expects each tag to end with a newline.
trigger_framing = {trigger_framing:?}

[broker]
host = {broker_host:?}
port = {broker_port}
client_id = {broker_client_id:?}
{broker_username}
## Prefer the FIXGATE_BROKER_PASSWORD environment variable over putting the password here.
# password = "<password>"

## Topic every message is published to.
topic = {broker_topic:?}

## MQTT QoS level for publishes (0, 1 or 2).
qos = {broker_qos}

keep_alive = {broker_keep_alive:?}

## How long a publish waits for the broker's acknowledgement before it's considered unconfirmed.
ack_timeout = {broker_ack_timeout:?}

## How long to wait before reconnecting after a broker connection error.
reconnect_delay = {broker_reconnect_delay:?}

## Number of requests the MQTT client buffers before publishes are rejected.
channel_capacity = {broker_channel_capacity}

[delivery]
## If no publish has been confirmed for this long, new messages go straight to the outbox.
cooldown = {cooldown:?}

[outbox]
## SQLite database holding messages that couldn't be delivered.
database_url = {database_url:?}

## How often stored messages are retried.
sweep_interval = {sweep_interval:?}

[location_feed]
## Websocket streaming GPS samples.
url = {feed_url:?}

## How long to wait before reconnecting to the feed after it drops.
reconnect_interval = {feed_reconnect_interval:?}

[modem]
## REST endpoint returning the modem's link details.
status_url = {modem_status_url:?}
request_timeout = {modem_request_timeout:?}

[credentials]
## OAuth2 token endpoint for the device manager. If unset, modem data is never refreshed.
# token_url = "http://<device>/oauth2/token"
client_id = {credentials_client_id:?}
username = {credentials_username:?}
## Prefer the FIXGATE_OAUTH_CLIENT_SECRET and FIXGATE_DEVICE_PASSWORD environment variables.
# client_secret = "<secret>"
# password = "<password>"

## How often to refresh the token. Should be shorter than the token lifetime.
refresh_interval = {refresh_interval:?}

## How long to wait before retrying a failed token request.
retry_interval = {retry_interval:?}
request_timeout = {credentials_request_timeout:?}
"#,
            broker_host = broker.host,
            broker_port = broker.port,
            broker_client_id = broker.client_id,
            broker_topic = broker.topic,
            broker_qos = broker.qos,
            broker_channel_capacity = broker.channel_capacity,
            database_url = outbox.database_url,
            feed_url = location_feed.url,
            modem_status_url = modem.status_url,
            credentials_client_id = credentials.client_id,
            credentials_username = credentials.username,
        )
    }
}

pub struct Defaults;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file at {path}: {error}")]
    CouldNotRead { path: String, error: std::io::Error },
    #[error("TOML error reading config file at {path}: {error}")]
    InvalidToml {
        path: String,
        error: toml::de::Error,
    },
    #[error("Invalid MQTT QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("broker.client_id must not be empty")]
    EmptyClientId,
}

impl Defaults {
    pub fn listen_address() -> SocketAddr {
        "127.0.0.1:5247"
            .parse()
            .expect("BUG: default listen_address is invalid")
    }

    pub fn broker_host() -> String {
        "localhost".to_string()
    }

    pub fn broker_port() -> u16 {
        1883
    }

    pub fn broker_client_id() -> String {
        "clientest".to_string()
    }

    pub fn broker_username() -> Option<String> {
        Some("testerE".to_string())
    }

    pub fn broker_topic() -> String {
        "gps".to_string()
    }

    pub fn broker_qos() -> u8 {
        2
    }

    pub fn broker_keep_alive() -> Duration {
        mqtt_publisher::options::DEFAULT_KEEP_ALIVE
    }

    pub fn broker_ack_timeout() -> Duration {
        mqtt_publisher::options::DEFAULT_ACK_TIMEOUT
    }

    pub fn broker_reconnect_delay() -> Duration {
        mqtt_publisher::options::DEFAULT_RECONNECT_DELAY
    }

    pub fn broker_channel_capacity() -> usize {
        mqtt_publisher::options::DEFAULT_MESSAGE_CHANNEL_CAPACITY
    }

    pub fn cooldown() -> Duration {
        Duration::from_secs(5 * 60)
    }

    pub fn database_url() -> String {
        "sqlite:///var/lib/fixgate/outbox.db".to_string()
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(30 * 60)
    }

    pub fn location_feed_url() -> String {
        "ws://192.168.0.100:31768/ws/tdce/gps/data".to_string()
    }

    pub fn location_feed_reconnect_interval() -> Duration {
        Duration::from_secs(5)
    }

    pub fn modem_status_url() -> String {
        "http://192.168.0.100/devicemanager/api/v1/networking/modem/ppp0/details".to_string()
    }

    pub fn request_timeout() -> Duration {
        Duration::from_secs(15)
    }

    pub fn refresh_interval() -> Duration {
        Duration::from_secs(59 * 60)
    }

    pub fn retry_interval() -> Duration {
        Duration::ZERO
    }
}

fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}s", d.as_secs()))
}
