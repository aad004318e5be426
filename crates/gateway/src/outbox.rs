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

//! Durable store for messages the broker didn't confirm in time, and the sweeper that retries
//! them.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use humantime::format_duration as dt;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::{Mutex, oneshot};

use crate::delivery::{BrokerPublisher, CooldownTimer, PublishOutcome};
use crate::location::LocationSample;
use crate::message::OutboundMessage;
use crate::modem::ModemSnapshot;

/// This is re-used for every test as well as [`migrate`]. Do not call `sqlx::migrate!` from
/// anywhere else, it embeds the migrations into the binary again each time.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[tracing::instrument(skip(pool))]
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: i64,
    pub message: OutboundMessage,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persist `message`, returning the id of the new record.
    async fn insert(&self, message: &OutboundMessage) -> Result<i64, OutboxError>;

    /// All stored records, oldest first.
    async fn pending(&self) -> Result<Vec<OutboxRecord>, OutboxError>;

    /// Remove the record with `id`. Returns false if it was already gone.
    async fn delete(&self, id: i64) -> Result<bool, OutboxError>;
}

#[derive(thiserror::Error, Debug)]
pub enum OutboxError {
    #[error("invalid outbox database URL {url}: {error}")]
    InvalidUrl { url: String, error: sqlx::Error },
    #[error("could not create outbox directory {path}: {error}")]
    CreateDir {
        path: String,
        error: std::io::Error,
    },
    #[error("could not open outbox database: {0}")]
    Connect(sqlx::Error),
    #[error("outbox migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("outbox query {op} failed: {error}")]
    Query {
        op: &'static str,
        error: sqlx::Error,
    },
}

impl OutboxError {
    fn query(op: &'static str, error: sqlx::Error) -> Self {
        Self::Query { op, error }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    altitude: f64,
    course: Option<String>,
    fix: i32,
    gps_fix_available: bool,
    hdop: f64,
    latitude: f64,
    longitude: f64,
    number_of_satellites: i32,
    speed_knots: f64,
    speed_mph: f64,
    time_st: String,
    rssi: i32,
    data_link_type: String,
    rfid: String,
    created_at: i64,
}

impl From<OutboxRow> for OutboxRecord {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: row.id,
            message: OutboundMessage {
                rfid: row.rfid,
                gps: LocationSample {
                    altitude: row.altitude,
                    course: row.course,
                    fix: row.fix,
                    gps_fix_available: row.gps_fix_available,
                    hdop: row.hdop,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    number_of_satellites: row.number_of_satellites,
                    speed_knots: row.speed_knots,
                    speed_mph: row.speed_mph,
                    time: row.time_st,
                },
                modem_data: ModemSnapshot {
                    rssi: row.rssi,
                    data_link_type: row.data_link_type,
                },
            },
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
        }
    }
}

pub struct SqliteOutbox {
    pool: SqlitePool,
}

impl SqliteOutbox {
    /// Open (creating if needed) and migrate the database at `database_url`. `sqlite::memory:`
    /// gives a private in-memory database that lives as long as this outbox.
    pub async fn connect(database_url: &str) -> Result<Self, OutboxError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|error| OutboxError::InvalidUrl {
                url: database_url.to_string(),
                error,
            })?
            .create_if_missing(true);

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            // Every connection to an in-memory database is a separate database, so keep exactly
            // one around forever.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            create_parent_dir(options.get_filename()).await?;
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(OutboxError::Connect)?;
        migrate(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn create_parent_dir(filename: &Path) -> Result<(), OutboxError> {
    let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|error| OutboxError::CreateDir {
            path: parent.to_string_lossy().to_string(),
            error,
        })
}

#[async_trait::async_trait]
impl OutboxStore for SqliteOutbox {
    async fn insert(&self, message: &OutboundMessage) -> Result<i64, OutboxError> {
        let query = "INSERT INTO outbox (
                altitude, course, fix, gps_fix_available, hdop, latitude, longitude,
                number_of_satellites, speed_knots, speed_mph, time_st, rssi, data_link_type,
                rfid, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

        let gps = &message.gps;
        // An empty course is stored as NULL.
        let course = gps.course.as_deref().filter(|course| !course.is_empty());

        let result = sqlx::query(query)
            .bind(gps.altitude)
            .bind(course)
            .bind(gps.fix)
            .bind(gps.gps_fix_available)
            .bind(gps.hdop)
            .bind(gps.latitude)
            .bind(gps.longitude)
            .bind(gps.number_of_satellites)
            .bind(gps.speed_knots)
            .bind(gps.speed_mph)
            .bind(gps.time.as_str())
            .bind(message.modem_data.rssi)
            .bind(message.modem_data.data_link_type.as_str())
            .bind(message.rfid.as_str())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::query("insert", e))?;

        Ok(result.last_insert_rowid())
    }

    async fn pending(&self) -> Result<Vec<OutboxRecord>, OutboxError> {
        let query = "SELECT id, altitude, course, fix, gps_fix_available, hdop, latitude,
                longitude, number_of_satellites, speed_knots, speed_mph, time_st, rssi,
                data_link_type, rfid, created_at
            FROM outbox ORDER BY id";

        let rows: Vec<OutboxRow> = sqlx::query_as(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OutboxError::query("pending", e))?;

        Ok(rows.into_iter().map(OutboxRecord::from).collect())
    }

    async fn delete(&self, id: i64) -> Result<bool, OutboxError> {
        let result = sqlx::query("DELETE FROM outbox WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::query("delete", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Records found when the sweep started.
    pub pending: usize,
    /// Records the broker confirmed.
    pub delivered: usize,
    /// Confirmed records removed from the store.
    pub deleted: usize,
    /// Records left for the next sweep.
    pub failed: usize,
}

/// Retries stored messages. Sweeps never overlap, so a record is published at most once per sweep.
pub struct Sweeper {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<dyn BrokerPublisher>,
    cooldown: Arc<CooldownTimer>,
    in_progress: Mutex<()>,
}

impl Sweeper {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<dyn BrokerPublisher>,
        cooldown: Arc<CooldownTimer>,
    ) -> Self {
        Self {
            outbox,
            publisher,
            cooldown,
            in_progress: Mutex::new(()),
        }
    }

    /// Publish every stored record, deleting the ones the broker confirms. A confirmation also
    /// resets the delivery cooldown, so direct publishing resumes once the broker is back.
    pub async fn sweep(&self) -> SweepReport {
        let _in_progress = self.in_progress.lock().await;
        let mut report = SweepReport::default();

        let records = match self.outbox.pending().await {
            Ok(records) => records,
            Err(error) => {
                tracing::error!(%error, "could not read outbox, skipping sweep");
                return report;
            }
        };
        report.pending = records.len();

        for record in records {
            let payload = match record.message.to_payload() {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::error!(%error, id = record.id, "could not encode stored message");
                    report.failed += 1;
                    continue;
                }
            };

            match self.publisher.publish(payload).await {
                PublishOutcome::Confirmed => {
                    report.delivered += 1;
                    self.cooldown.reset();
                    match self.outbox.delete(record.id).await {
                        Ok(true) => report.deleted += 1,
                        Ok(false) => tracing::debug!(id = record.id, "record already removed"),
                        Err(error) => tracing::warn!(
                            %error,
                            id = record.id,
                            "record delivered but not removed, it will be sent again"
                        ),
                    }
                }
                PublishOutcome::Unconfirmed => {
                    tracing::debug!(id = record.id, "stored message still not confirmed");
                    report.failed += 1;
                }
            }
        }

        if report.pending > 0 {
            tracing::info!(
                pending = report.pending,
                delivered = report.delivered,
                deleted = report.deleted,
                failed = report.failed,
                "outbox sweep finished"
            );
        }
        report
    }
}

/// Sweep every `interval` until shutdown. The first sweep happens one interval after start, and
/// the timer is re-armed after every sweep whatever its outcome.
pub async fn run_sweep_loop(
    sweeper: Arc<Sweeper>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::info!(interval = %dt(interval), "outbox sweeper started");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(interval) => {}
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweeper.sweep() => {}
        }
    }
    tracing::debug!("outbox sweep loop stopped");
}
