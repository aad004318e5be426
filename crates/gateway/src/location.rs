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

//! GPS samples from the location feed and the best fix seen so far.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::{Stream, StreamExt};
use humantime::format_duration as dt;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{self, Message};

/// Fix quality reported when the receiver has no fix.
pub const NO_FIX: i32 = 0;

/// One sample from the location feed, using the feed's field names. Lower non-zero `fix` values
/// are better fixes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LocationSample {
    pub altitude: f64,
    pub course: Option<String>,
    pub fix: i32,
    pub gps_fix_available: bool,
    pub hdop: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub number_of_satellites: i32,
    pub speed_knots: f64,
    pub speed_mph: f64,
    pub time: String,
}

impl LocationSample {
    pub fn has_fix(&self) -> bool {
        self.fix != NO_FIX
    }
}

/// Holds the best fix observed so far. Written by the feed loop, read by message composition.
#[derive(Default)]
pub struct FixTracker {
    best: ArcSwapOption<LocationSample>,
}

impl FixTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new sample. It replaces the held fix if it has a fix at all and its quality is at
    /// least as good as the held one; returns whether it did.
    pub fn ingest(&self, sample: LocationSample) -> bool {
        if !sample.has_fix() {
            return false;
        }

        let sample = Arc::new(sample);
        let mut accepted = false;
        self.best.rcu(|held| match held {
            Some(held) if sample.fix > held.fix => {
                accepted = false;
                Some(held.clone())
            }
            _ => {
                accepted = true;
                Some(sample.clone())
            }
        });
        accepted
    }

    /// The held fix, or `None` before the first usable sample. Never waits for the feed.
    pub fn read_best(&self) -> Option<LocationSample> {
        self.best
            .load_full()
            .map(|sample| LocationSample::clone(&sample))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("could not connect to location feed: {0}")]
    Connect(#[from] tungstenite::Error),
    #[error("undecodable location sample: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn decode_sample(frame: &[u8]) -> Result<LocationSample, FeedError> {
    Ok(serde_json::from_slice(frame)?)
}

enum StreamEnd {
    Closed,
    Shutdown,
}

/// Follow the websocket feed at `url`, feeding every sample to `tracker`. Reconnects after
/// `reconnect_interval` whenever the connection fails or drops. The held fix survives reconnects.
pub async fn run_feed_loop(
    url: String,
    tracker: Arc<FixTracker>,
    reconnect_interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let connected = tokio::select! {
            _ = &mut shutdown => break,
            result = tokio_tungstenite::connect_async(url.as_str()) => result.map_err(FeedError::from),
        };

        match connected {
            Ok((stream, _response)) => {
                tracing::info!(url, "connected to location feed");
                if let StreamEnd::Shutdown = read_samples(stream, &tracker, &mut shutdown).await {
                    break;
                }
            }
            Err(error) => {
                tracing::warn!(%error, url, "location feed unavailable");
            }
        }

        tracing::info!(retry_in = %dt(reconnect_interval), "reconnecting to location feed");
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(reconnect_interval) => {}
        }
    }
    tracing::debug!("location feed loop stopped");
}

async fn read_samples<S>(
    mut stream: S,
    tracker: &FixTracker,
    shutdown: &mut oneshot::Receiver<()>,
) -> StreamEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = &mut *shutdown => return StreamEnd::Shutdown,
            message = stream.next() => message,
        };

        let frame = match message {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "location feed closed by server");
                return StreamEnd::Closed;
            }
            Some(Ok(_)) => continue,
            Some(Err(error)) => {
                tracing::warn!(%error, "location feed connection lost");
                return StreamEnd::Closed;
            }
            None => return StreamEnd::Closed,
        };

        match decode_sample(&frame) {
            Ok(sample) => {
                let fix = sample.fix;
                if tracker.ingest(sample) {
                    tracing::debug!(fix, "best fix updated");
                }
            }
            Err(error) => tracing::warn!(%error, "skipping location sample"),
        }
    }
}
