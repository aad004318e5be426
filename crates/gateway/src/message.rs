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

use serde::{Deserialize, Serialize};

use crate::location::LocationSample;
use crate::modem::ModemSnapshot;

/// The message published for every tag read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "Rfid")]
    pub rfid: String,
    #[serde(rename = "Gps")]
    pub gps: LocationSample,
    #[serde(rename = "ModemData")]
    pub modem_data: ModemSnapshot,
}

impl OutboundMessage {
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Build the message for `tag`. Before the first fix the location is an all-zero sample, which
/// consumers read as "no fix".
pub fn compose(
    tag: &str,
    best_fix: Option<LocationSample>,
    modem: ModemSnapshot,
) -> OutboundMessage {
    OutboundMessage {
        rfid: tag.to_string(),
        gps: best_fix.unwrap_or_default(),
        modem_data: modem,
    }
}
