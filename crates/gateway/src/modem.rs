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

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::ModemConfig;
use crate::credentials::CredentialStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Link quality as included in outbound messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemSnapshot {
    #[serde(rename = "Rssi")]
    pub rssi: i32,
    #[serde(rename = "dataLinkType")]
    pub data_link_type: String,
}

/// The device manager's modem details document. Only `rssi` and `dataLinkType` are required.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModemDetails {
    pub rssi: i32,
    pub data_link_type: String,
    pub gsm_registration_status: Option<String>,
    pub utran_registration_status: Option<String>,
    pub access_technology: Option<String>,
    pub operator_name: Option<String>,
    pub sim_status: Option<String>,
    pub latest_error: Option<String>,
    pub imei: Option<String>,
    pub ccid: Option<String>,
    pub imsi: Option<String>,
    pub ip: Option<String>,
    pub gateway: Option<String>,
    pub dns1: Option<String>,
    pub dns2: Option<String>,
    pub local_ip: Option<String>,
    pub remote_ip: Option<String>,
    pub segment: Option<String>,
    pub segment_type: Option<String>,
    pub persist: Option<bool>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub enabled: Option<bool>,
    pub state: Option<String>,
}

impl ModemDetails {
    pub fn snapshot(&self) -> ModemSnapshot {
        ModemSnapshot {
            rssi: self.rssi,
            data_link_type: self.data_link_type.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ModemError {
    #[error("no bearer token available, skipping modem status request")]
    Unauthenticated,
    #[error("modem status request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("modem status endpoint returned {0}")]
    Status(reqwest::StatusCode),
}

/// Last known modem link status, refreshed on demand from the device manager.
pub struct ModemCache {
    http_client: reqwest::Client,
    status_url: String,
    credentials: CredentialStore,
    snapshot: ArcSwap<ModemSnapshot>,
}

impl ModemCache {
    pub fn new(config: &ModemConfig, credentials: CredentialStore) -> Result<Self, ModemError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            status_url: config.status_url.clone(),
            credentials,
            snapshot: ArcSwap::from_pointee(ModemSnapshot::default()),
        })
    }

    pub async fn fetch_details(&self) -> Result<ModemDetails, ModemError> {
        let token = self
            .credentials
            .bearer()
            .ok_or(ModemError::Unauthenticated)?;

        let response = self
            .http_client
            .get(&self.status_url)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModemError::Status(status));
        }

        Ok(response.json::<ModemDetails>().await?)
    }

    /// Fetch the current link status and store it. On any failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<ModemSnapshot, ModemError> {
        match self.fetch_details().await {
            Ok(details) => {
                let snapshot = details.snapshot();
                tracing::debug!(
                    rssi = snapshot.rssi,
                    data_link_type = %snapshot.data_link_type,
                    "modem status refreshed"
                );
                self.snapshot.store(Arc::new(snapshot.clone()));
                Ok(snapshot)
            }
            Err(ModemError::Unauthenticated) => {
                tracing::warn!("no bearer token, modem status not refreshed, keeping previous");
                Err(ModemError::Unauthenticated)
            }
            Err(error) => {
                tracing::warn!(%error, "could not refresh modem status, keeping previous");
                Err(error)
            }
        }
    }

    pub fn snapshot(&self) -> ModemSnapshot {
        ModemSnapshot::clone(&self.snapshot.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;

    const DETAILS: &str = r#"{
        "gsmRegistrationStatus": "registered",
        "utranRegistrationStatus": "registered",
        "accessTechnology": "LTE",
        "dataLinkType": "lte",
        "operatorName": "HT",
        "simStatus": "ready",
        "latestError": null,
        "imei": "356938035643809",
        "rssi": -67,
        "ip": "10.1.2.3",
        "persist": true,
        "name": "ppp0",
        "type": "modem",
        "enabled": true,
        "state": "up"
    }"#;

    fn cache_for(server: &mockito::Server, credentials: CredentialStore) -> ModemCache {
        let config = ModemConfig {
            status_url: format!("{}/modem/ppp0/details", server.url()),
            ..Default::default()
        };
        ModemCache::new(&config, credentials).unwrap()
    }

    fn authenticated() -> CredentialStore {
        let credentials = CredentialStore::new();
        credentials.set(Credential::new("tok"));
        credentials
    }

    #[tokio::test]
    async fn test_refresh_projects_details() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/modem/ppp0/details")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DETAILS)
            .create_async()
            .await;

        let cache = cache_for(&server, authenticated());
        let snapshot = cache.refresh().await.unwrap();

        assert_eq!(
            snapshot,
            ModemSnapshot {
                rssi: -67,
                data_link_type: "lte".to_string()
            }
        );
        assert_eq!(cache.snapshot(), snapshot);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/modem/ppp0/details")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DETAILS)
            .expect(1)
            .create_async()
            .await;

        let cache = cache_for(&server, authenticated());
        cache.refresh().await.unwrap();
        ok.remove_async().await;

        let _error = server
            .mock("GET", "/modem/ppp0/details")
            .with_status(500)
            .create_async()
            .await;
        assert!(matches!(
            cache.refresh().await,
            Err(ModemError::Status(status)) if status.as_u16() == 500
        ));
        assert_eq!(cache.snapshot().rssi, -67);
    }

    #[tokio::test]
    async fn test_undecodable_response_keeps_previous_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/modem/ppp0/details")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"state":"up"}"#)
            .create_async()
            .await;

        let cache = cache_for(&server, authenticated());
        assert!(matches!(
            cache.refresh().await,
            Err(ModemError::Request(_))
        ));
        assert_eq!(cache.snapshot(), ModemSnapshot::default());
    }

    #[tokio::test]
    async fn test_no_token_skips_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/modem/ppp0/details")
            .expect(0)
            .create_async()
            .await;

        let cache = cache_for(&server, CredentialStore::new());
        assert!(matches!(
            cache.refresh().await,
            Err(ModemError::Unauthenticated)
        ));
        mock.assert_async().await;
    }

    #[test]
    fn test_snapshot_wire_names() {
        let snapshot = ModemSnapshot {
            rssi: -70,
            data_link_type: "umts".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"Rssi":-70,"dataLinkType":"umts"}"#
        );
    }
}
