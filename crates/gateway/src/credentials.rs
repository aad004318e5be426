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

//! Bearer token acquisition for the device manager REST API.
//!
//! A [`TokenSource`] performs the OAuth2 exchange, [`run_refresh_loop`] calls it periodically and
//! publishes the result into a [`CredentialStore`] that any number of readers can consult.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use humantime::format_duration as dt;
use oauth2::basic::{
    BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenResponse,
};
use oauth2::{
    Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpRequest, HttpResponse,
    RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, StandardRevocableToken,
    TokenResponse, TokenUrl,
};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::CredentialsConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A bearer token and, when the issuer told us, the moment it stops being valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Option<Instant>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() && self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Shared cell holding the current credential. Cloning gives another handle to the same cell.
#[derive(Clone, Default)]
pub struct CredentialStore {
    current: Arc<ArcSwapOption<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: Credential) {
        self.current.store(Some(Arc::new(credential)));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    /// The token to send as `Authorization: Bearer <token>`, or `None` if there is no usable
    /// token and the call should be skipped.
    pub fn bearer(&self) -> Option<String> {
        self.current
            .load_full()
            .filter(|credential| credential.is_usable())
            .map(|credential| credential.access_token.clone())
    }
}

#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<Credential, CredentialError>;
}

// The oauth2 typestate for a client that only knows its token endpoint.
type TokenClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// OAuth2 resource owner password grant. The client id and secret go in a basic auth header, the
/// device manager username and password in the form body.
pub struct PasswordGrant {
    client: TokenClient,
    http_client: reqwest::Client,
    username: ResourceOwnerUsername,
    password: ResourceOwnerPassword,
}

impl PasswordGrant {
    pub fn new(config: &CredentialsConfig, token_url: &str) -> Result<Self, CredentialError> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_token_uri(TokenUrl::new(token_url.to_string())?);
        if let Some(client_secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(client_secret.clone()));
        }

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout)
            .build()
            .map_err(CredentialError::HttpClient)?;

        Ok(Self {
            client,
            http_client,
            username: ResourceOwnerUsername::new(config.username.clone()),
            password: ResourceOwnerPassword::new(config.password.clone().unwrap_or_default()),
        })
    }
}

#[async_trait::async_trait]
impl TokenSource for PasswordGrant {
    async fn fetch_token(&self) -> Result<Credential, CredentialError> {
        let response = self
            .client
            .exchange_password(&self.username, &self.password)
            .request_async(&TimeoutHttpClient::new(&self.http_client))
            .await?;

        let access_token = response.access_token().secret().clone();
        if access_token.is_empty() {
            return Err(CredentialError::EmptyToken);
        }

        Ok(Credential {
            access_token,
            expires_at: response.expires_in().map(|lifetime| Instant::now() + lifetime),
        })
    }
}

/// Adapter so oauth2 sends its requests through our reqwest client, which carries timeouts.
struct TimeoutHttpClient<'a> {
    client: &'a reqwest::Client,
}

impl<'a> TimeoutHttpClient<'a> {
    fn new(client: &'a reqwest::Client) -> Self {
        Self { client }
    }
}

impl<'c> oauth2::AsyncHttpClient<'c> for TimeoutHttpClient<'_> {
    type Error = TokenHttpError;
    type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + Send + 'c>>;

    fn call(&'c self, request: HttpRequest) -> Self::Future {
        Box::pin(async move {
            let response = self.client.execute(request.try_into()?).await?;
            let status = response.status();
            let mut result = http::Response::builder().status(status);
            for (header_name, header_value) in response.headers() {
                result = result.header(header_name, header_value);
            }
            let body = response.bytes().await?.to_vec();

            if !status.is_success() {
                tracing::warn!(%status, "token endpoint returned an error response");
            }

            Ok(result.body(body)?)
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TokenHttpError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid token response: {0}")]
    Response(#[from] http::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("invalid token endpoint URL: {0}")]
    InvalidTokenUrl(#[from] oauth2::url::ParseError),
    #[error("could not build HTTP client: {0}")]
    HttpClient(reqwest::Error),
    #[error("token exchange failed: {0}")]
    Exchange(#[from] RequestTokenError<TokenHttpError, BasicErrorResponse>),
    #[error("token endpoint returned an empty access token")]
    EmptyToken,
}

/// Keep `store` filled with a fresh token until shutdown. After a successful fetch the loop waits
/// `refresh_interval`; after a failure it waits `retry_interval`, which may be zero. A failed
/// refresh leaves the previous credential in place, readers stop using it once it expires.
pub async fn run_refresh_loop(
    source: Arc<dyn TokenSource>,
    store: CredentialStore,
    refresh_interval: Duration,
    retry_interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let fetched = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = source.fetch_token() => result,
        };

        let wait = match fetched {
            Ok(credential) if credential.access_token.is_empty() => {
                tracing::warn!(retry_in = %dt(retry_interval), "token refresh returned an empty token");
                retry_interval
            }
            Ok(credential) => {
                store.set(credential);
                tracing::info!(next_refresh = %dt(refresh_interval), "bearer token refreshed");
                refresh_interval
            }
            Err(error) => {
                tracing::warn!(%error, retry_in = %dt(retry_interval), "could not refresh bearer token");
                retry_interval
            }
        };

        if wait.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("token refresh loop stopped");
}
