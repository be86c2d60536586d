//! Authenticated REST client for the Google Cloud APIs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::LauncherError;
use crate::gcp::auth;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST client for the Cloud Monitoring, Cloud Logging and Cloud Run Admin
/// APIs.
///
/// Carries the access token minted at construction time; the token is never
/// refreshed in place. Callers obtain clients through [`GcpHandle`], which
/// rebuilds one after any failure.
pub struct GcpClient {
    client: reqwest::Client,
    token: String,
}

impl GcpClient {
    /// Mint an access token from application-default credentials and build
    /// the underlying HTTP client.
    pub async fn connect() -> Result<Self, LauncherError> {
        let token = auth::fetch_access_token().await?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, token })
    }

    /// Make a GET request against a fully-qualified API URL.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LauncherError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Make a POST request with a JSON body against a fully-qualified API URL.
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, LauncherError> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, LauncherError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GCP API call failed: {} - {}", status, body);
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
                || auth::is_credential_error(&body)
            {
                return Err(LauncherError::CredentialError(auth::describe_backend_error(
                    &body,
                )));
            }
            return Err(LauncherError::GcpError(format!("{}: {}", status, body)));
        }
        Ok(response.json().await?)
    }
}

/// Shared, resettable access to a [`GcpClient`].
///
/// The client is cached while healthy and must be discarded after any failed
/// call — a handle that just failed may hold an expired token. Metric
/// descriptor units are static metadata and so are kept across resets.
pub struct GcpHandle {
    client: RwLock<Option<Arc<GcpClient>>>,
    descriptor_units: RwLock<HashMap<String, String>>,
}

impl GcpHandle {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            descriptor_units: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached client, or connect a fresh one and cache it.
    pub async fn acquire(&self) -> Result<Arc<GcpClient>, LauncherError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut slot = self.client.write().await;
        // Another task may have connected while we waited for the lock.
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(GcpClient::connect().await?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached client so the next call connects from scratch.
    pub async fn invalidate(&self) {
        let mut slot = self.client.write().await;
        if slot.take().is_some() {
            debug!("Discarded cached GCP client after failure");
        }
    }

    /// Look up a previously resolved metric descriptor unit.
    pub async fn cached_unit(&self, metric_type: &str) -> Option<String> {
        self.descriptor_units.read().await.get(metric_type).cloned()
    }

    /// Record a metric descriptor unit for future calls.
    pub async fn remember_unit(&self, metric_type: &str, unit: &str) {
        self.descriptor_units
            .write()
            .await
            .insert(metric_type.to_string(), unit.to_string());
    }
}

impl Default for GcpHandle {
    fn default() -> Self {
        Self::new()
    }
}
