//! reqwest-backed sync transport.

use crate::{SyncTransport, TransportError, TransportResult};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use sync_protocol_types::{
    PullRequest, PullResult, PushRequest, PushResult, TenantId, PULL_PATH, PUSH_PATH,
    TENANT_ID_HEADER,
};
use tracing::debug;
use url::Url;

/// Talks to the sync API over HTTP.
///
/// No retries; each call runs once, bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    client: Client,
    pull_url: Url,
    push_url: Url,
    auth_token: Option<String>,
}

impl HttpSyncClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration, auth_token: Option<String>) -> TransportResult<Self> {
        if timeout.is_zero() {
            return Err(TransportError::Config("request timeout must be positive".into()));
        }

        let base = base_url.trim_end_matches('/');
        let pull_url = Url::parse(&format!("{base}{PULL_PATH}"))?;
        let push_url = Url::parse(&format!("{base}{PUSH_PATH}"))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self {
            client,
            pull_url,
            push_url,
            auth_token,
        })
    }

    pub fn pull_url(&self) -> &Url {
        &self.pull_url
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }

    fn post(&self, url: &Url, tenant_id: &TenantId) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url.clone())
            .header(TENANT_ID_HEADER, tenant_id.as_str());

        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turn a non-success response into a status error.
async fn check_status(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SyncTransport for HttpSyncClient {
    async fn pull(&self, tenant_id: &TenantId, request: PullRequest) -> TransportResult<PullResult> {
        let params = request.query_params()?;

        debug!(
            tenant_id = %tenant_id,
            last_pulled_at = ?request.last_pulled_at,
            schema_version = request.schema_version,
            replacement = request.replacement,
            "Pulling changes"
        );

        let response = self
            .post(&self.pull_url, tenant_id)
            .query(&params)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        let result: PullResult = serde_json::from_slice(&body)?;

        debug!(
            tenant_id = %tenant_id,
            records = result.changes.record_count(),
            timestamp = result.timestamp,
            "Pull complete"
        );
        Ok(result)
    }

    async fn push(&self, tenant_id: &TenantId, request: PushRequest) -> TransportResult<PushResult> {
        debug!(
            tenant_id = %tenant_id,
            last_pulled_at = request.last_pulled_at,
            records = request.changes.record_count(),
            "Pushing changes"
        );

        let response = self
            .post(&self.push_url, tenant_id)
            .query(&request.query_params())
            .json(&request.changes)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(PushResult::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }
}
