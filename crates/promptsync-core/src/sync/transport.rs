//! `HttpTransport` — the production `SyncTransport`, speaking the wire
//! protocol over `reqwest`. Kept as a thin trait implementation with no
//! retry logic of its own; retry/backoff lives in `SyncEngine`.

use async_trait::async_trait;

use crate::error::{SyncErrorKind, SyncTransportError};

use super::types::{MutationsRequest, MutationsResponse, SyncRequest, SyncResponse, SyncTransport};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

fn classify_status(status: reqwest::StatusCode) -> SyncErrorKind {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        SyncErrorKind::Auth
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        SyncErrorKind::Capacity
    } else if status.is_client_error() {
        SyncErrorKind::Permanent
    } else {
        SyncErrorKind::Transient
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn pull(&self, req: SyncRequest) -> Result<SyncResponse, SyncTransportError> {
        let url = format!("{}/sync", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| SyncTransportError::new(format!("pull request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncTransportError::with_kind(
                format!("pull returned status {status}"),
                classify_status(status),
            ));
        }

        resp.json::<SyncResponse>()
            .await
            .map_err(|e| SyncTransportError::new(format!("pull response not parseable: {e}")))
    }

    async fn push(&self, req: MutationsRequest) -> Result<MutationsResponse, SyncTransportError> {
        let url = format!("{}/mutations", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| SyncTransportError::new(format!("push request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SyncTransportError::with_kind(
                format!("push returned status {status}"),
                classify_status(status),
            ));
        }

        resp.json::<MutationsResponse>()
            .await
            .map_err(|e| SyncTransportError::new(format!("push response not parseable: {e}")))
    }
}
