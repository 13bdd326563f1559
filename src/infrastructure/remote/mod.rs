//! Remote store client
//!
//! Stateless request/response operations mapping onto the wire protocol. No
//! caching logic lives here; every call is authenticated with the device
//! credential pair and bounded by a fixed deadline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use tracing::debug;
use uuid::Uuid;

use crate::device::Credentials;
use crate::domain::ViewMode;

pub mod types;

pub use types::{
    ConflictBody, DrawingPayload, FullSyncRequest, FullSyncResponse, NotePayload, SavedVersion,
    SyncChange, SyncConflict, SyncOperation,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote operation failures
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// No credentials, or the server rejected the pair
    #[error("device is not registered")]
    NotRegistered,

    /// Transport failure; retryable, dirty state is preserved
    #[error("network unavailable: {0}")]
    Network(String),

    /// Deadline elapsed; treated like any other network failure
    #[error("request timed out")]
    Timeout,

    /// Optimistic-concurrency clash, body carries the server's copy
    #[error("version conflict, server has v{server_version}")]
    VersionConflict {
        server_version: i64,
        server_payload: serde_json::Value,
    },

    /// The parent record does not exist server-side; never auto-healed
    #[error("record not found on server")]
    NotFound,

    /// Any other non-2xx; retryable
    #[error("server error, status {status}")]
    Server { status: u16 },

    #[error("malformed server response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// The seam between the engine and the wire. `RemoteClient` is the real
/// implementation; tests substitute their own.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Application-level reachability probe
    async fn health(&self, credentials: Option<&Credentials>) -> Result<(), RemoteError>;

    async fn fetch_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<NotePayload>, RemoteError>;

    async fn push_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        payload: &NotePayload,
    ) -> Result<SavedVersion, RemoteError>;

    async fn delete_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        event_id: Uuid,
    ) -> Result<(), RemoteError>;

    async fn fetch_drawing(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        date: NaiveDate,
        view_mode: ViewMode,
    ) -> Result<Option<DrawingPayload>, RemoteError>;

    async fn push_drawing(
        &self,
        credentials: &Credentials,
        payload: &DrawingPayload,
    ) -> Result<SavedVersion, RemoteError>;

    async fn full_sync(
        &self,
        credentials: &Credentials,
        request: &FullSyncRequest,
    ) -> Result<FullSyncResponse, RemoteError>;
}

trait WithCredentials {
    fn with_credentials(self, credentials: &Credentials) -> Self;
}

impl WithCredentials for reqwest::RequestBuilder {
    fn with_credentials(self, credentials: &Credentials) -> Self {
        self.header("x-device-id", credentials.device_id.to_string())
            .header("x-device-token", credentials.device_token.clone())
    }
}

/// HTTP implementation of [`RemoteApi`]
pub struct RemoteClient {
    client: reqwest::Client,
    api_url: String,
}

impl RemoteClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    fn note_url(&self, book_id: Uuid, event_id: Uuid) -> String {
        format!("{}/books/{}/events/{}/note", self.api_url, book_id, event_id)
    }

    fn drawing_url(&self, book_id: Uuid, date: NaiveDate, view_mode: ViewMode) -> String {
        format!(
            "{}/books/{}/drawings/{}/{}",
            self.api_url, book_id, date, view_mode
        )
    }

    /// Map a non-2xx response onto the error taxonomy
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::NotRegistered),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound),
            StatusCode::CONFLICT => {
                let body: ConflictBody = response
                    .json()
                    .await
                    .map_err(|e| RemoteError::Malformed(e.to_string()))?;
                Err(RemoteError::VersionConflict {
                    server_version: body.server_version,
                    server_payload: body.server_payload,
                })
            }
            other => Err(RemoteError::Server {
                status: other.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl RemoteApi for RemoteClient {
    async fn health(&self, credentials: Option<&Credentials>) -> Result<(), RemoteError> {
        let mut request = self
            .client
            .get(format!("{}/health", self.api_url))
            .timeout(HEALTH_TIMEOUT);
        if let Some(credentials) = credentials {
            request = request.with_credentials(credentials);
        }
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn fetch_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        event_id: Uuid,
    ) -> Result<Option<NotePayload>, RemoteError> {
        debug!(%event_id, "fetching note");
        let response = self
            .client
            .get(self.note_url(book_id, event_id))
            .with_credentials(credentials)
            .send()
            .await?;
        match Self::check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(RemoteError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn push_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        payload: &NotePayload,
    ) -> Result<SavedVersion, RemoteError> {
        debug!(event_id = %payload.event_id, version = payload.version, "pushing note");
        let response = self
            .client
            .post(self.note_url(book_id, payload.event_id))
            .with_credentials(credentials)
            .json(payload)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_note(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        event_id: Uuid,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.note_url(book_id, event_id))
            .with_credentials(credentials)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_drawing(
        &self,
        credentials: &Credentials,
        book_id: Uuid,
        date: NaiveDate,
        view_mode: ViewMode,
    ) -> Result<Option<DrawingPayload>, RemoteError> {
        let response = self
            .client
            .get(self.drawing_url(book_id, date, view_mode))
            .with_credentials(credentials)
            .send()
            .await?;
        match Self::check(response).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(RemoteError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn push_drawing(
        &self,
        credentials: &Credentials,
        payload: &DrawingPayload,
    ) -> Result<SavedVersion, RemoteError> {
        debug!(
            book_id = %payload.book_id,
            date = %payload.effective_date,
            view_mode = %payload.view_mode,
            version = payload.version,
            "pushing drawing"
        );
        let response = self
            .client
            .post(self.drawing_url(payload.book_id, payload.effective_date, payload.view_mode))
            .with_credentials(credentials)
            .json(payload)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn full_sync(
        &self,
        credentials: &Credentials,
        request: &FullSyncRequest,
    ) -> Result<FullSyncResponse, RemoteError> {
        debug!(changes = request.changes.len(), "full sync");
        let response = self
            .client
            .post(format!("{}/sync/full", self.api_url))
            .with_credentials(credentials)
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
