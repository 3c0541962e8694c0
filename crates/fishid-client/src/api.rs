//! HTTP client for the identification API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use fishid_models::{IdentificationPayload, ResultStatus, UploadGrant, WorkItemId};

use crate::error::{ClientError, ClientResult};
use crate::poll::StatusSource;
use crate::session::Session;

/// Result as reported by `GET /api/results/:work_item_id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusSnapshot {
    pub work_item_id: WorkItemId,
    pub status: ResultStatus,
    #[serde(default)]
    pub payload: Option<IdentificationPayload>,
    #[serde(default)]
    pub error_detail: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// API client bound to one [`Session`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    session: Session,
}

impl ApiClient {
    pub fn new(session: Session) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("fishid-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Network)?;
        Ok(Self { http, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Ask for a presigned write for a new work item.
    pub async fn request_upload_grant(&self, filename: &str) -> ClientResult<UploadGrant> {
        let mut url = self.session.endpoint("/api/upload-url")?;
        url.query_pairs_mut().append_pair("filename", filename);

        let token = self.session.bearer_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let grant: UploadGrant = Self::json_or_error(response).await?;

        debug!(work_item_id = %grant.work_item_id, "Received upload grant");
        Ok(grant)
    }

    /// Write the photo to the grant's endpoint.
    ///
    /// Goes straight to storage; the grant's fields are the only credentials.
    pub async fn upload(&self, grant: &UploadGrant, bytes: Vec<u8>) -> ClientResult<()> {
        if grant.is_expired() {
            return Err(ClientError::UploadRejected(format!(
                "grant for {} has expired",
                grant.work_item_id
            )));
        }

        let method = Method::from_bytes(grant.method.as_bytes())
            .map_err(|_| ClientError::InvalidResponse(format!("bad method '{}'", grant.method)))?;

        let mut request = self.http.request(method, &grant.write_endpoint);
        for (name, value) in &grant.credential_fields {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(bytes).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UploadRejected(format!("{}: {}", status, body)));
        }

        debug!(work_item_id = %grant.work_item_id, "Photo uploaded");
        Ok(())
    }

    /// Current result, or `None` when the API has no record of the item.
    pub async fn get_status(&self, work_item_id: &WorkItemId) -> ClientResult<Option<StatusSnapshot>> {
        let url = self
            .session
            .endpoint(&format!("/api/results/{}", work_item_id))?;

        let token = self.session.bearer_token().await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::json_or_error(response).await.map(Some)
    }

    async fn json_or_error<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::auth(format!("API returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, work_item_id: &WorkItemId) -> ClientResult<Option<StatusSnapshot>> {
        self.get_status(work_item_id).await
    }
}
