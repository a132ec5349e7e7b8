//! REST adapter for [`WorkshopApi`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use workshop_sync_core::api::{ApiError, WorkshopApi};
use workshop_sync_core::model::{Attendee, AttendeeId, Workshop, WorkshopId};

/// Error body of the workshop server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// The server's `detail`, the raw body, or the status reason
fn error_detail(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    }
}

/// Workshop server client over HTTP
#[derive(Clone, Debug)]
pub struct HttpWorkshopApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpWorkshopApi {
    /// Create a client for the API rooted at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{path}", self.base_url));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(status, &body);
        tracing::debug!(status = status.as_u16(), %detail, "Request rejected");
        Err(ApiError::new(status.as_u16(), detail))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        Self::execute(self.request(Method::GET, path))
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport(format!("invalid response body: {e}")))
    }

    async fn command(&self, method: Method, path: &str) -> Result<(), ApiError> {
        Self::execute(self.request(method, path)).await.map(|_| ())
    }
}

#[async_trait]
impl WorkshopApi for HttpWorkshopApi {
    async fn list_workshops(&self) -> Result<Vec<Workshop>, ApiError> {
        self.get("workshops").await
    }

    async fn get_workshop(&self, id: &WorkshopId) -> Result<Workshop, ApiError> {
        self.get(&format!("workshops/{id}")).await
    }

    async fn get_workshop_attendees(&self, id: &WorkshopId) -> Result<Vec<Attendee>, ApiError> {
        self.get(&format!("workshops/{id}/attendees")).await
    }

    async fn get_attendee(&self, id: &AttendeeId) -> Result<Attendee, ApiError> {
        self.get(&format!("attendees/{id}")).await
    }

    async fn deploy_workshop(&self, id: &WorkshopId) -> Result<(), ApiError> {
        self.command(Method::POST, &format!("workshops/{id}/deploy"))
            .await
    }

    async fn cleanup_workshop(&self, id: &WorkshopId) -> Result<(), ApiError> {
        self.command(Method::POST, &format!("workshops/{id}/cleanup"))
            .await
    }

    async fn deploy_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        self.command(Method::POST, &format!("attendees/{id}/deploy"))
            .await
    }

    async fn cleanup_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        self.command(Method::POST, &format!("attendees/{id}/cleanup"))
            .await
    }

    async fn delete_attendee(&self, id: &AttendeeId) -> Result<(), ApiError> {
        self.command(Method::DELETE, &format!("attendees/{id}"))
            .await
    }
}
