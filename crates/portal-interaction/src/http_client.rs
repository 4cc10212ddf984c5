//! HttpPortalClient - REST client for the portal backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};

use portal_core::config::BackendSettings;
use portal_core::error::BackendError;
use portal_core::notification::{Notification, NotificationId, NotificationService};
use portal_core::session::{ProfileLookup, ProfileService, ProfileUpdate, SessionToken};

use crate::dto::{MarkReadRequest, NotificationDto, ProfileResponse};

/// Talks to the profile and notification endpoints with bearer auth.
#[derive(Clone)]
pub struct HttpPortalClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPortalClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!("[HttpPortalClient] Using backend {}", base_url);
        Self {
            client: Client::new(),
            base_url,
            timeout,
        }
    }

    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self::new(settings.base_url.clone(), settings.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds `{base}/{segments...}/`. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::transport(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                BackendError::transport(format!("Base URL '{}' cannot carry a path", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
            // The backend routes all end with a slash.
            path.push("");
        }
        Ok(url)
    }

    fn auth_request(&self, request: RequestBuilder, token: Option<&SessionToken>) -> RequestBuilder {
        let request = request.timeout(self.timeout);
        match token {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }

    async fn send(request: RequestBuilder, resource: &str) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;
        check_status(response, resource).await
    }
}

/// Maps non-success statuses onto [`BackendError`].
async fn check_status(response: Response, resource: &str) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(BackendError::not_found(resource)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized),
        _ => {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(BackendError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ProfileService for HttpPortalClient {
    async fn fetch_profile(
        &self,
        identifier: &str,
        token: Option<&SessionToken>,
    ) -> Result<ProfileLookup, BackendError> {
        let url = self.endpoint(&["profile-by-identifier", identifier])?;
        tracing::debug!("[HttpPortalClient] Fetching profile for {}", identifier);

        let response = Self::send(
            self.auth_request(self.client.get(url), token),
            &format!("profile '{}'", identifier),
        )
        .await?;

        let body: ProfileResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(body.into_lookup(identifier))
    }

    async fn update_profile(
        &self,
        token: &SessionToken,
        update: &ProfileUpdate,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&["profile"])?;
        tracing::debug!("[HttpPortalClient] Updating profile");

        Self::send(
            self.auth_request(self.client.patch(url).json(update), Some(token)),
            "profile",
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationService for HttpPortalClient {
    async fn list_notifications(
        &self,
        token: &SessionToken,
    ) -> Result<Vec<Notification>, BackendError> {
        let url = self.endpoint(&["notifications"])?;

        let response = Self::send(
            self.auth_request(self.client.get(url), Some(token)),
            "notifications",
        )
        .await?;

        let items: Vec<NotificationDto> = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        tracing::debug!("[HttpPortalClient] Retrieved {} notifications", items.len());
        Ok(items.into_iter().map(Notification::from).collect())
    }

    async fn mark_read(&self, token: &SessionToken, id: NotificationId) -> Result<(), BackendError> {
        let id_segment = id.to_string();
        let url = self.endpoint(&["notifications", &id_segment])?;

        Self::send(
            self.auth_request(
                self.client.patch(url).json(&MarkReadRequest { read: true }),
                Some(token),
            ),
            &format!("notification {}", id),
        )
        .await?;
        tracing::debug!("[HttpPortalClient] Notification {} marked read", id);
        Ok(())
    }
}
