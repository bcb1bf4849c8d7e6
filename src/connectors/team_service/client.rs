use crate::connectors::config::TeamServiceConfig;
use crate::connectors::errors::ConnectorError;
use crate::models::{AgentProfile, Membership, Organization, Widget};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::TeamService;

/// HTTP-based Team Service client
pub struct TeamServiceClient {
    pub(crate) base_url: String,
    pub(crate) http_client: reqwest::Client,
    pub(crate) auth_token: Option<String>,
}

impl TeamServiceClient {
    pub fn new(config: TeamServiceConfig) -> Result<Self, ConnectorError> {
        let timeout = std::time::Duration::from_secs(config.timeout_secs);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client,
            auth_token: config.auth_token,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.as_ref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET returning `None` on 404.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        url: String,
        span: tracing::Span,
    ) -> Result<Option<T>, ConnectorError> {
        let resp = self
            .authorize(self.http_client.get(&url))
            .send()
            .instrument(span)
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let resp = resp.error_for_status().map_err(|e| {
            tracing::error!("team service GET {} failed: {:?}", url, e);
            ConnectorError::HttpError(e.to_string())
        })?;

        Self::decode(resp).await.map(Some)
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ConnectorError> {
        let text = resp
            .text()
            .await
            .map_err(|e| ConnectorError::HttpError(e.to_string()))?;
        serde_json::from_str::<T>(&text).map_err(|_| ConnectorError::InvalidResponse(text))
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        req: reqwest::RequestBuilder,
        body: &B,
        span: tracing::Span,
    ) -> Result<reqwest::Response, ConnectorError> {
        let resp = self.authorize(req).json(body).send().instrument(span).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound(resp.url().path().to_string()));
        }

        resp.error_for_status().map_err(|e| {
            tracing::error!("team service request failed: {:?}", e);
            ConnectorError::HttpError(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl TeamService for TeamServiceClient {
    async fn widget(&self, widget_id: &str) -> Result<Option<Widget>, ConnectorError> {
        let span = tracing::info_span!("team_service_get_widget", widget_id = %widget_id);
        let url = format!("{}/widgets/{}", self.base_url, widget_id);
        self.get_optional(url, span).await
    }

    async fn membership(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, ConnectorError> {
        let span = tracing::info_span!(
            "team_service_get_membership",
            organization_id = %organization_id,
            user_id = %user_id
        );
        let url = format!(
            "{}/organizations/{}/members/{}",
            self.base_url, organization_id, user_id
        );
        self.get_optional(url, span).await
    }

    async fn active_organizations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Organization>, ConnectorError> {
        let span = tracing::info_span!("team_service_list_organizations", user_id = %user_id);
        let url = format!("{}/users/{}/organizations?active=true", self.base_url, user_id);
        Ok(self.get_optional(url, span).await?.unwrap_or_default())
    }

    async fn widgets_for(
        &self,
        organization_ids: &[String],
    ) -> Result<Vec<Widget>, ConnectorError> {
        if organization_ids.is_empty() {
            return Ok(vec![]);
        }

        let span = tracing::info_span!(
            "team_service_list_widgets",
            organizations = organization_ids.len()
        );
        let url = format!("{}/widgets", self.base_url);
        let query: Vec<(&str, &str)> = organization_ids
            .iter()
            .map(|id| ("organizationId", id.as_str()))
            .collect();

        let resp = self
            .authorize(self.http_client.get(&url).query(&query))
            .send()
            .instrument(span)
            .await?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("list widgets error: {:?}", e);
                ConnectorError::HttpError(e.to_string())
            })?;

        Self::decode(resp).await
    }

    async fn agent_profile(&self, user_id: &str) -> Result<Option<AgentProfile>, ConnectorError> {
        let span = tracing::info_span!("team_service_get_agent", user_id = %user_id);
        let url = format!("{}/agents/{}", self.base_url, user_id);
        self.get_optional(url, span).await
    }

    async fn add_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError> {
        let span = tracing::info_span!(
            "team_service_add_active_chat",
            user_id = %user_id,
            conversation_id = %conversation_id
        );
        let url = format!("{}/agents/{}/active-chats", self.base_url, user_id);
        let body = serde_json::json!({ "conversationId": conversation_id });
        self.send_json(self.http_client.post(&url), &body, span)
            .await
            .map(|_| ())
    }

    async fn remove_active_chat(
        &self,
        user_id: &str,
        conversation_id: Uuid,
    ) -> Result<(), ConnectorError> {
        let span = tracing::info_span!(
            "team_service_remove_active_chat",
            user_id = %user_id,
            conversation_id = %conversation_id
        );
        let url = format!(
            "{}/agents/{}/active-chats/{}",
            self.base_url, user_id, conversation_id
        );
        let resp = self
            .authorize(self.http_client.delete(&url))
            .send()
            .instrument(span)
            .await?;

        // already gone is fine
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        resp.error_for_status().map(|_| ()).map_err(|e| {
            tracing::error!("remove active chat error: {:?}", e);
            ConnectorError::HttpError(e.to_string())
        })
    }

    async fn set_availability(
        &self,
        user_id: &str,
        is_available: bool,
    ) -> Result<AgentProfile, ConnectorError> {
        let span = tracing::info_span!(
            "team_service_set_availability",
            user_id = %user_id,
            is_available = is_available
        );
        let url = format!("{}/agents/{}", self.base_url, user_id);
        let body = serde_json::json!({ "isAvailable": is_available });
        let resp = self
            .send_json(self.http_client.patch(&url), &body, span)
            .await?;

        Self::decode(resp).await
    }
}
