//! Request Gateway
//!
//! Typed boundary over the introductions HTTP API. Every operation either
//! returns its parsed payload or fails with a [`GatewayError`]; nothing here
//! retries, retry policy belongs to the caller.

use crate::{
    draft::{NewTeam, photo_field},
    models::{
        Avatar, AvatarList, CreateTeamResponse, ErrorBody, GenerateIntroPayload, IntroResponse,
        StreamingTokenResponse, Team, TeamEnvelope, TeamList, TeamSummary, VideoStatusResponse,
    },
};
use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::{fmt, time::Duration};
use tracing::{debug, instrument, warn};

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Detail the backend framework sends for a route it does not have.
const UNKNOWN_ROUTE_DETAIL: &str = "Not Found";

/// The single error shape produced by the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The service could not be reached at all.
    #[error("Network error: {0}")]
    Transport(String),
    /// The service answered with a non-2xx status.
    #[error("{}", http_message(.status, .detail))]
    Http { status: u16, detail: Option<String> },
    /// A 2xx response whose body was not the expected JSON.
    #[error("Unexpected response from the service: {0}")]
    Decode(String),
    #[error("Failed to encode request: {0}")]
    Encode(String),
    #[error("Invalid API base URL '{0}'")]
    InvalidUrl(String),
}

fn http_message(status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("Request failed with status {}", status),
    }
}

impl GatewayError {
    /// Builds an `Http` error from a rejected response, reading `{detail}` when
    /// the body is JSON and carries a string detail.
    pub fn from_error_body(status: u16, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.detail)
            .filter(|detail| !detail.is_empty());
        GatewayError::Http { status, detail }
    }

    /// The server-supplied detail, when there was one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::Http { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// True when the service does not offer the requested endpoint.
    ///
    /// A 404 only counts when it is the framework's unknown-route answer; a 404
    /// naming a missing resource (e.g. "Team not found") is a real failure.
    pub fn is_missing_endpoint(&self) -> bool {
        match self {
            GatewayError::Http {
                status: 405 | 501, ..
            } => true,
            GatewayError::Http {
                status: 404,
                detail,
            } => detail
                .as_deref()
                .is_none_or(|detail| detail == UNKNOWN_ROUTE_DETAIL),
            _ => false,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// A single-use credential for opening one live avatar session.
#[derive(Clone)]
pub struct SessionCredential(SecretString);

impl SessionCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionCredential(***)")
    }
}

/// Operations offered by the introductions API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestGateway: Send + Sync {
    /// `GET /avatars`
    async fn list_avatars(&self) -> Result<Vec<Avatar>, GatewayError>;

    /// `POST /team`, as JSON or multipart depending on whether photos are attached.
    async fn create_team(&self, team: &NewTeam) -> Result<Team, GatewayError>;

    /// `GET /team/{id}`
    async fn get_team(&self, team_id: &str) -> Result<Team, GatewayError>;

    /// `GET /teams`
    async fn list_teams(&self) -> Result<Vec<TeamSummary>, GatewayError>;

    /// `POST /generate-intro`
    async fn request_intro(
        &self,
        team_id: &str,
        member_index: usize,
    ) -> Result<IntroResponse, GatewayError>;

    /// `GET /video-status/{video_id}`
    async fn video_status(&self, video_id: &str) -> Result<VideoStatusResponse, GatewayError>;

    /// `POST /streaming-token`
    async fn request_stream_token(&self) -> Result<SessionCredential, GatewayError>;
}

/// `RequestGateway` over HTTP using `reqwest`.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    /// Creates a gateway rooted at `base_url` (e.g. `http://localhost:8000/api`).
    ///
    /// No request timeout is applied unless one is given.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(GatewayError::transport)?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, GatewayError> {
        reqwest::Url::parse(base_url).map_err(|_| GatewayError::InvalidUrl(base_url.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request.send().await.map_err(GatewayError::transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(GatewayError::transport)?;

        if !status.is_success() {
            let err = GatewayError::from_error_body(status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err, "Request rejected");
            return Err(err);
        }

        serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn multipart_form(team: &NewTeam) -> Result<Form, GatewayError> {
        let team_data = serde_json::to_string(&team.payload())
            .map_err(|e| GatewayError::Encode(e.to_string()))?;
        let mut form = Form::new().text("team_data", team_data);
        for (index, photo) in &team.photos {
            let part = Part::bytes(photo.bytes.clone())
                .file_name(photo.file_name.clone())
                .mime_str(&photo.content_type)
                .map_err(|e| GatewayError::Encode(e.to_string()))?;
            form = form.part(photo_field(*index), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl RequestGateway for HttpGateway {
    #[instrument(skip_all)]
    async fn list_avatars(&self) -> Result<Vec<Avatar>, GatewayError> {
        let list: AvatarList = self.send(self.client.get(self.endpoint("avatars"))).await?;
        debug!(count = list.count, "Fetched avatars");
        Ok(list.avatars)
    }

    #[instrument(skip_all, fields(team_name = %team.team_name, members = team.members.len()))]
    async fn create_team(&self, team: &NewTeam) -> Result<Team, GatewayError> {
        let request = self.client.post(self.endpoint("team"));
        let request = if team.has_photos() {
            debug!(photos = team.photos.len(), "Submitting team as multipart");
            request.multipart(Self::multipart_form(team)?)
        } else {
            request.json(&team.payload())
        };
        let created: CreateTeamResponse = self.send(request).await?;
        debug!(team_id = ?created.team_id, "Team created");
        Ok(created.team)
    }

    #[instrument(skip(self))]
    async fn get_team(&self, team_id: &str) -> Result<Team, GatewayError> {
        let envelope: TeamEnvelope = self
            .send(self.client.get(self.endpoint(&format!("team/{}", team_id))))
            .await?;
        Ok(envelope.team)
    }

    #[instrument(skip_all)]
    async fn list_teams(&self) -> Result<Vec<TeamSummary>, GatewayError> {
        let list: TeamList = self.send(self.client.get(self.endpoint("teams"))).await?;
        Ok(list.teams)
    }

    #[instrument(skip(self))]
    async fn request_intro(
        &self,
        team_id: &str,
        member_index: usize,
    ) -> Result<IntroResponse, GatewayError> {
        let payload = GenerateIntroPayload {
            team_id: team_id.to_string(),
            member_index,
        };
        self.send(self.client.post(self.endpoint("generate-intro")).json(&payload))
            .await
    }

    #[instrument(skip(self))]
    async fn video_status(&self, video_id: &str) -> Result<VideoStatusResponse, GatewayError> {
        self.send(
            self.client
                .get(self.endpoint(&format!("video-status/{}", video_id))),
        )
        .await
    }

    #[instrument(skip_all)]
    async fn request_stream_token(&self) -> Result<SessionCredential, GatewayError> {
        let response: StreamingTokenResponse = self
            .send(self.client.post(self.endpoint("streaming-token")))
            .await?;
        if response.token.is_empty() {
            return Err(GatewayError::Decode("empty streaming token".to_string()));
        }
        Ok(SessionCredential::new(response.token))
    }
}
