//! Authenticated HTTP connection to a Filebox server

use reqwest::{Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{TransferError, TransferResult};
use crate::config::ClientConfig;
use crate::protocol::{
    DeleteRequest, ErrorResponse, MessageResponse, RegisterRequest, TimestampResponse,
    TransferRequest, UploadStatus, UserUpdateRequest,
};
use crate::snapshot::SyncState;

/// Account credentials, attached to every authenticated request
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// HTTP client bound to one server and one account
#[derive(Debug, Clone)]
pub struct Connection {
    http_client: HttpClient,
    base_url: String,
    credentials: Credentials,
}

impl Connection {
    /// Create a connection; every request is bounded by the configured timeout
    pub fn new(config: &ClientConfig) -> TransferResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("filebox/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        let base_url = format!(
            "{}/{}",
            config.server_address.trim_end_matches('/'),
            config.api_prefix.trim_matches('/')
        );

        Ok(Self {
            http_client,
            base_url,
            credentials: Credentials {
                username: config.username.clone(),
                password: config.password.clone(),
            },
        })
    }

    /// Get the base URL, API prefix included
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    // ========================================================================
    // URLs
    // ========================================================================

    pub fn files_url(&self, path: &str) -> String {
        format!("{}/files/{}", self.base_url, encode_path(path))
    }

    pub fn uploads_url(&self, path: &str) -> String {
        format!("{}/uploads/{}", self.base_url, encode_path(path))
    }

    fn actions_url(&self, action: &str) -> String {
        format!("{}/actions/{}", self.base_url, action)
    }

    fn users_url(&self, username: &str) -> String {
        format!("{}/users/{}", self.base_url, urlencoding::encode(username))
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Request carrying Basic auth
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    fn anonymous(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client.request(method, url)
    }

    /// Full snapshot of the account's tree
    pub async fn fetch_snapshot(&self) -> TransferResult<SyncState> {
        let response = self.request(Method::GET, &self.files_url("")).send().await?;
        parse_json(check(response).await?).await
    }

    /// Server-side progress of a chunked upload, `None` when there is none
    pub async fn upload_status(&self, path: &str) -> TransferResult<Option<UploadStatus>> {
        let response = self.request(Method::GET, &self.uploads_url(path)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(check(response).await?).await.map(Some)
    }

    pub async fn delete(&self, path: &str) -> TransferResult<i64> {
        let body = DeleteRequest {
            path: path.to_string(),
        };
        self.action("delete", &body).await
    }

    pub async fn move_file(&self, src: &str, dst: &str) -> TransferResult<i64> {
        let body = TransferRequest {
            src: src.to_string(),
            dst: dst.to_string(),
        };
        self.action("move", &body).await
    }

    pub async fn copy_file(&self, src: &str, dst: &str) -> TransferResult<i64> {
        let body = TransferRequest {
            src: src.to_string(),
            dst: dst.to_string(),
        };
        self.action("copy", &body).await
    }

    async fn action<T: Serialize>(&self, action: &str, body: &T) -> TransferResult<i64> {
        let response = self
            .request(Method::POST, &self.actions_url(action))
            .json(body)
            .send()
            .await?;
        let reply: TimestampResponse = parse_json(check(response).await?).await?;
        Ok(reply.server_timestamp)
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    pub async fn register(&self, username: &str, password: &str) -> TransferResult<MessageResponse> {
        let body = RegisterRequest {
            password: password.to_string(),
        };
        let response = self
            .anonymous(Method::POST, &self.users_url(username))
            .json(&body)
            .send()
            .await?;
        parse_json(check(response).await?).await
    }

    pub async fn activate(&self, username: &str, code: &str) -> TransferResult<MessageResponse> {
        let body = UserUpdateRequest::Activate {
            activation_code: code.to_string(),
        };
        self.update_user(username, &body).await
    }

    pub async fn request_password_reset(&self, username: &str) -> TransferResult<MessageResponse> {
        let url = format!("{}/reset", self.users_url(username));
        let response = self.anonymous(Method::POST, &url).send().await?;
        parse_json(check(response).await?).await
    }

    pub async fn reset_password(
        &self,
        username: &str,
        code: &str,
        new_password: &str,
    ) -> TransferResult<MessageResponse> {
        let body = UserUpdateRequest::Reset {
            password: new_password.to_string(),
            recoverpass_code: code.to_string(),
        };
        self.update_user(username, &body).await
    }

    async fn update_user(&self, username: &str, body: &UserUpdateRequest) -> TransferResult<MessageResponse> {
        let response = self
            .anonymous(Method::PUT, &self.users_url(username))
            .json(body)
            .send()
            .await?;
        parse_json(check(response).await?).await
    }
}

/// Percent-encode each segment of a relative path, keeping the separators
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Turn any non-success response into `TransferError::Status`
pub async fn check(response: Response) -> TransferResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (message, details) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (body.message, body.details),
        Err(_) if text.is_empty() => (status.to_string(), None),
        Err(_) => (text, None),
    };

    Err(TransferError::Status {
        status: status.as_u16(),
        message,
        details,
    })
}

pub async fn parse_json<T: DeserializeOwned>(response: Response) -> TransferResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| TransferError::InvalidResponse(e.to_string()))
}
