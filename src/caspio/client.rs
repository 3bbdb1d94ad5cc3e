use super::AccessTokenProvider;
use super::types::{ApiRequest, ApiResponse, ResponseFormat};
use crate::config::CaspioConfig;
use crate::error::Result;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

const SESSION_COOKIE: &str = "CASPIOSESSID";

pub struct RestClient {
    http_client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    rest_url: String,
    response_format: ResponseFormat,
    session_id: String,
}

impl RestClient {
    /// Create a client for the account's REST API.
    ///
    /// `session_id` is sent with every request so backend logs can be correlated with ours.
    pub fn new(
        config: &CaspioConfig,
        http_client: reqwest::Client,
        tokens: Arc<dyn AccessTokenProvider>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            tokens,
            rest_url: config.rest_url(),
            response_format: config.response_format,
            session_id: session_id.into(),
        }
    }

    pub fn set_response_format(&mut self, name: &str) {
        self.response_format = ResponseFormat::from_name(name);
    }

    pub fn response_format(&self) -> ResponseFormat {
        self.response_format
    }

    /// Build `{rest_url}/{path}` with optional query pairs.
    pub(crate) fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.rest_url, path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get(&self, url: Url) -> Result<ApiResponse> {
        self.make_request(&ApiRequest::get(url), true).await
    }

    pub async fn put(&self, url: Url, data: &Value) -> Result<ApiResponse> {
        self.make_request(&ApiRequest::put(url, data.clone()), true)
            .await
    }

    pub async fn post(&self, url: Url, data: &Value) -> Result<ApiResponse> {
        self.make_request(&ApiRequest::post(url, data.clone()), true)
            .await
    }

    pub async fn delete(&self, url: Url) -> Result<ApiResponse> {
        self.make_request(&ApiRequest::delete(url), true).await
    }

    /// Send `request`, returning the response whatever its status.
    ///
    /// A 403 with `attempt_refresh` set reacquires the token and sends the request once more;
    /// the second response is returned as-is.
    #[instrument(name = "Request", skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn make_request(
        &self,
        request: &ApiRequest,
        attempt_refresh: bool,
    ) -> Result<ApiResponse> {
        let token = self.tokens.access_token().await?;
        let response = self.send(request, &token).await?;

        if response.status != StatusCode::FORBIDDEN || !attempt_refresh {
            log_response(&response);
            return Ok(response);
        }

        info!("403 - refreshing token and retrying request");
        let token = self.tokens.reacquire_token().await?;
        let response = self.send(request, &token).await?;

        log_response(&response);
        Ok(response)
    }

    async fn send(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .bearer_auth(token)
            .header(ACCEPT, self.response_format.mime_type())
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, self.session_id));

        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        ApiResponse::read(response).await
    }
}

fn log_response(response: &ApiResponse) {
    debug!(status = %response.status, headers = ?response.headers, "Response");
    match response.rows() {
        Some(rows) => debug!(rows = rows.len(), "Response rows"),
        None => debug!(body = %response.body, "Response body"),
    }
}
