mod auth;
mod client;
mod paging;
mod rows;
mod store;
mod types;

pub use auth::{Credential, TokenManager, TokenState};
pub use client::RestClient;
pub use paging::PAGE_SIZE;
pub use store::{FileTokenStore, MemoryTokenStore, OPTION_NAME, TokenRecord, TokenStore};
pub use types::{ApiRequest, ApiResponse, Query, RESULT_FIELD, ResourceKind, ResponseFormat};

use crate::config::CaspioConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use serde_json::Value;

/// Supplies bearer tokens to the request layer.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Token to attach to the next request.
    async fn access_token(&self) -> Result<String>;

    /// Mint a replacement after the backend rejected the current token.
    async fn reacquire_token(&self) -> Result<String>;
}

#[async_trait]
pub trait TableOperations {
    async fn get_all_rows(
        &self,
        kind: ResourceKind,
        name: &str,
        query: &Query,
    ) -> Result<ApiResponse>;

    async fn insert_row(&self, table: &str, data: &Value) -> Result<ApiResponse>;

    async fn update_rows(&self, table: &str, query: &Query, data: &Value) -> Result<ApiResponse>;

    async fn delete_rows(&self, table: &str, query: &Query) -> Result<ApiResponse>;
}

/// HTTP client shared by the token manager and the REST client.
pub fn build_http_client(config: &CaspioConfig) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(Policy::none())
        .timeout(config.timeout())
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build reqwest client: {}", e)))
}
