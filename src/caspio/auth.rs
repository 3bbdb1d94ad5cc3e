use super::AccessTokenProvider;
use super::store::{TokenRecord, TokenStore};
use crate::config::CaspioConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// Only the token endpoint is used; both grants authenticate with HTTP Basic
type ConfiguredClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet, // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No access token held.
    Empty,
    /// Freshly minted, loaded from the store, or confirmed by the backend.
    Valid,
    /// Rejected by the backend and not yet replaced.
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// A stored record is only trusted when it carries both tokens.
    fn from_record(record: TokenRecord) -> Option<Self> {
        if record.access_token.is_empty() || record.refresh_token.is_empty() {
            return None;
        }

        Some(Self {
            access_token: record.access_token,
            refresh_token: Some(record.refresh_token),
            expires_at: DateTime::from_timestamp(record.expires, 0),
        })
    }

    fn to_record(&self, created: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone().unwrap_or_default(),
            created: created.timestamp(),
            expires: self
                .expires_at
                .map(|expires_at| expires_at.timestamp())
                .unwrap_or_else(|| created.timestamp()),
        }
    }

    /// Build from a token endpoint response.
    ///
    /// Refresh responses may omit the refresh token, in which case `fallback_refresh_token`
    /// is kept.
    fn from_token_response(
        token: &BasicTokenResponse,
        fallback_refresh_token: Option<&str>,
    ) -> Self {
        let refresh_token = token
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| fallback_refresh_token.map(str::to_string));

        // An `expires_in` too large to represent leaves the expiry unknown
        let expires_at = token
            .expires_in()
            .map_or(Some(DEFAULT_EXPIRES_IN_SECS), |d| i64::try_from(d.as_secs()).ok())
            .and_then(Duration::try_seconds)
            .and_then(|expires_in| Utc::now().checked_add_signed(expires_in));

        Self {
            access_token: token.access_token().secret().clone(),
            refresh_token,
            expires_at,
        }
    }
}

struct Session {
    credential: Credential,
    state: TokenState,
}

/// Owns the OAuth credential and guarantees `get_token` hands out a usable token.
///
/// All transitions run under one lock, so a manager can be shared between tasks.
pub struct TokenManager {
    oauth: ConfiguredClient,
    http_client: reqwest::Client,
    validation_url: String,
    store: Arc<dyn TokenStore>,
    session: Mutex<Session>,
}

impl TokenManager {
    /// Create a manager, trusting any complete record already in `store`.
    pub fn new(
        config: &CaspioConfig,
        http_client: reqwest::Client,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let token_url = TokenUrl::new(config.token_url())
            .map_err(|e| AppError::Config(format!("Invalid token URL: {}", e)))?;

        let oauth = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_token_uri(token_url);

        let credential = match store.load() {
            Ok(record) => record.and_then(Credential::from_record),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable stored token");
                None
            }
        };

        let session = match credential {
            Some(credential) => {
                debug!("Using stored access token");
                Session {
                    credential,
                    state: TokenState::Valid,
                }
            }
            None => Session {
                credential: Credential::default(),
                state: TokenState::Empty,
            },
        };

        Ok(Self {
            oauth,
            http_client,
            validation_url: format!("{}/tables", config.rest_url()),
            store,
            session: Mutex::new(session),
        })
    }

    pub async fn state(&self) -> TokenState {
        self.session.lock().await.state
    }

    pub async fn credential(&self) -> Credential {
        self.session.lock().await.credential.clone()
    }

    /// Return a token the backend currently accepts.
    ///
    /// The held token is probed first. When it is rejected the refresh grant is tried, then
    /// the client-credentials grant. Fails with `AppError::Authentication` when neither grant
    /// yields a token.
    #[instrument(name = "Getting access token", skip_all)]
    pub async fn get_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;

        if self.probe(&session.credential.access_token).await {
            session.state = TokenState::Valid;
            return Ok(session.credential.access_token.clone());
        }

        if session.state == TokenState::Valid {
            session.state = TokenState::Invalid;
        }

        self.mint(&mut session).await
    }

    /// Replace the held token without probing it first.
    #[instrument(name = "Reacquiring access token", skip_all)]
    pub async fn reacquire_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;

        if session.state == TokenState::Valid {
            session.state = TokenState::Invalid;
        }

        self.mint(&mut session).await
    }

    /// Probe the backend with the held token.
    pub async fn is_access_token_valid(&self) -> bool {
        let access_token = self.session.lock().await.credential.access_token.clone();
        self.probe(&access_token).await
    }

    async fn probe(&self, access_token: &str) -> bool {
        if access_token.is_empty() {
            return false;
        }

        let response = self
            .http_client
            .get(&self.validation_url)
            .bearer_auth(access_token)
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!("Access token validated");
                true
            }
            Ok(response) => {
                debug!(status = %response.status(), "Access token not validated");
                false
            }
            Err(e) => {
                warn!(error = %e, "Access token validation request failed");
                false
            }
        }
    }

    async fn mint(&self, session: &mut Session) -> Result<String> {
        let renewed = match session.credential.refresh_token.as_deref() {
            Some(refresh_token) if !refresh_token.is_empty() => {
                self.renew_access_token(refresh_token).await
            }
            _ => None,
        };

        let credential = match renewed {
            Some(credential) => credential,
            None => self
                .request_access_token_from_server()
                .await
                .ok_or_else(|| {
                    AppError::Authentication("both token grants were rejected".to_string())
                })?,
        };

        self.store_token_option(&credential);

        session.credential = credential;
        session.state = TokenState::Valid;

        Ok(session.credential.access_token.clone())
    }

    async fn request_access_token_from_server(&self) -> Option<Credential> {
        let result = self
            .oauth
            .exchange_client_credentials()
            .request_async(&self.http_client)
            .await;

        match result {
            Ok(token) => {
                info!("Access token created");
                Some(Credential::from_token_response(&token, None))
            }
            Err(e) => {
                warn!(error = ?e, "Failed to create access token");
                None
            }
        }
    }

    async fn renew_access_token(&self, refresh_token: &str) -> Option<Credential> {
        let result = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await;

        match result {
            Ok(token) => {
                info!("Access token renewed");
                Some(Credential::from_token_response(&token, Some(refresh_token)))
            }
            Err(e) => {
                warn!(error = ?e, "Failed to renew access token");
                None
            }
        }
    }

    /// Write-through of the credential. A failed write leaves the in-memory token in use.
    fn store_token_option(&self, credential: &Credential) {
        match self.store.save(&credential.to_record(Utc::now())) {
            Ok(()) => debug!("Stored access token"),
            Err(e) => warn!(error = %e, "Access token not stored"),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for TokenManager {
    async fn access_token(&self) -> Result<String> {
        let access_token = self.session.lock().await.credential.access_token.clone();
        if access_token.is_empty() {
            return self.get_token().await;
        }

        Ok(access_token)
    }

    async fn reacquire_token(&self) -> Result<String> {
        TokenManager::reacquire_token(self).await
    }
}
