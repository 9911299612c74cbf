//! Dropbox OAuth 2.0: authorization flow and token refresh.
//!
//! The callback server runs as a background task so new accounts can be
//! admitted while the poller keeps running. It only ever writes
//! credential records; it never touches the ledger or job state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::store::{Credential, CredentialStore};

use super::client::DropboxClient;

const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";
const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";

/// App registration and allowlist settings
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub app_key: String,
    pub app_secret: String,
    pub redirect_uri: String,

    /// Account ids or emails permitted to authorize. Empty = allow all.
    pub allowed_accounts: Vec<String>,
}

/// Exchanges a refresh token for a fresh access token
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth client for the authorization-code and refresh-token grants
pub struct OAuthClient {
    settings: OAuthSettings,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
        }
    }

    /// Authorization URL for the browser flow
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&state={}&token_access_type=offline",
            AUTHORIZE_URL, self.settings.app_key, self.settings.redirect_uri, state
        )
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(params)
            .send()
            .await
            .context("Token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Token endpoint returned {}: {}", status, detail);
        }

        response
            .json()
            .await
            .context("Failed to parse token response")
    }

    fn account_allowed(&self, account_id: &str, email: &str) -> bool {
        if self.settings.allowed_accounts.is_empty() {
            return true;
        }

        self.settings
            .allowed_accounts
            .iter()
            .any(|allowed| allowed == account_id || allowed == email)
    }

    /// Exchange an authorization code for a credential, verifying the
    /// account against the allowlist.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let token = self
            .token_request(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("client_id", &self.settings.app_key),
                ("client_secret", &self.settings.app_secret),
                ("redirect_uri", &self.settings.redirect_uri),
            ])
            .await?;

        let account = DropboxClient::new(token.access_token.clone())
            .current_account()
            .await
            .context("Failed to fetch account info")?;

        tracing::info!(email = %account.email, "Retrieved account info");

        if !self.account_allowed(&account.account_id, &account.email) {
            anyhow::bail!("Account {} is not authorized to use this service", account.email);
        }

        Ok(Credential::new(
            account.account_id,
            account.email,
            token.access_token,
            token.refresh_token,
        ))
    }
}

#[async_trait]
impl CredentialRefresher for OAuthClient {
    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .with_context(|| format!("No refresh token for account {}", credential.account_id))?;

        let token = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.settings.app_key),
                ("client_secret", &self.settings.app_secret),
            ])
            .await?;

        tracing::info!(account_id = %credential.account_id, "Refreshed access token");

        let mut refreshed = credential.clone();
        refreshed.access_token = token.access_token;
        if token.refresh_token.is_some() {
            refreshed.refresh_token = token.refresh_token;
        }

        Ok(refreshed)
    }
}

struct ServerState {
    oauth: Arc<OAuthClient>,
    store: Arc<CredentialStore>,

    /// CSRF token for this server run
    state_token: String,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Serve the authorization landing page and OAuth callback until the
/// task is dropped.
pub async fn run_callback_server(
    oauth: Arc<OAuthClient>,
    store: Arc<CredentialStore>,
    addr: SocketAddr,
) -> Result<()> {
    let state = Arc::new(ServerState {
        oauth,
        store,
        state_token: Uuid::new_v4().simple().to_string(),
    });

    let app = Router::new()
        .route("/", get(landing))
        .route("/oauth/callback", get(callback))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind OAuth server to {}", addr))?;

    tracing::info!(%addr, "OAuth server listening");

    axum::serve(listener, app)
        .await
        .context("OAuth server failed")
}

async fn landing(State(state): State<Arc<ServerState>>) -> Html<String> {
    let auth_url = state.oauth.authorization_url(&state.state_token);

    Html(format!(
        "<html><head><title>vidnote authorization</title></head><body>\
         <h1>vidnote - Dropbox Authorization</h1>\
         <p>Click the link below to authorize this application with your Dropbox account:</p>\
         <p><a href=\"{}\">Authorize with Dropbox</a></p>\
         <p style=\"color: #666;\">vidnote will create an App Folder with Inbox, Outbox and Archive folders.</p>\
         </body></html>",
        auth_url
    ))
}

async fn callback(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    if let Some(error) = params.error {
        return Html(format!("<h1>Authorization Failed</h1><p>Error: {}</p>", error));
    }

    let (Some(code), Some(csrf)) = (params.code, params.state) else {
        return Html("<h1>Bad Request</h1><p>Missing authorization code or state</p>".to_string());
    };

    if csrf != state.state_token {
        return Html("<h1>Invalid State</h1><p>CSRF validation failed</p>".to_string());
    }

    match state.oauth.exchange_code(&code).await {
        Ok(credential) => {
            let email = credential.account_email.clone();
            if let Err(e) = state.store.save(&credential) {
                tracing::error!(error = %e, "Failed to save credential");
                return Html(format!("<h1>Server Error</h1><p>{}</p>", e));
            }

            tracing::info!(%email, "Authorized account");
            Html(
                "<h1>Authorization Successful!</h1>\
                 <p>You can close this window and return to the application.</p>"
                    .to_string(),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Authorization failed");
            Html(format!("<h1>Authorization Failed</h1><p>{}</p>", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(allowed: Vec<String>) -> OAuthClient {
        OAuthClient::new(OAuthSettings {
            app_key: "KEY".to_string(),
            app_secret: "SECRET".to_string(),
            redirect_uri: "http://localhost:8080/oauth/callback".to_string(),
            allowed_accounts: allowed,
        })
    }

    #[test]
    fn test_authorization_url() {
        let url = client(vec![]).authorization_url("STATE");

        assert!(url.starts_with("https://www.dropbox.com/oauth2/authorize?"));
        assert!(url.contains("client_id=KEY"));
        assert!(url.contains("state=STATE"));
        assert!(url.contains("token_access_type=offline"));
    }

    #[test]
    fn test_allowlist() {
        let open = client(vec![]);
        assert!(open.account_allowed("anyone", "any@example.com"));

        let restricted = client(vec!["user@example.com".to_string(), "dbid:123".to_string()]);
        assert!(restricted.account_allowed("dbid:123", "other@example.com"));
        assert!(restricted.account_allowed("dbid:999", "user@example.com"));
        assert!(!restricted.account_allowed("dbid:999", "other@example.com"));
    }
}
