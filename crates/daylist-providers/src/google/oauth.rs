//! Google OAuth 2.0 client.
//!
//! Covers the three exchanges the service needs:
//!
//! 1. Sign-in: PKCE authorization URL, then code-for-token exchange
//! 2. Identity: OpenID userinfo lookup to learn who signed in
//! 3. Refresh: refresh-token grant, used by [`SessionTokenManager`]
//!
//! [`SessionTokenManager`]: crate::token::SessionTokenManager

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use secrecy::ExposeSecret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;
use crate::token::{RefreshError, TokenGrant, TokenRefresher};

use super::config::GoogleConfig;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// OAuth client for Google.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

/// The signed-in Google identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoogleUser {
    /// Stable OpenID subject identifier.
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthClient {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::configuration("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Consent-page URL for a sign-in attempt.
    pub fn authorization_url(&self, flow: &PkceFlow, redirect_uri: &str) -> String {
        flow.build_auth_url(
            &self.config.auth_url,
            &self.config.credentials.client_id,
            redirect_uri,
            &self.config.scopes,
        )
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            (
                "client_secret",
                self.config.credentials.client_secret.expose_secret().as_str(),
            ),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "code exchange failed ({}): {}",
                status, body
            ))
            .with_provider("google"));
        }

        let grant: TokenGrant = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))?;

        info!(has_refresh_token = grant.refresh_token.is_some(), "exchanged authorization code");
        Ok(grant)
    }

    /// Looks up the identity behind an access token.
    pub async fn fetch_userinfo(&self, access_token: &str) -> ProviderResult<GoogleUser> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::authentication("access token rejected by userinfo endpoint"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::server(format!("userinfo error ({}): {}", status, body)));
        }

        response
            .json::<GoogleUser>()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("invalid userinfo response: {}", e)))
    }

    /// Performs one refresh-token grant.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            (
                "client_secret",
                self.config.credentials.client_secret.expose_secret().as_str(),
            ),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let (error, description) = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(parsed) => (parsed.error, parsed.error_description),
                Err(_) => (format!("http_{}", status.as_u16()), Some(body)),
            };
            debug!(status = status.as_u16(), error = %error, "token endpoint rejected refresh");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                error,
                description,
            });
        }

        let grant: TokenGrant = serde_json::from_str(&body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        debug!(expires_in = ?grant.expires_in, "token endpoint issued new access token");
        Ok(grant)
    }
}

impl TokenRefresher for OAuthClient {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenGrant, RefreshError>> {
        Box::pin(async move { self.refresh_token(refresh_token).await })
    }
}

/// PKCE parameters for one sign-in attempt.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// High-entropy secret kept server-side until the callback.
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    pub challenge: String,
    /// CSRF token echoed back by Google.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::generate_state();

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    pub fn compute_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    fn generate_state() -> String {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Builds the consent URL; `access_type=offline` and `prompt=consent`
    /// make Google issue a refresh token on every sign-in.
    pub fn build_auth_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::config::{GOOGLE_AUTH_URL, OAuthCredentials};
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> OAuthClient {
        let credentials = OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret");
        let config = GoogleConfig::new(credentials)
            .with_token_url(format!("{}/token", server.url()))
            .with_userinfo_url(format!("{}/userinfo", server.url()));
        OAuthClient::new(config).unwrap()
    }

    #[test]
    fn pkce_verifier_length() {
        let flow = PkceFlow::new();
        // 32 bytes base64url without padding
        assert_eq!(flow.verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_is_deterministic() {
        assert_eq!(PkceFlow::compute_challenge("v"), PkceFlow::compute_challenge("v"));
        assert_ne!(PkceFlow::new().state, PkceFlow::new().state);
    }

    #[test]
    fn auth_url_requests_offline_access() {
        let flow = PkceFlow::new();
        let url = flow.build_auth_url(
            GOOGLE_AUTH_URL,
            "test-client.apps.googleusercontent.com",
            "http://localhost:3000/api/auth/callback/google",
            &["openid".to_string(), "https://www.googleapis.com/auth/calendar.readonly".to_string()],
        );

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("calendar.readonly"));
        assert!(url.contains(&format!("state={}", urlencoding::encode(&flow.state))));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "r-123".into()),
                Matcher::UrlEncoded("client_id".into(), "test-client.apps.googleusercontent.com".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let grant = client_for(&server).refresh_token("r-123").await.unwrap();

        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.expires_in, Some(3599));
        assert!(grant.refresh_token.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_preserves_invalid_grant() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
            .create_async()
            .await;

        let err = client_for(&server).refresh_token("revoked").await.unwrap_err();

        assert!(err.is_invalid_grant());
        assert_eq!(err.reason(), "invalid_grant");
        match err {
            RefreshError::Rejected { status, description, .. } => {
                assert_eq!(status, 400);
                assert_eq!(description.as_deref(), Some("Token has been expired or revoked."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_with_unparseable_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let err = client_for(&server).refresh_token("r").await.unwrap_err();
        assert_eq!(err.reason(), "http_503");
        assert!(!err.is_invalid_grant());
    }

    #[tokio::test]
    async fn refresh_with_garbage_success_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).refresh_token("r").await.unwrap_err();
        assert!(matches!(err, RefreshError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn exchange_code_returns_grant() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"a","refresh_token":"r","expires_in":3600,"scope":"openid email"}"#)
            .create_async()
            .await;

        let grant = client_for(&server)
            .exchange_code("code", "verifier", "http://localhost/cb")
            .await
            .unwrap();
        assert_eq!(grant.refresh_token.as_deref(), Some("r"));
        assert_eq!(grant.scope.as_deref(), Some("openid email"));
    }

    #[tokio::test]
    async fn userinfo_maps_401_to_authentication() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/userinfo")
            .with_status(401)
            .create_async()
            .await;

        let err = client_for(&server).fetch_userinfo("stale").await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn userinfo_parses_identity() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"sub":"1234","email":"kim@example.com","name":"Kim"}"#)
            .create_async()
            .await;

        let user = client_for(&server).fetch_userinfo("tok").await.unwrap();
        assert_eq!(user.sub, "1234");
        assert_eq!(user.email.as_deref(), Some("kim@example.com"));
    }
}
