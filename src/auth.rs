use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

pub const AUTH_BASE_URL: &str = "https://identity.vaillant-group.com/auth/realms";
pub const CLIENT_ID: &str = "myvaillant";
pub const REALM_GERMANY: &str = "vaillant-germany-b2c";

/// Tokens are refreshed this many seconds before they expire.
const REFRESH_MARGIN_SECS: u64 = 60;

/// Supplies the bearer credential attached to every API request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Trait for callbacks when tokens are refreshed
pub trait TokenRefreshCallback: Send + Sync {
    fn on_tokens_refreshed(&self, tokens: &TokenSet);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token endpoint reply. Expiry is read from the access token itself.
#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Token endpoint of a Keycloak realm.
pub fn token_url(realm: &str) -> String {
    let realm = if realm.is_empty() { REALM_GERMANY } else { realm };
    format!("{}/{}/protocol/openid-connect/token", AUTH_BASE_URL, realm)
}

/// Check if a JWT token is expired
///
/// The signature is not verified; only the `exp` claim is read. Tokens that
/// cannot be decoded count as expired.
pub fn is_token_expired(token: &str, buffer_seconds: u64) -> bool {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(token_data) => {
            let now = Utc::now().timestamp();
            now + buffer_seconds as i64 >= token_data.claims.exp
        }
        Err(_) => true,
    }
}

/// A bearer token managed outside this crate.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Token source that renews the access token with the OAuth2 refresh grant.
pub struct RefreshingTokenSource {
    client: reqwest::Client,
    token_url: String,
    tokens: Mutex<TokenSet>,
    refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
}

impl RefreshingTokenSource {
    pub fn new(
        tokens: TokenSet,
        realm: &str,
        refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
    ) -> Self {
        Self::new_with_token_url(tokens, token_url(realm), refresh_callback)
    }

    pub fn new_with_token_url(
        tokens: TokenSet,
        token_url: String,
        refresh_callback: Option<Arc<dyn TokenRefreshCallback>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url,
            tokens: Mutex::new(tokens),
            refresh_callback,
        }
    }

    pub async fn tokens(&self) -> TokenSet {
        self.tokens.lock().await.clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        debug!("Refreshing access token at {}", self.token_url);

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", CLIENT_ID),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            error!("Token refresh failed with status {}: {}", status, response_text);
            return Err(Error::Auth(format!(
                "token refresh failed with status {}",
                status
            )));
        }

        let refreshed: RefreshResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::Auth(format!("failed to parse token response: {}", e)))?;
        if refreshed.access_token.is_empty() {
            return Err(Error::Auth(
                "token refresh failed to obtain access token".to_string(),
            ));
        }

        Ok(TokenSet {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        })
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;

        if !is_token_expired(&tokens.access_token, REFRESH_MARGIN_SECS) {
            return Ok(tokens.access_token.clone());
        }
        if tokens.refresh_token.is_empty() {
            return Err(Error::Auth(
                "access token expired and no refresh token available".to_string(),
            ));
        }

        let refreshed = self.refresh(&tokens.refresh_token).await?;
        *tokens = refreshed;
        debug!("Access token refreshed");

        if let Some(callback) = &self.refresh_callback {
            callback.on_tokens_refreshed(&tokens);
        }
        Ok(tokens.access_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        aud: String,
        exp: i64,
    }

    fn token_expiring_in(seconds: i64) -> String {
        let claims = TestClaims {
            sub: "user".to_string(),
            aud: "account".to_string(),
            exp: Utc::now().timestamp() + seconds,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    #[test]
    fn test_token_expiration_check() {
        assert!(!is_token_expired(&token_expiring_in(3600), 60));
        assert!(is_token_expired(&token_expiring_in(30), 60));
        assert!(is_token_expired(&token_expiring_in(-10), 0));
    }

    #[test]
    fn test_garbage_token_counts_as_expired() {
        assert!(is_token_expired("not.a.valid.token", 0));
        assert!(is_token_expired("", 0));
    }

    #[test]
    fn test_token_url_for_realm() {
        assert_eq!(
            token_url(""),
            "https://identity.vaillant-group.com/auth/realms/vaillant-germany-b2c/protocol/openid-connect/token"
        );
        assert!(token_url("vaillant-austria-b2c").contains("/vaillant-austria-b2c/"));
    }

    #[test]
    fn test_refresh_response_parsing() {
        let json = r#"{"access_token":"access123","refresh_token":"refresh456","expires_in":300,"token_type":"Bearer"}"#;
        let response: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "access123");
        assert_eq!(response.refresh_token, Some("refresh456".to_string()));
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let access = token_expiring_in(3600);
        let source = RefreshingTokenSource::new_with_token_url(
            TokenSet {
                access_token: access.clone(),
                refresh_token: "refresh".to_string(),
            },
            "http://127.0.0.1:1/unused".to_string(),
            None,
        );
        assert_eq!(source.access_token().await.unwrap(), access);
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_fails() {
        let source = RefreshingTokenSource::new_with_token_url(
            TokenSet {
                access_token: token_expiring_in(-60),
                refresh_token: String::new(),
            },
            "http://127.0.0.1:1/unused".to_string(),
            None,
        );
        let err = source.access_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken::new("abc");
        assert_eq!(source.access_token().await.unwrap(), "abc");
    }
}
