use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;

use crate::{errors::LinkError, state::ProviderConfig};

/// Body of a successful token response, as sent by the provider
#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    user_id: Option<String>,
    scope: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
}

/// Tokens granted for one participant
#[derive(Clone)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Provider-issued account identifier; the storage key
    pub user_id: String,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl TryFrom<RawTokenResponse> for TokenResponse {
    type Error = LinkError;

    fn try_from(raw: RawTokenResponse) -> Result<Self, Self::Error> {
        let user_id = raw
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(LinkError::MissingUserIdentifier)?;

        Ok(Self {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            user_id,
            scope: raw.scope,
            expires_in: raw.expires_in,
            token_type: raw.token_type,
        })
    }
}

/// Talks to the provider's token endpoint
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    provider: ProviderConfig,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, provider: ProviderConfig) -> Self {
        Self { http, provider }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Exactly one request is made. The code is single-use at the provider, so a
    /// failed attempt cannot be retried with the same code.
    #[tracing::instrument(skip_all, fields(token_endpoint = %self.provider.token_endpoint))]
    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<TokenResponse, LinkError> {
        let form = [
            ("client_id", self.provider.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.provider.redirect_uri.as_str()),
        ];
        let body = serde_urlencoded::to_string(form).map_err(|e| LinkError::TokenExchangeFailed {
            status: None,
            body: format!("Failed to encode token request: {e}"),
        })?;

        let response = self
            .http
            .post(&self.provider.token_endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, timeout = e.is_timeout(), "Token request network error");
                LinkError::TokenExchangeFailed {
                    status: None,
                    body: e.to_string(),
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LinkError::TokenExchangeFailed {
            status: Some(status),
            body: format!("Failed to read token response: {e}"),
        })?;

        if !status.is_success() {
            tracing::error!(%status, body = %text, "Token request failed");
            return Err(LinkError::TokenExchangeFailed { status: Some(status), body: text });
        }

        // The body holds live tokens, so parse errors never echo it
        let raw: RawTokenResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(%status, error = %e, "Failed to parse token response");
            LinkError::TokenExchangeFailed {
                status: Some(status),
                body: format!("Failed to parse token response: {e}"),
            }
        })?;

        let tokens = TokenResponse::try_from(raw)?;
        tracing::info!(user_id = %tokens.user_id, "Token exchange succeeded");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(user_id: Option<&str>) -> RawTokenResponse {
        RawTokenResponse {
            access_token: "access-secret".to_string(),
            refresh_token: Some("refresh-secret".to_string()),
            user_id: user_id.map(str::to_string),
            scope: Some("activity sleep".to_string()),
            expires_in: Some(28800),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_missing_user_id_is_its_own_failure() {
        assert!(matches!(
            TokenResponse::try_from(raw(None)),
            Err(LinkError::MissingUserIdentifier)
        ));
        assert!(matches!(
            TokenResponse::try_from(raw(Some("  "))),
            Err(LinkError::MissingUserIdentifier)
        ));
    }

    #[test]
    fn test_debug_output_hides_tokens() {
        let tokens = TokenResponse::try_from(raw(Some("U123"))).unwrap();
        let printed = format!("{tokens:?}");

        assert!(printed.contains("U123"));
        assert!(!printed.contains("access-secret"));
        assert!(!printed.contains("refresh-secret"));
    }

    #[test]
    fn test_provider_body_parses() {
        let body = r#"{
            "access_token": "A",
            "expires_in": 28800,
            "refresh_token": "R",
            "scope": "sleep activity",
            "token_type": "Bearer",
            "user_id": "U123"
        }"#;
        let raw: RawTokenResponse = serde_json::from_str(body).unwrap();
        let tokens = TokenResponse::try_from(raw).unwrap();

        assert_eq!(tokens.access_token, "A");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R"));
        assert_eq!(tokens.user_id, "U123");
        assert_eq!(tokens.expires_in, Some(28800));
    }
}
