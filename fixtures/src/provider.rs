//! Stand-in for the tracker's OAuth2 authorization server.
//!
//! `/oauth2/authorize` hands out a code immediately (no login screen) and
//! `/oauth2/token` redeems it once, checking the PKCE verifier against the
//! challenge it was issued for.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

/// What a code redeems to
#[derive(Debug, Clone)]
pub struct Grant {
    /// `None` makes the token response leave out `user_id`
    pub user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` skips the PKCE check
    pub code_challenge: Option<String>,
    /// `None` skips the redirect URI check
    pub redirect_uri: Option<String>,
    pub scope: String,
}

impl Grant {
    pub fn for_user(user_id: &str, access_token: &str, refresh_token: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            access_token: access_token.to_string(),
            refresh_token: Some(refresh_token.to_string()),
            code_challenge: None,
            redirect_uri: None,
            scope: "activity sleep".to_string(),
        }
    }
}

struct ProviderState {
    user_id: String,
    codes: HashMap<String, Grant>,
}

#[derive(Clone)]
pub struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
    token_requests: Arc<AtomicUsize>,
    token_delay_ms: Arc<AtomicU64>,
}

impl MockProvider {
    /// Provider whose authorize endpoint logs everyone in as `user_id`
    pub fn new(user_id: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                user_id: user_id.to_string(),
                codes: HashMap::new(),
            })),
            token_requests: Arc::new(AtomicUsize::new(0)),
            token_delay_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/oauth2/authorize", get(authorize))
            .route("/oauth2/token", post(token))
            .with_state(self.clone())
    }

    /// Make `code` redeemable without going through the authorize endpoint
    pub fn seed_code(&self, code: &str, grant: Grant) {
        self.lock().codes.insert(code.to_string(), grant);
    }

    /// Number of requests the token endpoint has received, successful or not
    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    /// Hold every token response back by `delay`
    pub fn set_token_delay(&self, delay: Duration) {
        self.token_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct AuthorizeQuery {
    response_type: String,
    client_id: String,
    redirect_uri: String,
    #[serde(default)]
    scope: String,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    state: Option<String>,
}

#[derive(Serialize)]
struct RedirectParams<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

async fn authorize(
    State(provider): State<MockProvider>,
    Query(params): Query<AuthorizeQuery>,
) -> Response {
    if params.response_type != "code" {
        return (StatusCode::BAD_REQUEST, "unsupported response_type").into_response();
    }
    if params.code_challenge_method.as_deref() != Some("S256") || params.code_challenge.is_none() {
        return (StatusCode::BAD_REQUEST, "PKCE with S256 is required").into_response();
    }

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let code = URL_SAFE_NO_PAD.encode(bytes);

    let user_id = provider.lock().user_id.clone();
    info!(client_id = %params.client_id, %user_id, "Provider: issuing authorization code");

    provider.seed_code(
        &code,
        Grant {
            user_id: Some(user_id.clone()),
            access_token: format!("access-{code}"),
            refresh_token: Some(format!("refresh-{code}")),
            code_challenge: params.code_challenge.clone(),
            redirect_uri: Some(params.redirect_uri.clone()),
            scope: params.scope.clone(),
        },
    );

    let query = serde_urlencoded::to_string(RedirectParams {
        code: &code,
        state: params.state.as_deref(),
    })
    .unwrap(); // SAFETY: We are in fixtures so a panic is fine
    let separator = if params.redirect_uri.contains('?') { '&' } else { '?' };

    Redirect::to(&format!("{}{separator}{query}", params.redirect_uri)).into_response()
}

fn grant_error(error_type: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "errors": [{ "errorType": error_type, "message": message }],
            "success": false
        })),
    )
        .into_response()
}

async fn token(
    State(provider): State<MockProvider>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    provider.token_requests.fetch_add(1, Ordering::SeqCst);

    let delay = provider.token_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if params.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return grant_error("unsupported_grant_type", "Only authorization_code is supported");
    }

    let code = params.get("code").cloned().unwrap_or_default();
    // Codes are single-use whether or not the rest of the request checks out
    let Some(grant) = provider.lock().codes.remove(&code) else {
        return grant_error("invalid_grant", "Authorization code invalid");
    };

    if let Some(challenge) = &grant.code_challenge {
        let verifier = params.get("code_verifier").map(String::as_str).unwrap_or("");
        if s256(verifier) != *challenge {
            return grant_error("invalid_grant", "Code verifier does not match the challenge");
        }
    }

    if let Some(expected) = &grant.redirect_uri {
        if params.get("redirect_uri") != Some(expected) {
            return grant_error("invalid_grant", "Redirect URI mismatch");
        }
    }

    info!(user_id = ?grant.user_id, "Provider: redeemed authorization code");

    let mut body = json!({
        "access_token": grant.access_token,
        "expires_in": 28800,
        "scope": grant.scope,
        "token_type": "Bearer",
    });
    if let Some(refresh_token) = grant.refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    if let Some(user_id) = grant.user_id {
        body["user_id"] = json!(user_id);
    }

    Json(body).into_response()
}
