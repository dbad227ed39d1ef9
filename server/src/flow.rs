//! One page load of the linking flow.
//!
//! ```text
//! Start -> AwaitingCallback -> CodeReceived -> Exchanging -> Persisted | PersistFailed -> Done
//!               ^    |
//!               +----+ (no code: fresh PKCE pair)
//! ```
//!
//! `VerificationLost`, `AuthorizationDenied`, `TokenExchangeFailed` and
//! `MissingUserIdentifier` are dead ends; the participant has to start over.

use tracing::{error, info, warn};

use crate::{
    errors::LinkError,
    oauth::{AuthorizationRequest, CallbackParams, PkcePair},
    state::{AppState, StateMode},
    storage::StoredCredential,
};

/// A freshly prepared trip to the provider
#[derive(Debug, Clone)]
pub struct Authorization {
    pub url: String,
    /// Value sent as `state`; also remembered in the session cookie
    pub state: String,
}

#[derive(Debug)]
pub enum FlowOutcome {
    /// Initial visit: show the link and stop
    AwaitingCallback(Authorization),
    /// Provider exchange succeeded. `persist_error` is set when the store write failed.
    Done {
        user_id: String,
        persist_error: Option<LinkError>,
    },
    /// Dead end before anything was stored
    Failed(LinkError),
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Done { .. })
    }
}

pub struct LinkFlow<'a> {
    app: &'a AppState,
}

impl<'a> LinkFlow<'a> {
    pub fn new(app: &'a AppState) -> Self {
        Self { app }
    }

    /// Generate a PKCE pair and the authorization URL that carries it
    pub fn start(&self) -> Authorization {
        let pkce = PkcePair::generate();
        let state = match self.app.config.state_mode {
            StateMode::Server => self.app.pending.begin(&pkce),
            StateMode::Verifier => pkce.verifier.clone(),
        };

        let provider = &self.app.config.provider;
        let url = AuthorizationRequest::new(provider, &pkce.challenge, &state)
            .url(&provider.authorize_endpoint);

        Authorization { url, state }
    }

    /// Drive the flow for one request.
    ///
    /// `session_state` is the state value remembered in the participant's cookie, if any.
    pub async fn run(&self, params: &CallbackParams, session_state: Option<&str>) -> FlowOutcome {
        if let Some(error) = &params.error {
            warn!(%error, "Provider redirected back with an error");
            return FlowOutcome::Failed(LinkError::AuthorizationDenied {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let Some(code) = params.code.as_deref() else {
            return FlowOutcome::AwaitingCallback(self.start());
        };

        info!("Authorization code received");

        let Some(verifier) =
            params.recover_verifier(session_state, self.app.config.state_mode, &self.app.pending)
        else {
            warn!(
                has_state = params.state.is_some(),
                has_session = session_state.is_some(),
                "Could not recover PKCE verifier"
            );
            return FlowOutcome::Failed(LinkError::VerificationLost);
        };

        let tokens = match self.app.tokens.exchange(code, &verifier).await {
            Ok(tokens) => tokens,
            Err(err) => {
                error!(error = %err, detail = %err.developer_detail(), "Token exchange failed");
                return FlowOutcome::Failed(err);
            }
        };

        let record = StoredCredential::from(&tokens);
        let persist_error = match self.app.store.save(&record).await {
            Ok(()) => {
                info!(user_id = %tokens.user_id, location = %self.app.store.location(), "Credentials persisted");
                None
            }
            Err(err) => {
                let err = LinkError::PersistenceFailed(err);
                error!(user_id = %tokens.user_id, detail = %err.developer_detail(), "Credential persistence failed");
                sentry::capture_message(
                    &format!(
                        "Credential persistence failed for user {}: {}",
                        tokens.user_id,
                        err.developer_detail()
                    ),
                    sentry::Level::Error,
                );
                Some(err)
            }
        };

        FlowOutcome::Done {
            user_id: tokens.user_id,
            persist_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use fixtures::{spawn, Grant, MockObjectStore, MockProvider};
    use secrecy::SecretString;
    use tower_cookies::Key;

    use super::*;
    use crate::{
        oauth::derive_challenge,
        state::{Config, ProviderConfig, S3Config, ServerConfig, StorageBackend, StorageConfig},
        storage::{CredentialStore, MemoryCredentialStore, S3CredentialStore, StoreError},
    };

    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn save(&self, _record: &StoredCredential) -> Result<(), StoreError> {
            Err(StoreError::InvalidKey("always broken".to_string()))
        }

        fn location(&self) -> String {
            "broken://".to_string()
        }
    }

    fn config(mode: StateMode) -> Config {
        Config {
            provider: ProviderConfig {
                client_id: "23ABCD".to_string(),
                authorize_endpoint: "https://provider.test/oauth2/authorize".to_string(),
                // Nothing listens here; any exchange attempt fails fast
                token_endpoint: "http://127.0.0.1:9/oauth2/token".to_string(),
                redirect_uri: "https://link.test/".to_string(),
                scopes: vec!["activity".to_string(), "sleep".to_string()],
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                key_prefix: "tokens/".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                development_mode: false,
                cookie_key: None,
            },
            state_mode: mode,
            state_ttl: Duration::from_secs(600),
            max_pending: 100,
            http_timeout: Duration::from_secs(2),
        }
    }

    fn app(mode: StateMode, store: Arc<dyn CredentialStore>) -> AppState {
        AppState::new(config(mode), Key::generate(), reqwest::Client::new(), store)
    }

    fn query_value(url: &str, name: &str) -> Option<String> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_start_in_server_mode_hides_verifier() {
        let app = app(StateMode::Server, Arc::new(MemoryCredentialStore::new("tokens/")));
        let authorization = LinkFlow::new(&app).start();

        assert_eq!(query_value(&authorization.url, "state"), Some(authorization.state.clone()));
        assert_eq!(app.pending.len(), 1);

        let verifier = app.pending.take(&authorization.state).unwrap();
        assert_eq!(
            query_value(&authorization.url, "code_challenge"),
            Some(derive_challenge(&verifier))
        );
        assert!(!authorization.url.contains(&verifier));
    }

    #[test]
    fn test_start_in_verifier_mode_sends_verifier_as_state() {
        let app = app(StateMode::Verifier, Arc::new(MemoryCredentialStore::new("tokens/")));
        let authorization = LinkFlow::new(&app).start();

        let challenge = query_value(&authorization.url, "code_challenge").unwrap();
        assert_eq!(derive_challenge(&authorization.state), challenge);
        assert!(app.pending.is_empty());
    }

    #[tokio::test]
    async fn test_no_code_awaits_callback_without_storing() {
        let store = MemoryCredentialStore::new("tokens/");
        let app = app(StateMode::Server, Arc::new(store.clone()));

        let outcome = LinkFlow::new(&app).run(&CallbackParams::default(), None).await;

        assert!(matches!(outcome, FlowOutcome::AwaitingCallback(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_unrecoverable_verifier_is_verification_lost() {
        let store = MemoryCredentialStore::new("tokens/");
        let app = app(StateMode::Server, Arc::new(store.clone()));
        let params = CallbackParams {
            code: Some("abc".to_string()),
            state: Some("unknown".to_string()),
            ..Default::default()
        };

        let outcome = LinkFlow::new(&app).run(&params, None).await;

        assert!(matches!(outcome, FlowOutcome::Failed(LinkError::VerificationLost)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_is_denied() {
        let app = app(StateMode::Server, Arc::new(BrokenStore));
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            ..Default::default()
        };

        let outcome = LinkFlow::new(&app).run(&params, None).await;

        assert!(matches!(
            outcome,
            FlowOutcome::Failed(LinkError::AuthorizationDenied { .. })
        ));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_exchange_failure() {
        let store = MemoryCredentialStore::new("tokens/");
        let app = app(StateMode::Verifier, Arc::new(store.clone()));
        let params = CallbackParams {
            code: Some("abc".to_string()),
            state: Some(PkcePair::generate().verifier),
            ..Default::default()
        };

        let outcome = LinkFlow::new(&app).run(&params, None).await;

        assert!(matches!(
            outcome,
            FlowOutcome::Failed(LinkError::TokenExchangeFailed { status: None, .. })
        ));
        assert_eq!(store.put_count(), 0);
    }

    fn impatient_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    fn verifier_callback() -> CallbackParams {
        CallbackParams {
            code: Some("abc".to_string()),
            state: Some(PkcePair::generate().verifier),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_slow_token_endpoint_is_exchange_failure() {
        let provider = MockProvider::new("U123");
        provider.seed_code("abc", Grant::for_user("U123", "A", "R"));
        provider.set_token_delay(Duration::from_secs(2));
        let base = spawn(provider.router()).await.unwrap();

        let mut cfg = config(StateMode::Verifier);
        cfg.provider.token_endpoint = format!("{base}/oauth2/token");
        let store = MemoryCredentialStore::new("tokens/");
        let app = AppState::new(cfg, Key::generate(), impatient_client(), Arc::new(store.clone()));

        let outcome = LinkFlow::new(&app).run(&verifier_callback(), None).await;

        assert!(matches!(
            outcome,
            FlowOutcome::Failed(LinkError::TokenExchangeFailed { status: None, .. })
        ));
        assert_eq!(provider.token_requests(), 1);
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_object_store_is_persistence_failure() {
        let provider = MockProvider::new("U123");
        provider.seed_code("abc", Grant::for_user("U123", "A", "R"));
        let provider_base = spawn(provider.router()).await.unwrap();
        let objects = MockObjectStore::new();
        objects.set_delay(Duration::from_secs(2));
        let objects_base = spawn(objects.router()).await.unwrap();

        let mut cfg = config(StateMode::Verifier);
        cfg.provider.token_endpoint = format!("{provider_base}/oauth2/token");
        let http = impatient_client();
        let s3 = S3Config {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: SecretString::new("secret".to_string()),
            region: "us-east-2".to_string(),
            bucket: "study-bucket".to_string(),
            endpoint: Some(objects_base),
        };
        let store = S3CredentialStore::new(http.clone(), &s3, "tokens/".to_string());
        let app = AppState::new(cfg, Key::generate(), http, Arc::new(store));

        let outcome = LinkFlow::new(&app).run(&verifier_callback(), None).await;

        match outcome {
            FlowOutcome::Done {
                user_id,
                persist_error: Some(LinkError::PersistenceFailed(StoreError::Request(err))),
            } => {
                assert_eq!(user_id, "U123");
                assert!(err.is_timeout());
            }
            other => panic!("expected a timed out write, got {other:?}"),
        }
        assert_eq!(objects.put_count(), 1);
    }
}
