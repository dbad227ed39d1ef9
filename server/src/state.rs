use std::{str::FromStr, sync::Arc, time::Duration};

use secrecy::SecretString;
use tower_cookies::Key;

use crate::{
    oauth::{pending::DEFAULT_MAX_PENDING, PendingAuthorizations, TokenClient},
    storage::{CredentialStore, MemoryCredentialStore, S3CredentialStore},
};

pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://www.fitbit.com/oauth2/authorize";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://api.fitbit.com/oauth2/token";

/// Every data type the study pipelines read.
pub const DEFAULT_SCOPES: &str = "activity heartrate location nutrition profile settings sleep social weight \
     respiratory_rate temperature oxygen_saturation cardio_fitness \
     electrocardiogram irregular_rhythm_notifications";

pub const DEFAULT_BUCKET: &str = "fitbit-study-tokens-stored";
pub const DEFAULT_TOKEN_PREFIX: &str = "tokens/";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where the provider lives and how this app is registered with it
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub client_id: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    /// Path component of the redirect URI, used to mount the callback route
    pub fn redirect_path(&self) -> String {
        match reqwest::Url::parse(&self.redirect_uri) {
            Ok(url) => url.path().to_string(),
            Err(_) => "/".to_string(),
        }
    }

    pub fn redirect_is_https(&self) -> bool {
        self.redirect_uri.starts_with("https://")
    }
}

/// How the PKCE verifier survives the trip through the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateMode {
    /// `state` is an opaque token; the verifier stays in server memory
    Server,
    /// `state` is the verifier itself
    Verifier,
}

impl FromStr for StateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(StateMode::Server),
            "verifier" => Ok(StateMode::Verifier),
            other => Err(format!("expected `server` or `verifier`, got `{other}`")),
        }
    }
}

#[derive(Debug)]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub region: String,
    pub bucket: String,
    /// Custom endpoint (MinIO, local fixtures). Switches to path-style addressing.
    pub endpoint: Option<String>,
}

#[derive(Debug)]
pub enum StorageBackend {
    S3(S3Config),
    Memory,
}

#[derive(Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub development_mode: bool,
    pub cookie_key: Option<String>,
}

/// Process-wide configuration, loaded once at startup
#[derive(Debug)]
pub struct Config {
    pub provider: ProviderConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub state_mode: StateMode,
    pub state_ttl: Duration,
    /// Most pending authorizations held at once in server state mode
    pub max_pending: usize,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let scopes = get("FITBIT_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.to_string());
        let provider = ProviderConfig {
            client_id: require("FITBIT_CLIENT_ID")?,
            authorize_endpoint: get("FITBIT_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_ENDPOINT.to_string()),
            token_endpoint: get("FITBIT_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
            redirect_uri: require("REDIRECT_URI")?,
            scopes: scopes.split_whitespace().map(str::to_string).collect(),
        };

        if reqwest::Url::parse(&provider.redirect_uri).is_err() {
            return Err(ConfigError::Invalid {
                name: "REDIRECT_URI",
                reason: "not an absolute URL".to_string(),
            });
        }

        let backend = match get("STORAGE_BACKEND")
            .unwrap_or_else(|| "s3".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3(S3Config {
                access_key_id: require("AWS_ACCESS_KEY_ID")?,
                secret_access_key: SecretString::new(require("AWS_SECRET_ACCESS_KEY")?),
                region: require("AWS_REGION")?,
                bucket: get("S3_BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                endpoint: get("S3_ENDPOINT").map(|e| e.trim_end_matches('/').to_string()),
            }),
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    reason: format!("expected `s3` or `memory`, got `{other}`"),
                })
            }
        };

        let storage = StorageConfig {
            backend,
            key_prefix: get("S3_TOKEN_PREFIX").unwrap_or_else(|| DEFAULT_TOKEN_PREFIX.to_string()),
        };

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 3000)?,
            development_mode: get("DEVELOPMENT_MODE").is_some_and(|v| v == "1"),
            cookie_key: get("COOKIE_KEY"),
        };

        let state_mode = match get("STATE_MODE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "STATE_MODE",
                reason,
            })?,
            None => StateMode::Server,
        };

        Ok(Self {
            provider,
            storage,
            server,
            state_mode,
            state_ttl: Duration::from_secs(parse_or("STATE_TTL_SECS", get("STATE_TTL_SECS"), 600)?),
            max_pending: parse_or(
                "STATE_MAX_PENDING",
                get("STATE_MAX_PENDING"),
                DEFAULT_MAX_PENDING,
            )?,
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                10,
            )?),
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cookie_key: Key,
    pub pending: PendingAuthorizations,
    pub tokens: TokenClient,
    pub store: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn from_config(config: Config) -> color_eyre::Result<Self> {
        use color_eyre::eyre::WrapErr as _;

        let http = reqwest::ClientBuilder::new()
            .timeout(config.http_timeout)
            .use_rustls_tls()
            .build()
            .wrap_err("Failed to build HTTP client")?;

        let cookie_key = match &config.server.cookie_key {
            Some(encoded) => {
                let bytes = base64::Engine::decode(
                    &base64::engine::general_purpose::STANDARD,
                    encoded,
                )
                .wrap_err("COOKIE_KEY is not valid base64")?;
                Key::try_from(bytes.as_slice()).wrap_err("COOKIE_KEY must be at least 64 bytes")?
            }
            None => {
                tracing::warn!("COOKIE_KEY not set, generating a key for this process only");
                Key::generate()
            }
        };

        let store: Arc<dyn CredentialStore> = match &config.storage.backend {
            StorageBackend::S3(s3) => Arc::new(S3CredentialStore::new(
                http.clone(),
                s3,
                config.storage.key_prefix.clone(),
            )),
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory credential storage; tokens will not survive a restart");
                Arc::new(MemoryCredentialStore::new(config.storage.key_prefix.clone()))
            }
        };

        Ok(Self::new(config, cookie_key, http, store))
    }

    /// Assemble the state from already-built parts
    pub fn new(
        config: Config,
        cookie_key: Key,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let tokens = TokenClient::new(http, config.provider.clone());
        let pending = PendingAuthorizations::with_limit(config.state_ttl, config.max_pending);

        Self {
            config: Arc::new(config),
            cookie_key,
            pending,
            tokens,
            store,
        }
    }

    pub fn development_mode(&self) -> bool {
        self.config.server.development_mode
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("FITBIT_CLIENT_ID", "23ABCD"),
        ("REDIRECT_URI", "https://link.example.org/"),
        ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("AWS_REGION", "us-east-2"),
    ];

    #[test]
    fn test_defaults_are_applied() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();

        assert_eq!(config.provider.authorize_endpoint, DEFAULT_AUTHORIZE_ENDPOINT);
        assert_eq!(config.provider.token_endpoint, DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(config.provider.scopes.len(), 15);
        assert_eq!(config.provider.scopes[0], "activity");
        assert_eq!(config.storage.key_prefix, "tokens/");
        assert_eq!(config.state_mode, StateMode::Server);
        assert_eq!(config.state_ttl, Duration::from_secs(600));
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(!config.server.development_mode);

        match config.storage.backend {
            StorageBackend::S3(s3) => {
                assert_eq!(s3.bucket, DEFAULT_BUCKET);
                assert_eq!(s3.region, "us-east-2");
                assert!(s3.endpoint.is_none());
            }
            StorageBackend::Memory => panic!("expected the S3 backend"),
        }
    }

    #[test]
    fn test_missing_client_id_is_reported_by_name() {
        let err = Config::from_lookup(lookup(&[("REDIRECT_URI", "https://x.test/")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("FITBIT_CLIENT_ID")));
    }

    #[test]
    fn test_memory_backend_needs_no_aws_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("FITBIT_CLIENT_ID", "23ABCD"),
            ("REDIRECT_URI", "http://localhost:3000/callback"),
            ("STORAGE_BACKEND", "memory"),
        ]))
        .unwrap();

        assert!(matches!(config.storage.backend, StorageBackend::Memory));
        assert_eq!(config.provider.redirect_path(), "/callback");
        assert!(!config.provider.redirect_is_https());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("STATE_MODE", "cookie"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)).unwrap_err(),
            ConfigError::Invalid { name: "STATE_MODE", .. }
        ));

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("HTTP_TIMEOUT_SECS", "ten"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)).unwrap_err(),
            ConfigError::Invalid { name: "HTTP_TIMEOUT_SECS", .. }
        ));
    }

    #[test]
    fn test_pending_limit_is_configurable() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("STATE_MAX_PENDING", "250"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.max_pending, 250);

        let mut pairs = MINIMAL.to_vec();
        pairs.push(("STATE_MAX_PENDING", "-1"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)).unwrap_err(),
            ConfigError::Invalid { name: "STATE_MAX_PENDING", .. }
        ));
    }

    #[test]
    fn test_secret_is_not_printed() {
        let config = Config::from_lookup(lookup(MINIMAL)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("\"secret\""));
    }
}
