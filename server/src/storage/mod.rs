//! Durable storage for linked participant credentials.
//!
//! One object per provider user id, overwritten on every successful link.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::oauth::TokenResponse;

mod memory;
mod s3;
pub mod sigv4;

pub use memory::MemoryCredentialStore;
pub use s3::S3CredentialStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user id {0:?} cannot be used as an object key")]
    InvalidKey(String),

    #[error("failed to serialize credential record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("object store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("object store rejected the write with {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// What gets written for each participant. Field order is the JSON field order.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: String,
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl From<&TokenResponse> for StoredCredential {
    fn from(tokens: &TokenResponse) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            user_id: tokens.user_id.clone(),
        }
    }
}

impl StoredCredential {
    pub fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// `{prefix}{user_id}.json`, refusing ids that would escape the prefix
pub fn object_key(prefix: &str, user_id: &str) -> Result<String, StoreError> {
    let usable = !user_id.is_empty()
        && user_id != "."
        && user_id != ".."
        && !user_id.contains(['/', '\\'])
        && !user_id.chars().any(char::is_control);

    if !usable {
        return Err(StoreError::InvalidKey(user_id.to_string()));
    }

    Ok(format!("{prefix}{user_id}.json"))
}

/// A place to put credential records.
///
/// `save` is a blind overwrite: no read-before-write and no version check.
/// Concurrent saves for the same user race and the last one to land wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, record: &StoredCredential) -> Result<(), StoreError>;

    /// Short human-readable location, e.g. `s3://bucket/tokens/`
    fn location(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        assert_eq!(object_key("tokens/", "U123").unwrap(), "tokens/U123.json");
        assert_eq!(object_key("", "U123").unwrap(), "U123.json");
    }

    #[test]
    fn test_object_key_rejects_path_tricks() {
        for bad in ["", ".", "..", "../U123", "a/b", "a\\b", "line\nbreak"] {
            assert!(
                matches!(object_key("tokens/", bad), Err(StoreError::InvalidKey(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_record_json_shape() {
        let record = StoredCredential {
            access_token: "A".to_string(),
            refresh_token: Some("R".to_string()),
            user_id: "U123".to_string(),
        };

        assert_eq!(
            String::from_utf8(record.to_json().unwrap()).unwrap(),
            r#"{"access_token":"A","refresh_token":"R","user_id":"U123"}"#
        );
        assert!(!format!("{record:?}").contains("\"A\""));
    }
}
