use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};

use super::{
    object_key,
    sigv4::{self, Credentials, SignableRequest},
    CredentialStore, StoreError, StoredCredential,
};
use crate::state::S3Config;

/// Writes credential records to an S3 bucket with a single signed PUT
pub struct S3CredentialStore {
    http: reqwest::Client,
    access_key_id: String,
    secret_access_key: SecretString,
    region: String,
    bucket: String,
    endpoint: Option<String>,
    prefix: String,
}

/// Where a given object lives on the wire
#[derive(Debug, PartialEq, Eq)]
struct ObjectTarget {
    url: String,
    host: String,
    canonical_uri: String,
}

impl S3CredentialStore {
    pub fn new(http: reqwest::Client, config: &S3Config, prefix: String) -> Self {
        Self {
            http,
            access_key_id: config.access_key_id.clone(),
            secret_access_key: SecretString::new(config.secret_access_key.expose_secret().clone()),
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
            prefix,
        }
    }

    /// Virtual-hosted addressing on AWS, path-style on a custom endpoint
    fn target(&self, key: &str) -> Result<ObjectTarget, StoreError> {
        let encoded_key = sigv4::encode_key_path(key);

        match &self.endpoint {
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.bucket, self.region);
                Ok(ObjectTarget {
                    url: format!("https://{host}/{encoded_key}"),
                    host,
                    canonical_uri: format!("/{encoded_key}"),
                })
            }
            Some(endpoint) => {
                let parsed = reqwest::Url::parse(endpoint)
                    .map_err(|e| StoreError::Signing(format!("invalid S3 endpoint: {e}")))?;
                let host = match (parsed.host_str(), parsed.port()) {
                    (Some(host), Some(port)) => format!("{host}:{port}"),
                    (Some(host), None) => host.to_string(),
                    (None, _) => {
                        return Err(StoreError::Signing(
                            "S3 endpoint has no host".to_string(),
                        ))
                    }
                };
                let canonical_uri = format!("/{}/{encoded_key}", self.bucket);
                Ok(ObjectTarget {
                    url: format!("{}://{host}{canonical_uri}", parsed.scheme()),
                    host,
                    canonical_uri,
                })
            }
        }
    }
}

#[async_trait]
impl CredentialStore for S3CredentialStore {
    #[tracing::instrument(skip_all, fields(bucket = %self.bucket, user_id = %record.user_id))]
    async fn save(&self, record: &StoredCredential) -> Result<(), StoreError> {
        let key = object_key(&self.prefix, &record.user_id)?;
        let target = self.target(&key)?;
        let body = record.to_json()?;
        let payload_hash = sigv4::sha256_hex(&body);
        let now = Utc::now();
        let amz_date = sigv4::amz_date(now);
        let content_type = mime::APPLICATION_JSON.to_string();

        let signable = SignableRequest {
            method: "PUT",
            canonical_uri: &target.canonical_uri,
            headers: vec![
                ("content-type", content_type.clone()),
                ("host", target.host.clone()),
                ("x-amz-content-sha256", payload_hash.clone()),
                ("x-amz-date", amz_date.clone()),
            ],
            payload_hash: &payload_hash,
        };
        let credentials = Credentials {
            access_key_id: &self.access_key_id,
            secret_access_key: self.secret_access_key.expose_secret(),
            region: &self.region,
        };
        let authorization = sigv4::authorization_header(&credentials, &signable, now)
            .map_err(|e| StoreError::Signing(e.to_string()))?;

        let response = self
            .http
            .put(&target.url)
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(StoreError::Rejected { status, body });
        }

        tracing::info!(%key, "Stored credential record");
        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}
