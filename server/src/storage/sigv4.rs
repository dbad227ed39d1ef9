//! AWS Signature Version 4 for single S3 requests

use chrono::{DateTime, Utc};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode an object key for the canonical URI. `/` separates segments and is kept.
pub fn encode_key_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct Credentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
}

/// The parts of a request that go into the signature
pub struct SignableRequest<'a> {
    pub method: &'a str,
    /// Already percent-encoded path, starting with `/`
    pub canonical_uri: &'a str,
    /// Header names must be lowercase
    pub headers: Vec<(&'a str, String)>,
    pub payload_hash: &'a str,
}

impl SignableRequest<'_> {
    fn sorted_headers(&self) -> Vec<(&str, &str)> {
        let mut headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| (*name, value.trim()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        headers
    }

    pub fn signed_headers(&self) -> String {
        self.sorted_headers()
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn canonical_request(&self) -> String {
        let canonical_headers: String = self
            .sorted_headers()
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        [
            self.method,
            self.canonical_uri,
            "",
            &canonical_headers,
            &self.signed_headers(),
            self.payload_hash,
        ]
        .join("\n")
    }
}

/// Compute the `Authorization` header value for `request` at `now`
pub fn authorization_header(
    credentials: &Credentials<'_>,
    request: &SignableRequest<'_>,
    now: DateTime<Utc>,
) -> Result<String, InvalidLength> {
    let amz_date = amz_date(now);
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/s3/aws4_request", credentials.region);

    let string_to_sign = [
        ALGORITHM,
        &amz_date,
        &scope,
        &sha256_hex(request.canonical_request().as_bytes()),
    ]
    .join("\n");

    let mut signing_key = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        &date,
    )?;
    for part in [credentials.region, "s3", "aws4_request"] {
        signing_key = hmac_sha256(&signing_key, part)?;
    }
    let signature = hex::encode(hmac_sha256(&signing_key, &string_to_sign)?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
        credentials.access_key_id,
        request.signed_headers(),
    ))
}

/// `x-amz-date` header value
pub fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}
