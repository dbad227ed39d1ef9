use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes behind each verifier. 64 bytes encode to 86 characters.
const VERIFIER_ENTROPY_BYTES: usize = 64;

const MIN_VERIFIER_LEN: usize = 43;
const MAX_VERIFIER_LEN: usize = 128;

/// Helper function to create URL-safe base64 encoding without padding
pub fn base64_url_encode(input: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(input)
}

/// A PKCE code verifier and its S256 challenge.
///
/// The verifier only ever leaves this process in the token request body (or in
/// `state` when running in verifier mode), so `Debug` keeps it out of logs.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = derive_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Generate a random code verifier (between 43 and 128 characters)
pub fn generate_verifier() -> String {
    let mut code_verifier_bytes = [0u8; VERIFIER_ENTROPY_BYTES];
    thread_rng().fill_bytes(&mut code_verifier_bytes);

    base64_url_encode(&code_verifier_bytes)
}

/// S256 code challenge: base64url(sha256(verifier)), unpadded
pub fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64_url_encode(&hasher.finalize())
}

/// Whether `candidate` has the shape RFC 7636 allows for a verifier
pub fn is_valid_verifier(candidate: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&candidate.len())
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
