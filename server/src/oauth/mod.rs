//! OAuth2 authorization-code flow with PKCE against the tracker provider.

pub mod authorize;
pub mod callback;
pub mod pending;
pub mod pkce;
pub mod token;

pub use authorize::AuthorizationRequest;
pub use callback::CallbackParams;
pub use pending::PendingAuthorizations;
pub use pkce::{derive_challenge, generate_verifier, PkcePair};
pub use token::{TokenClient, TokenResponse};
