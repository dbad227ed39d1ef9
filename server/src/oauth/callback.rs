use crate::state::StateMode;

use super::{pkce::is_valid_verifier, PendingAuthorizations};

/// Query parameters the provider sends back to the redirect URI
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string.
    ///
    /// Repeated keys (`code=a&code=b`) and bracketed array keys (`code[]=a`)
    /// both resolve to their first value. Empty values count as missing.
    pub fn from_query(raw: Option<&str>) -> Result<Self, serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = match raw {
            Some(raw) => serde_urlencoded::from_str(raw)?,
            None => Vec::new(),
        };

        let first = |name: &str| {
            pairs
                .iter()
                .find(|(key, value)| key.trim_end_matches("[]") == name && !value.is_empty())
                .map(|(_, value)| value.clone())
        };

        Ok(Self {
            code: first("code"),
            state: first("state"),
            error: first("error"),
            error_description: first("error_description"),
        })
    }

    /// Find the PKCE verifier for this callback.
    ///
    /// The `state` query value is tried first, then the state remembered in the
    /// participant's session cookie.
    pub fn recover_verifier(
        &self,
        session_state: Option<&str>,
        mode: StateMode,
        pending: &PendingAuthorizations,
    ) -> Option<String> {
        [self.state.as_deref(), session_state]
            .into_iter()
            .flatten()
            .find_map(|candidate| match mode {
                StateMode::Server => pending.take(candidate),
                StateMode::Verifier => {
                    is_valid_verifier(candidate).then(|| candidate.to_string())
                }
            })
    }
}
