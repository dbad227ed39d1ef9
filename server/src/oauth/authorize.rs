use crate::state::ProviderConfig;

/// One round-trip to the provider's consent screen
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub challenge: &'a str,
    pub state: &'a str,
}

impl<'a> AuthorizationRequest<'a> {
    pub fn new(provider: &'a ProviderConfig, challenge: &'a str, state: &'a str) -> Self {
        Self {
            client_id: &provider.client_id,
            redirect_uri: &provider.redirect_uri,
            scopes: &provider.scopes,
            challenge,
            state,
        }
    }

    /// Scopes joined by spaces, first occurrence wins
    pub fn scope_param(&self) -> String {
        let mut seen = Vec::with_capacity(self.scopes.len());
        for scope in self.scopes {
            if !seen.contains(&scope.as_str()) {
                seen.push(scope.as_str());
            }
        }
        seen.join(" ")
    }

    /// Build the URL the participant follows to grant access
    pub fn url(&self, authorize_endpoint: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}",
            authorize_endpoint,
            urlencoding::encode(self.client_id),
            urlencoding::encode(self.redirect_uri),
            urlencoding::encode(&self.scope_param()),
            self.challenge,
            urlencoding::encode(self.state),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            client_id: "23ABCD".to_string(),
            authorize_endpoint: "https://www.fitbit.com/oauth2/authorize".to_string(),
            token_endpoint: "https://api.fitbit.com/oauth2/token".to_string(),
            redirect_uri: "https://link.example.org/".to_string(),
            scopes: vec![
                "activity".to_string(),
                "sleep".to_string(),
                "activity".to_string(),
                "heartrate".to_string(),
            ],
        }
    }

    fn query_pairs(url: &str) -> Vec<(String, String)> {
        reqwest::Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_url_has_expected_shape() {
        let provider = provider();
        let request = AuthorizationRequest::new(&provider, "CHALLENGE", "opaque-state");
        let url = request.url(&provider.authorize_endpoint);

        assert_eq!(
            url,
            "https://www.fitbit.com/oauth2/authorize?response_type=code&client_id=23ABCD\
             &redirect_uri=https%3A%2F%2Flink.example.org%2F&scope=activity%20sleep%20heartrate\
             &code_challenge=CHALLENGE&code_challenge_method=S256&state=opaque-state"
        );
    }

    #[test]
    fn test_exactly_one_challenge_method() {
        let provider = provider();
        let url = AuthorizationRequest::new(&provider, "c", "s").url(&provider.authorize_endpoint);
        assert_eq!(url.matches("code_challenge_method=S256").count(), 1);
    }

    #[test]
    fn test_state_survives_encoding() {
        let provider = provider();
        let state = "a+b/c=d&e";
        let url = AuthorizationRequest::new(&provider, "c", state).url(&provider.authorize_endpoint);

        let pairs = query_pairs(&url);
        let decoded = pairs.iter().find(|(k, _)| k == "state").map(|(_, v)| v.as_str());
        assert_eq!(decoded, Some(state));
    }

    #[test]
    fn test_scopes_are_deduplicated_in_order() {
        let provider = provider();
        let request = AuthorizationRequest::new(&provider, "c", "s");
        assert_eq!(request.scope_param(), "activity sleep heartrate");
    }
}
