use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse as _, Response},
};
use tower_cookies::{cookie::SameSite, Cookie};
use tracing::error;

use crate::state::AppState;

/// Private cookie carrying the `state` value between the link and the callback
pub const LINK_STATE_COOKIE: &str = "tracker_link_state";

const LINK_STATE_MAX_AGE: time::Duration = time::Duration::minutes(10);

/// Encrypted cookies keyed with the process cookie key
pub struct CookieJar {
    cookies: tower_cookies::Cookies,
    state: AppState,
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for CookieJar {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = match tower_cookies::Cookies::from_request_parts(parts, state).await {
            Ok(cookies) => cookies,
            Err(_) => {
                error!("Failed to extract cookies from request");
                return Err(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }
        };

        Ok(CookieJar {
            cookies,
            state: state.clone(),
        })
    }
}

impl CookieJar {
    pub fn add(&self, cookie: Cookie<'static>) {
        self.cookies.private(&self.state.cookie_key).add(cookie);
    }

    pub fn get(&self, name: &str) -> Option<Cookie<'static>> {
        self.cookies.private(&self.state.cookie_key).get(name)
    }

    pub fn remove(&self, cookie: Cookie<'static>) {
        self.cookies.private(&self.state.cookie_key).remove(cookie);
    }

    /// State value remembered from the participant's last visit to the link page
    pub fn link_state(&self) -> Option<String> {
        self.get(LINK_STATE_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn remember_link_state(&self, value: &str) {
        let cookie = Cookie::build((LINK_STATE_COOKIE, value.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.state.config.provider.redirect_is_https())
            .max_age(LINK_STATE_MAX_AGE)
            .build();

        self.add(cookie);
    }

    pub fn forget_link_state(&self) {
        self.remove(Cookie::build((LINK_STATE_COOKIE, "")).path("/").build());
    }
}
