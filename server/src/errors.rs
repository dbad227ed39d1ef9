use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::StoreError;

/// Everything that can end a linking attempt early.
///
/// Each variant carries a participant-facing message (`user_message`) and a
/// developer-facing detail (`developer_detail`). Only the former is ever shown
/// by default.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("PKCE verifier could not be recovered from the callback")]
    VerificationLost,

    #[error("provider returned an authorization error: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("token exchange failed (status {status:?})")]
    TokenExchangeFailed {
        /// `None` when no HTTP response arrived (timeout, connection error)
        status: Option<StatusCode>,
        body: String,
    },

    #[error("token response did not include a user_id")]
    MissingUserIdentifier,

    #[error("failed to persist credentials: {0}")]
    PersistenceFailed(#[source] StoreError),
}

impl LinkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LinkError::VerificationLost => {
                "Something went wrong while verifying your connection. \
                 Please go back to the start page and try connecting again."
            }
            LinkError::AuthorizationDenied { .. } => {
                "The connection was not approved. \
                 If you want to take part, please start again and allow access."
            }
            LinkError::TokenExchangeFailed { .. } => {
                "We couldn't finish connecting to Fitbit. \
                 Please try again. If this keeps happening, contact the study team."
            }
            LinkError::MissingUserIdentifier => {
                "We were not able to complete the connection to your Fitbit account. \
                 Please try again, and if the issue continues, contact the study team."
            }
            LinkError::PersistenceFailed(_) => {
                "We couldn't save your Fitbit connection to our secure storage. \
                 Please try again later or contact the study team."
            }
        }
    }

    /// Raw detail for the developer channel. Never contains token material.
    pub fn developer_detail(&self) -> String {
        match self {
            LinkError::VerificationLost => {
                "No verifier found in the state parameter or the session cookie".to_string()
            }
            LinkError::AuthorizationDenied { error, description } => format!(
                "error={error} description={}",
                description.as_deref().unwrap_or("<none>")
            ),
            LinkError::TokenExchangeFailed { status, body } => match status {
                Some(status) => format!("Token endpoint responded {status}: {body}"),
                None => format!("Token request failed before a response arrived: {body}"),
            },
            LinkError::MissingUserIdentifier => {
                "No user_id found in token response; cannot save credentials".to_string()
            }
            LinkError::PersistenceFailed(err) => format!("Object store error: {err}"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LinkError::VerificationLost | LinkError::AuthorizationDenied { .. } => {
                StatusCode::BAD_REQUEST
            }
            LinkError::TokenExchangeFailed { .. } | LinkError::MissingUserIdentifier => {
                StatusCode::BAD_GATEWAY
            }
            LinkError::PersistenceFailed(_) => StatusCode::OK,
        }
    }
}

#[derive(Debug)]
pub struct ServerError<R: IntoResponse>(pub(crate) color_eyre::Report, pub(crate) R);

pub type ServerResult<S, F = Response> = Result<S, ServerError<F>>;

impl<R: IntoResponse> IntoResponse for ServerError<R> {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = ?self.0, "Request Error");

        self.1.into_response()
    }
}

impl<E> From<E> for ServerError<StatusCode>
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        ServerError(err.into(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub(crate) trait WithStatus<T> {
    fn with_status(self, status: StatusCode) -> Result<T, ServerError<StatusCode>>;
}

impl<T> WithStatus<T> for Result<T, color_eyre::Report> {
    fn with_status(self, status: StatusCode) -> Result<T, ServerError<StatusCode>> {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(ServerError(err, status)),
        }
    }
}
