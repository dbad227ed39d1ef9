use axum::{
    extract::{RawQuery, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use color_eyre::eyre::WrapErr as _;
use maud::html;
use tower_cookies::CookieManagerLayer;

use crate::{
    components::{
        debug_panel::DebugPanel,
        layout::{Card, Page},
        ui::{
            alert::Alert,
            button::{Button, ButtonSize},
            heading::Heading,
        },
    },
    cookies::CookieJar,
    errors::{ServerResult, WithStatus as _},
    flow::{FlowOutcome, LinkFlow},
    oauth::CallbackParams,
    state::{AppState, StateMode},
};

/// Build the application router
pub fn routes(app_state: AppState) -> axum::Router {
    let redirect_path = app_state.config.provider.redirect_path();

    let mut router = axum::Router::new()
        .route("/", get(link_page))
        .route("/healthz", get(healthz));

    // The provider sends participants back to the registered redirect URI
    if redirect_path != "/" {
        router = router.route(&redirect_path, get(link_page));
    }

    router
        .layer(CookieManagerLayer::new())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(sentry_tower::SentryHttpLayer::with_transaction())
        .layer(sentry_tower::NewSentryLayer::<Request>::new_from_top())
        .with_state(app_state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Both steps of the linking page. Without a `code` this shows the connect link;
/// with one it finishes the exchange and reports the result.
async fn link_page(
    State(state): State<AppState>,
    cookies: CookieJar,
    RawQuery(query): RawQuery,
) -> ServerResult<Response, StatusCode> {
    let params = CallbackParams::from_query(query.as_deref())
        .wrap_err("Malformed query string")
        .with_status(StatusCode::BAD_REQUEST)?;

    let session_state = cookies.link_state();
    let outcome = LinkFlow::new(&state)
        .run(&params, session_state.as_deref())
        .await;

    match &outcome {
        FlowOutcome::AwaitingCallback(authorization) => {
            cookies.remember_link_state(&authorization.state);
        }
        FlowOutcome::Done { .. } | FlowOutcome::Failed(_) => cookies.forget_link_state(),
    }

    let status = match &outcome {
        FlowOutcome::Failed(err) => err.status(),
        FlowOutcome::AwaitingCallback(_) | FlowOutcome::Done { .. } => StatusCode::OK,
    };

    let page = render_outcome(&state, &outcome);

    Ok((status, [(header::CACHE_CONTROL, "no-store")], page).into_response())
}

fn render_outcome(state: &AppState, outcome: &FlowOutcome) -> Page {
    let debug = DebugPanel::new()
        .entry("version", state.version())
        .entry(
            "state mode",
            match state.config.state_mode {
                StateMode::Server => "server",
                StateMode::Verifier => "verifier",
            },
        )
        .entry("storage", state.store.location());

    let (title, body, debug) = match outcome {
        FlowOutcome::AwaitingCallback(authorization) => (
            "Connect your Fitbit",
            html! {
                (Heading::h1("Connect your Fitbit"))
                p class="text-gray-600 mb-6" {
                    "To take part in the study we need permission to read your Fitbit data. "
                    "You'll be sent to Fitbit to sign in and approve access, then brought back here."
                }
                (Button::primary("Connect with Fitbit", &authorization.url)
                    .size(ButtonSize::Large)
                    .full_width(true))
            },
            debug
                .entry("stage", "awaiting callback")
                .entry("pending authorizations", state.pending.len().to_string()),
        ),
        FlowOutcome::Done {
            user_id,
            persist_error,
        } => (
            "Fitbit connected",
            html! {
                (Heading::h1("You're all set").with_color("text-green-700"))
                @if let Some(err) = persist_error {
                    div class="mb-4" {
                        (Alert::error(err.user_message()))
                    }
                }
                (Alert::success("Your Fitbit account is connected to the study. You can close this page."))
            },
            debug
                .entry("stage", "done")
                .entry("user id", user_id.clone())
                .entry(
                    "persistence",
                    match persist_error {
                        Some(err) => err.developer_detail(),
                        None => "stored".to_string(),
                    },
                ),
        ),
        FlowOutcome::Failed(err) => (
            "Connection failed",
            html! {
                (Heading::h1("Something went wrong").with_color("text-red-700"))
                (Alert::error(err.user_message()))
                div class="mt-6" {
                    (Button::secondary("Start over", "/").full_width(true))
                }
            },
            debug
                .entry("stage", "failed")
                .entry("error", err.to_string())
                .entry("detail", err.developer_detail()),
        ),
    };

    let development_mode = state.development_mode();
    Page::new(
        title,
        Card::new(html! {
            div class="text-center" {
                (body)
                @if development_mode {
                    (debug)
                }
            }
        }),
    )
}
