use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::handlers::{auth, health};

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated spec. Routes added outside (like `/`) are
/// intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::issue_token))
        .routes(routes!(auth::confirm_token))
        .routes(routes!(auth::two_factor_send))
        .routes(routes!(auth::two_factor_verify))
        .routes(routes!(auth::login))
        .routes(routes!(auth::request_password_reset))
        .routes(routes!(auth::reset_password))
        .routes(routes!(auth::lock_account))
        .routes(routes!(auth::unlock_account))
        .routes(routes!(auth::session))
        .routes(routes!(auth::logout))
}

/// Expose the generated `OpenAPI` document without serving.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Operator authentication and session security".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![auth_tag]))
        .build()
}
