use achievements_shared::handlers::{achievements, users};
use achievements_shared::response;
use achievements_shared::types::{Principal, UserQuery};
use achievements_shared::AppState;
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use std::sync::Arc;

/// Main Lambda handler - resolves the caller and routes to achievement or user endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("API Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return response::preflight();
    }

    let parts = route_segments(path);

    if matches!(parts.as_slice(), ["health"]) {
        return response::success(
            StatusCode::OK,
            "ok",
            &serde_json::json!({ "backend": format!("{:?}", state.config.backend) }),
        );
    }

    let Some(principal) = resolve_principal(&event) else {
        tracing::warn!("Rejected {} {}: no principal", method, path);
        return response::error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid credentials",
        );
    };

    if requires_admin(&parts) && !principal.is_admin() {
        tracing::warn!("Principal {} is not allowed on {}", principal.id, path);
        return response::error_response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Administrator role required",
        );
    }

    let workflow = &state.achievements;
    let directory = &state.users;

    match (method, parts.as_slice()) {
        // --- ACHIEVEMENTS ---
        (&Method::GET, ["achievements"]) => {
            achievements::list_achievements(workflow, &principal).await
        }
        (&Method::POST, ["achievements"]) => {
            achievements::create_achievement(workflow, &principal, body).await
        }
        (&Method::GET, ["achievements", id]) => {
            achievements::get_achievement(workflow, &principal, id).await
        }
        (&Method::PUT, ["achievements", id]) => {
            achievements::update_achievement(workflow, &principal, id, body).await
        }
        (&Method::DELETE, ["achievements", id]) => {
            achievements::delete_achievement(workflow, &principal, id).await
        }
        (&Method::POST, ["achievements", id, "submit"]) => {
            achievements::submit_achievement(workflow, &principal, id, body).await
        }
        (&Method::POST, ["achievements", id, "reconcile"]) => {
            achievements::reconcile_achievement(workflow, id).await
        }

        // --- USERS (admin) ---
        (&Method::GET, ["users"]) => {
            let params = event.query_string_parameters_ref();
            let param = |name: &str| params.and_then(|p| p.first(name));
            let query = UserQuery::from_params(
                param("page"),
                param("limit"),
                param("sort_by").or_else(|| param("sortBy")),
                param("order"),
                param("search"),
            );
            users::list_users(directory, query).await
        }
        (&Method::POST, ["users"]) => users::create_user(directory, body).await,
        (&Method::GET, ["users", id]) => users::get_user(directory, id).await,
        (&Method::PUT, ["users", id]) => users::update_user(directory, id, body).await,
        (&Method::DELETE, ["users", id]) => users::delete_user(directory, id).await,
        (&Method::PUT, ["users", id, "role"]) => users::assign_role(directory, id, body).await,

        _ => response::not_found(),
    }
}

/// Path segments with an optional `/api` or `/api/v1` prefix removed.
fn route_segments(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.first() == Some(&"api") {
        parts.remove(0);
        if parts.first() == Some(&"v1") {
            parts.remove(0);
        }
    }
    parts
}

fn requires_admin(parts: &[&str]) -> bool {
    matches!(parts, ["users", ..] | ["achievements", _, "reconcile"])
}

/// Caller identity from the JWT authorizer claims (HTTP API passes them in the request
/// context). In local development, `X-User-Id` / `X-User-Role` headers stand in for them.
fn resolve_principal(event: &Request) -> Option<Principal> {
    let claims = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .map(|jwt| &jwt.claims);

    let header = |name: &str| {
        event
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    let id = claims
        .and_then(|c| c.get("sub"))
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| header("X-User-Id"))?;
    let role = claims
        .and_then(|c| c.get("custom:role"))
        .cloned()
        .or_else(|| header("X-User-Role"))
        .unwrap_or_default();

    Some(Principal::new(id, role))
}
