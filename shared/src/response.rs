//! JSON envelope shaping for API responses: `{status, message, data, meta?}` on success and
//! `{status, error, message}` on failure.

use crate::error::ServiceError;
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use serde_json::{json, Value};

pub fn json_response(status: StatusCode, body: &Value) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

pub fn success<T: Serialize>(
    status: StatusCode,
    message: &str,
    data: &T,
) -> Result<Response<Body>, Error> {
    json_response(
        status,
        &json!({
            "status": "success",
            "message": message,
            "data": data,
        }),
    )
}

pub fn success_with_meta<T: Serialize, M: Serialize>(
    message: &str,
    data: &T,
    meta: &M,
) -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "success",
            "message": message,
            "data": data,
            "meta": meta,
        }),
    )
}

pub fn error_response(
    status: StatusCode,
    kind: &str,
    message: &str,
) -> Result<Response<Body>, Error> {
    json_response(
        status,
        &json!({
            "status": "error",
            "error": kind,
            "message": message,
        }),
    )
}

pub fn failure(err: &ServiceError) -> Result<Response<Body>, Error> {
    if err.status_code().is_server_error() {
        tracing::error!("Request failed ({}): {}", err.kind(), err);
    }
    error_response(err.status_code(), err.kind(), &err.to_string())
}

pub fn invalid_body(err: serde_json::Error) -> Result<Response<Body>, Error> {
    tracing::warn!("Rejected request body: {}", err);
    error_response(
        StatusCode::BAD_REQUEST,
        "validation_error",
        "Invalid request body",
    )
}

pub fn not_found() -> Result<Response<Body>, Error> {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not found")
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS")
        .header(
            "Access-Control-Allow-Headers",
            "Content-Type,Authorization,X-User-Id,X-User-Role",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(resp: &Response<Body>) -> Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[test]
    fn failure_carries_kind_and_status() {
        let resp = failure(&ServiceError::InvalidState("only draft achievements can be submitted".into()))
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(&resp);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "invalid_state");
        assert_eq!(body["message"], "only draft achievements can be submitted");
    }

    #[test]
    fn success_wraps_data() {
        let resp = success(StatusCode::CREATED, "created", &json!({"id": 1})).unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
        let body = body_json(&resp);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["id"], 1);
        assert!(body.get("meta").is_none());
    }
}
