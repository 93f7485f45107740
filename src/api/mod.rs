pub mod relay_routes;
pub mod relay_websocket;
pub mod session_routes;

use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::config::SignalingConfig;
use crate::error::RelayError;
use crate::lifecycle::SessionStore;
use crate::relay::RoomRegistry;

/// Full HTTP surface: relay WebSocket, operational endpoints and lifecycle API.
pub fn routes(
    registry: Arc<RoomRegistry>,
    store: Arc<dyn SessionStore>,
    signaling: SignalingConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let cors = match &signaling.cors_allowed_origin {
        Some(origin) => warp::cors().allow_origin(origin.as_str()),
        None => warp::cors().allow_any_origin(),
    }
    .allow_methods(vec!["GET", "POST", "OPTIONS"])
    .allow_headers(vec!["content-type"]);

    relay_routes::relay_websocket_route(registry.clone())
        .or(relay_routes::relay_health_check(registry))
        .or(relay_routes::relay_config_endpoint(signaling))
        .or(session_routes::session_routes(store))
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn error_reply(status: StatusCode, code: &'static str, message: String) -> warp::reply::Response {
    let body = ErrorResponse {
        error: ErrorDetail { code, message },
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

/// Maps every rejection onto the JSON error body.
pub async fn handle_rejection(rejection: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(err) = rejection.find::<RelayError>() {
        if err.status_code() >= 500 {
            tracing::error!(error = %err, "Lifecycle request failed");
        }
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(error_reply(status, err.code(), err.client_message()));
    }

    if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            format!("Malformed JSON body: {err}"),
        ));
    }

    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(error_reply(
            StatusCode::PAYLOAD_TOO_LARGE,
            "PAYLOAD_TOO_LARGE",
            "Request body too large".to_string(),
        ));
    }

    if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(error_reply(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "UNSUPPORTED_MEDIA_TYPE",
            "Expected an application/json body".to_string(),
        ));
    }

    if rejection.find::<warp::reject::MissingHeader>().is_some()
        || rejection.find::<warp::reject::InvalidHeader>().is_some()
    {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "Missing or invalid request header".to_string(),
        ));
    }

    if rejection.is_not_found() {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Route not found".to_string(),
        ));
    }

    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method not allowed".to_string(),
        ));
    }

    tracing::warn!(rejection = ?rejection, "Unhandled rejection");
    Ok(error_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    ))
}
