use serde::Deserialize;
use std::sync::Arc;
use warp::Filter;

use crate::error::RelayError;
use crate::lifecycle::SessionStore;

/// Lifecycle bodies are small; anything larger is rejected before parsing.
const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartSessionRequest {
    pub session_id: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndSessionRequest {
    pub session_id: Option<String>,
}

/// Ids are stored exactly as sent; only missing or blank values are rejected.
fn required(value: Option<String>, field: &str) -> Result<String, RelayError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| RelayError::invalid_request(format!("{field} is required")))
}

/// Path segments owned by the POST routes, never looked up as session ids.
const ACTION_SEGMENTS: &[&str] = &["start", "end"];

/// `POST /api/live-sessions/start`, `POST /api/live-sessions/end`
/// and `GET /api/live-sessions/{sessionId}`.
pub fn session_routes(
    store: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    start_session_route(store.clone())
        .or(end_session_route(store.clone()))
        .or(get_session_route(store))
}

fn start_session_route(
    store: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "live-sessions" / "start")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(start_session)
}

fn end_session_route(
    store: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "live-sessions" / "end")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(end_session)
}

fn get_session_route(
    store: Arc<dyn SessionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "live-sessions" / String)
        .and(warp::get())
        .and_then(|session_id: String| async move {
            if ACTION_SEGMENTS.contains(&session_id.as_str()) {
                Err(warp::reject::not_found())
            } else {
                Ok(session_id)
            }
        })
        .and(with_store(store))
        .and_then(get_session)
}

async fn start_session(
    request: StartSessionRequest,
    store: Arc<dyn SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let session_id = required(request.session_id, "sessionId")?;
    let teacher_id = required(request.teacher_id, "teacherId")?;

    let session = store.start(&session_id, &teacher_id).await?;
    Ok(warp::reply::json(&session))
}

async fn end_session(
    request: EndSessionRequest,
    store: Arc<dyn SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let session_id = required(request.session_id, "sessionId")?;

    let session = store.end(&session_id).await?;
    Ok(warp::reply::json(&session))
}

async fn get_session(
    session_id: String,
    store: Arc<dyn SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let session_id = urlencoding::decode(&session_id)
        .map_err(|_| RelayError::invalid_request("sessionId is not valid UTF-8"))?
        .into_owned();

    match store.get(&session_id).await? {
        Some(session) => Ok(warp::reply::json(&session)),
        None => Err(RelayError::SessionNotFound(session_id).into()),
    }
}

fn with_store(
    store: Arc<dyn SessionStore>,
) -> impl Filter<Extract = (Arc<dyn SessionStore>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || store.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_keeps_value_and_rejects_blank() {
        assert_eq!(required(Some(" abc ".to_string()), "sessionId").unwrap(), " abc ");
        assert!(required(Some("   ".to_string()), "sessionId").is_err());

        let err = required(None, "teacherId").unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: teacherId is required");
    }

    #[test]
    fn test_request_fields_are_optional_at_parse_time() {
        let request: StartSessionRequest = serde_json::from_str(r#"{"sessionId":"s"}"#).unwrap();
        assert_eq!(request.session_id.as_deref(), Some("s"));
        assert!(request.teacher_id.is_none());
    }
}
