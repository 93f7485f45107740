use serde_json::json;
use std::sync::Arc;
use warp::Filter;

use super::relay_websocket;
use crate::config::SignalingConfig;
use crate::relay::RoomRegistry;

pub const SERVICE_NAME: &str = "Live Session Relay";

/// `GET /signaling` upgraded to the relay WebSocket.
pub fn relay_websocket_route(
    registry: Arc<RoomRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("signaling")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_registry(registry))
        .map(|ws: warp::ws::Ws, registry: Arc<RoomRegistry>| {
            ws.on_upgrade(move |websocket| {
                relay_websocket::handle_relay_websocket(websocket, registry)
            })
        })
}

pub fn relay_health_check(
    registry: Arc<RoomRegistry>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("signaling" / "health")
        .and(warp::get())
        .and(with_registry(registry))
        .and_then(|registry: Arc<RoomRegistry>| async move {
            let stats = registry.stats().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&json!({
                "status": "healthy",
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "rooms": stats.rooms,
                "connections": stats.connections,
            })))
        })
}

/// Bootstrap values a browser needs before opening a peer connection.
pub fn relay_config_endpoint(
    config: SignalingConfig,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("signaling" / "config")
        .and(warp::get())
        .map(move || {
            warp::reply::json(&json!({
                "signalingUrl": config.public_url,
                "iceServers": [
                    { "urls": [config.stun_server_url] }
                ],
            }))
        })
}

fn with_registry(
    registry: Arc<RoomRegistry>,
) -> impl Filter<Extract = (Arc<RoomRegistry>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || registry.clone())
}
