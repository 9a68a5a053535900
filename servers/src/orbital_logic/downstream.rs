use crate::orbital_logic::state::AppState;
use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use lib_common::core::Subscription;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    polling_interval: u64,
}

/// Routes: `GET /health` and the `/ws/live` WebSocket.
pub fn router(app_state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/live", get(ws_handler))
        .layer(cors)
        .with_state(app_state)
}

/// Serves on an already bound listener until `shutdown` fires.
pub async fn run(listener: TcpListener, app_state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Downstream server listening on {}", addr);

    axum::serve(listener, router(app_state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("Downstream server shutting down.");
        })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        connections: state.registry.count(),
        polling_interval: state.polling_interval_secs,
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Registered only once the upgrade has completed
    let Subscription { id, mut receiver } = state.registry.register();
    let (mut sink, mut stream) = socket.split();

    // Forward broadcast frames; a failed write ends the subscription
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            // Shares the frame's buffer; only the UTF-8 check touches the bytes
            let text = match Utf8Bytes::try_from(frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(subscriber = id, error = %e, "Dropping frame that is not UTF-8");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Inbound messages are ignored; only close or error matters here
    let mut listener = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => listener.abort(),
        _ = &mut listener => writer.abort(),
    }

    state.registry.unregister(id);
    debug!(subscriber = id, "Live connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lib_common::core::{Frame, SubscriberRegistry};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(Arc::new(SubscriberRegistry::default()), 10)
    }

    async fn wait_for_count(state: &AppState, expected: usize) {
        for _ in 0..100 {
            if state.registry.count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("registry never reached {expected} subscribers");
    }

    #[tokio::test]
    async fn test_health_reports_connections_and_interval() {
        let app_state = state();
        let _sub = app_state.registry.register();

        let response = router(app_state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy", "connections": 1, "polling_interval": 10}));
    }

    #[tokio::test]
    async fn test_live_socket_receives_broadcast_and_unregisters_on_close() {
        let app_state = state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(run(listener, app_state.clone(), shutdown.clone()));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/live")).await.unwrap();
        wait_for_count(&app_state, 1).await;

        // Inbound chatter is ignored
        ws.send(WsMessage::Text("hello".into())).await.unwrap();

        app_state.registry.broadcast(Frame::from_static(br#"{"counts":{}}"#));
        let received = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.into_text().unwrap().as_str(), r#"{"counts":{}}"#);

        ws.close(None).await.unwrap();
        wait_for_count(&app_state, 0).await;

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
