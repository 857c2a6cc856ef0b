//! REST ingress and read endpoints.

use crate::hub::ws::websocket_handler;
use crate::hub::HubContext;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

pub fn create_router(ctx: HubContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/signal", post(post_signal))
        .route("/api/whale/alert", post(post_whale_alert))
        .route("/api/token/launch", post(post_token_launch))
        .route("/api/mev/opportunity", post(post_mev))
        .route("/api/gas/update", post(post_gas_update))
        .route("/api/agent/heartbeat", post(post_heartbeat))
        .route("/api/state", get(get_state))
        .route("/health", get(get_health))
        .route("/ws", get(websocket_handler))
        .with_state(ctx)
        .layer(cors)
}

fn reply(result: Result<(), &'static str>) -> impl IntoResponse {
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))),
        Err(message) => (StatusCode::BAD_REQUEST, Json(json!({"error": message}))),
    }
}

async fn post_signal(State(ctx): State<HubContext>, Json(body): Json<Value>) -> impl IntoResponse {
    reply(ctx.state.ingest_signal(body).await)
}

async fn post_whale_alert(
    State(ctx): State<HubContext>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    reply(ctx.state.ingest_whale_alert(body).await)
}

async fn post_token_launch(
    State(ctx): State<HubContext>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    reply(ctx.state.ingest_token_launch(body).await)
}

async fn post_mev(State(ctx): State<HubContext>, Json(body): Json<Value>) -> impl IntoResponse {
    reply(ctx.state.ingest_mev(body).await)
}

async fn post_gas_update(
    State(ctx): State<HubContext>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    reply(ctx.state.ingest_gas_update(body).await)
}

async fn post_heartbeat(
    State(ctx): State<HubContext>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    reply(ctx.state.ingest_heartbeat(body).await)
}

async fn get_state(State(ctx): State<HubContext>) -> impl IntoResponse {
    Json(ctx.state.state_snapshot().await)
}

async fn get_health(State(ctx): State<HubContext>) -> impl IntoResponse {
    Json(ctx.state.health_snapshot().await)
}
