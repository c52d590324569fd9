use crate::db::connection::init_db;
use crate::gateway::{EventBus, ws_handler};
use crate::hub::SessionHub;
use crate::startup::AppState;
use crate::store::PgStore;
use axum::{
    Router,
    extract::Extension,
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[macro_use]
extern crate tracing;

mod api;
mod chat;
mod db;
mod error;
mod gateway;
mod hub;
mod polls;
mod rooms;
mod startup;
mod store;
mod users;

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "INFO");
        }
    }
    // initialize tracing
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost:5432/live_polling".to_string());

    let db = init_db(&database_url)
        .await
        .expect("Unable to connect to the database");

    let hub = Arc::new(SessionHub::new(Arc::new(PgStore::new(db.clone()))));
    hub.hydrate().await.expect("Unable to restore session state");

    let app_state = AppState::new(db, hub).await;
    let bus = Arc::new(EventBus::new());

    // build our application with a route
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(api::health))
        .route("/api/polls/active", get(api::active_poll))
        .route("/api/polls/history", get(api::poll_history))
        .layer(Extension(app_state))
        .layer(Extension(bus))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .fallback(handler_404);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(5000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Unable to spawn tcp listener");

    axum::serve(listener, app).await.unwrap();
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
