// HTTP/JSON API surface.
//
// Endpoints:
//   GET    /api/tasks          list with optional status/priority/category filters
//   POST   /api/tasks          create
//   GET    /api/tasks/{id}     fetch one
//   PUT    /api/tasks/{id}     partial update
//   DELETE /api/tasks/{id}     remove permanently
//   GET    /api/categories     distinct categories
//   GET    /api/stats          aggregate counts

pub mod response;
pub mod tasks;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared request context. Holds the database path only; every request
/// opens its own connection.
pub struct AppContext {
    pub db_path: PathBuf,
}

impl AppContext {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route(
            "/api/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/categories", get(tasks::list_categories))
        .route("/api/stats", get(tasks::get_stats))
        .fallback(response::endpoint_not_found)
        // The API is called from static frontends on other origins
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn serve(ctx: Arc<AppContext>, host: &str, port: u16) -> std::io::Result<()> {
    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    info!("taskd API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await
}
