//! Route modules for the Filebox server

pub mod actions;
pub mod auth;
pub mod files;
pub mod health;
pub mod users;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::protocol::API_PREFIX;
use crate::state::AppState;

/// Every route, with the body limit sized for one chunk or whole-file upload
pub fn app(state: AppState) -> Router {
    let max_body_bytes = state.config().upload.max_body_bytes;

    let api = Router::new()
        .merge(files::router())
        .merge(actions::router())
        .merge(users::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let server = TestServer::new(app.router()).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "filebox-server");
    }
}
