//! The single-page chat UI.

use axum::response::{Html, IntoResponse};

pub const INDEX_HTML: &str = include_str!("../assets/index.html");

pub async fn index_handler() -> impl IntoResponse {
    Html(INDEX_HTML)
}
