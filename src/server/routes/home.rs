//! Upload page

use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

/// GET / - Static page with the upload form
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
