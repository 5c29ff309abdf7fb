mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::error::Result;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/feeds", get(handlers::feeds))
        .route("/we-are-feeds.txt", get(handlers::we_are_feeds))
        .route("/media/:file", get(handlers::media))
        .route("/:name/twtxt.txt", get(handlers::feed))
        .route("/:name/avatar.png", get(handlers::avatar))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

pub async fn serve(app: Arc<App>) -> Result<()> {
    let bind = app.config().bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;

    tracing::info!(
        "rss2twtxt {} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        bind
    );

    axum::serve(listener, router(app)).await?;
    Ok(())
}
