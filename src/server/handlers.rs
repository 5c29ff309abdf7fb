use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::app::App;
use crate::config::validate_name;
use crate::error::{AppError, Result};
use crate::services::MEDIA_DIR;
use crate::store::Watermark;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

pub async fn index() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        concat!(
            "rss2twtxt ",
            env!("CARGO_PKG_VERSION"),
            "\n\n",
            "RSS/Atom feeds republished as twtxt.\n\n",
            "GET /feeds               configured feeds\n",
            "GET /we-are-feeds.txt    follow list\n",
            "GET /<name>/twtxt.txt    a feed\n",
            "GET /<name>/avatar.png   avatar, if <root>/<name>.png exists\n",
        ),
    )
}

pub async fn feeds(State(app): State<Arc<App>>) -> Response {
    let listing = match blocking(move || Ok(app.feeds())).await {
        Ok(listing) => listing,
        Err(e) => return internal_error(e),
    };
    let now = Utc::now();
    let body: String = listing
        .into_iter()
        .map(|feed| {
            let updated = feed
                .last_updated
                .map(|at| humanize_since(at, now))
                .unwrap_or_else(|| "never".to_string());
            format!("{} {} {}\n", feed.name, feed.url, updated)
        })
        .collect();
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

pub async fn we_are_feeds(State(app): State<Arc<App>>) -> Response {
    let listing = match blocking(move || Ok(app.feeds())).await {
        Ok(listing) => listing,
        Err(e) => return internal_error(e),
    };
    let body: String = listing
        .into_iter()
        .map(|feed| format!("{} {}\n", feed.name, feed.url))
        .collect();
    ([(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

pub async fn feed(State(app): State<Arc<App>>, Path(name): Path<String>) -> Response {
    if validate_name(&name).is_err() {
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    }

    let store = app.store().clone();
    let feed = name.clone();
    let read = blocking(move || {
        let Some(content) = store.read(&feed)? else {
            return Ok(None);
        };
        Ok(Some((content, store.watermark_of(&feed)?)))
    });
    let (content, watermark) = match read.await {
        Ok(Some(found)) => found,
        Ok(None) => {
            tracing::warn!("Feed does not exist {}", name);
            return (StatusCode::NOT_FOUND, "Feed not found").into_response();
        }
        Err(e) => return internal_error(e),
    };

    let last_modified = match watermark {
        Watermark::At(at) => http_date(at),
        Watermark::Missing => http_date(DateTime::<Utc>::UNIX_EPOCH),
    };

    (
        [
            (header::CONTENT_TYPE, TEXT_PLAIN.to_string()),
            (header::LAST_MODIFIED, last_modified),
        ],
        content,
    )
        .into_response()
}

pub async fn avatar(State(app): State<Arc<App>>, Path(name): Path<String>) -> Response {
    if validate_name(&name).is_err() {
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    }
    let path = app.store().root().join(format!("{}.png", name));
    serve_file(&path, "image/png").await
}

pub async fn media(State(app): State<Arc<App>>, Path(file): Path<String>) -> Response {
    let valid = Regex::new(r"^[0-9a-f]{64}\.[a-z]{3,4}$").expect("valid media pattern");
    if !valid.is_match(&file) {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    let content_type = match file.rsplit('.').next() {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    let path = app.store().root().join(MEDIA_DIR).join(&file);
    serve_file(&path, content_type).await
}

async fn serve_file(path: &std::path::Path, content_type: &'static str) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
        Err(e) => internal_error(AppError::Io(e)),
    }
}

/// Runs filesystem work that takes a feed lock off the async worker threads.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn internal_error(e: AppError) -> Response {
    tracing::error!("Error serving request: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }
    let (value, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{} {}{} ago", value, unit, plural)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn humanized_ages() {
        let now = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(humanize_since(now - Duration::seconds(5), now), "just now");
        assert_eq!(humanize_since(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(humanize_since(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(humanize_since(now - Duration::days(2), now), "2 days ago");
        assert_eq!(humanize_since(now + Duration::days(2), now), "in the future");
    }

    #[test]
    fn http_dates_are_imf_fixdate() {
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(http_date(at), "Sun, 01 Jan 2023 00:00:00 GMT");
    }
}
