use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue},
    response::{Html, IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::core::model::RetrievalRequest;
use crate::http::dto::{
    DownloadVideoRequest, DownloadVideoResponse, FetchPlaylistRequest, FetchPlaylistResponse,
    ProgressResponse, ReplyStatus,
};
use crate::http::errors::ApiError;
use crate::http::AppState;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Playlist Downloader</title></head>
<body>
<h1>Playlist Downloader</h1>
<p>POST a playlist URL to <code>/fetch_playlist</code>, then request items from <code>/download_video</code>.</p>
</body>
</html>
"#;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn fetch_playlist(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FetchPlaylistRequest>, JsonRejection>,
) -> Json<FetchPlaylistResponse> {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return Json(FetchPlaylistResponse::error(format!("Invalid request: {}", e.body_text()))),
    };
    tracing::debug!(mode = %req.mode, "fetch_playlist");

    match state.engine.list_collection(&req.playlist_url).await {
        Ok(listing) => Json(FetchPlaylistResponse {
            status: ReplyStatus::Success,
            playlist_title: Some(listing.title),
            total: Some(listing.items.len()),
            videos: Some(listing.items),
            message: None,
        }),
        Err(e) => Json(FetchPlaylistResponse::error(e.to_string())),
    }
}

pub async fn download_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DownloadVideoRequest>, JsonRejection>,
) -> Json<DownloadVideoResponse> {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(e) => return Json(DownloadVideoResponse::error(format!("Invalid request: {}", e.body_text()))),
    };

    let request = RetrievalRequest {
        video_id: req.video_id,
        quality: req.quality,
        format: req.format,
    };
    if req.wait {
        return match state.engine.run_retrieval(request).await {
            Ok((job_id, result)) => Json(DownloadVideoResponse::from_result(job_id, result)),
            Err(e) => Json(DownloadVideoResponse::error(e.to_string())),
        };
    }

    match state.engine.start_retrieval(request).await {
        Ok(job_id) => Json(DownloadVideoResponse {
            status: ReplyStatus::Success,
            message: "Download started".to_string(),
            filename: None,
            download_url: None,
            job_id: Some(job_id),
        }),
        Err(e) => Json(DownloadVideoResponse::error(e.to_string())),
    }
}

pub async fn job_progress(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let id = Uuid::parse_str(&job_id).map_err(|_| ApiError::not_found("Job not found"))?;
    let record = state.engine.job(id).ok_or_else(|| ApiError::not_found("Job not found"))?;
    Ok(Json(record.into()))
}

pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let (file, len) = state.engine.store().open_artifact(&filename).await?;

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&filename));

    tracing::info!(file = %filename, bytes = len, "serving artifact");
    Ok(response)
}

fn content_disposition(filename: &str) -> HeaderValue {
    let ascii: String = filename
        .chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { '_' })
        .collect();
    let encoded: String = url::form_urlencoded::byte_serialize(filename.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii, encoded
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
