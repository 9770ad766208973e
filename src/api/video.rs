use std::io::SeekFrom;
use std::path::Path as FsPath;
use std::sync::{Arc, OnceLock};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Local};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::error::{ApiError, Result};
use super::ApiState;
use crate::models::{VideoInfo, TIMESTAMP_FORMAT};

const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "gif"];
const STREAM_CHUNK: usize = 1024 * 1024;

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "gif" => "image/gif",
        _ => "video/mp4",
    }
}

fn extension_of(path: &FsPath) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^bytes=(\d+)-(\d*)$").ok())
        .as_ref()
}

/// Single `bytes=start-[end]` ranges only; anything else is served whole.
fn parse_range(header: Option<&str>, size: u64) -> ByteRange {
    let Some(caps) = header.and_then(|h| range_pattern()?.captures(h.trim())) else {
        return ByteRange::Full;
    };

    let Ok(start) = caps[1].parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = match caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return ByteRange::Full,
        },
        None => None,
    };

    if start >= size || end.is_some_and(|end| start > end) {
        return ByteRange::Unsatisfiable;
    }

    let last = size - 1;
    ByteRange::Partial {
        start,
        end: end.map_or(last, |end| end.min(last)),
    }
}

fn is_plain_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..")
}

/// Finished clips, newest first. The clip still being recorded is skipped.
pub async fn list_videos(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<VideoInfo>>> {
    let mut entries = match tokio::fs::read_dir(&state.videos_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Json(Vec::new())),
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };
    let active = state.monitor.recorder.active_file();

    let mut videos = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
    {
        let path = entry.path();
        let Some(format) = extension_of(&path) else {
            continue;
        };
        if active.as_deref() == Some(path.as_path()) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }

        let modified: DateTime<Local> = match meta.modified() {
            Ok(time) => time.into(),
            Err(_) => continue,
        };
        videos.push((
            modified,
            VideoInfo {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size_mb: (meta.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
                created: modified.format(TIMESTAMP_FORMAT).to_string(),
                format,
            },
        ));
    }

    videos.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(Json(videos.into_iter().map(|(_, info)| info).collect()))
}

pub async fn serve_video(
    State(state): State<Arc<ApiState>>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    if !is_plain_name(&filename) {
        log::warn!("[Api] Rejected video path '{}'", filename);
        return Err(ApiError::NotFound("Video not found".to_string()));
    }

    let path = state.videos_dir.join(&filename);
    let size = match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Err(ApiError::NotFound("Video not found".to_string())),
    };
    if size == 0 {
        return Err(ApiError::NotFound("Video file is empty".to_string()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let (start, end, status) = match parse_range(range_header, size) {
        ByteRange::Full => (0, size - 1, StatusCode::OK),
        ByteRange::Partial { start, end } => (start, end, StatusCode::PARTIAL_CONTENT),
        ByteRange::Unsatisfiable => {
            log::debug!("[Api] Unsatisfiable range {:?} for {} ({} bytes)", range_header, filename, size);
            return Err(ApiError::RangeNotSatisfiable(size));
        }
    };
    let length = end - start + 1;

    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to open {}: {}", filename, e)))?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| ApiError::Internal(format!("failed to seek {}: {}", filename, e)))?;
    }
    let stream = ReaderStream::with_capacity(file.take(length), STREAM_CHUNK);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    let out = response.headers_mut();
    out.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_for(&extension)));
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    out.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if status == StatusCode::PARTIAL_CONTENT {
        let content_range = format!("bytes {}-{}/{}", start, end, size);
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            out.insert(header::CONTENT_RANGE, value);
        }
        out.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    Ok(response.into_response())
}
