use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Request, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::UploadError;
use crate::state::AppState;
use crate::store::{ObjectMetadata, StoredObject};

pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;
pub const NO_BASE_URL_NOTE: &str =
    "Upload success. Set PUBLIC_BASE_URL to return direct file URLs.";

const ALLOW_METHODS: &str = "POST,OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type,Authorization";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Origin to echo back: `*` without a request origin or allow-list, the
/// request origin when allowed, else the first allowed origin. An empty
/// `Origin` counts as missing.
pub fn resolve_allowed_origin(request_origin: Option<&str>, allowed: &[String]) -> String {
    match request_origin.filter(|origin| !origin.is_empty()) {
        None => "*".to_string(),
        Some(_) if allowed.is_empty() => "*".to_string(),
        Some(origin) if allowed.iter().any(|o| o == origin) => origin.to_string(),
        Some(_) => allowed[0].clone(),
    }
}

pub async fn cors_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let allow_origin = resolve_allowed_origin(origin.as_deref(), &state.config.allowed_origins);

    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = resp.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&allow_origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    resp
}

fn check_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), UploadError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let provided = provided.strip_prefix("Bearer ").unwrap_or(provided).trim();
    if provided == expected {
        Ok(())
    } else {
        Err(UploadError::Unauthorized)
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("multipart/form-data"))
}

/// Replaces every character outside `[a-zA-Z0-9._-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    match Regex::new(r"[^a-zA-Z0-9._-]") {
        Ok(re) => re.replace_all(name, "_").into_owned(),
        Err(_) => name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    }
}

pub fn object_key(millis: i64, id: Uuid, file_name: &str) -> String {
    format!("{millis}-{id}-{}", sanitize_file_name(file_name))
}

struct FilePart {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge
    } else {
        UploadError::MalformedBody(err.body_text())
    }
}

fn push_within_limit(buf: &mut Vec<u8>, chunk: &[u8]) -> Result<(), UploadError> {
    if buf.len() + chunk.len() > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge);
    }
    buf.extend_from_slice(chunk);
    Ok(())
}

/// Finds the `file` field and streams it in, failing as soon as it passes
/// [`MAX_UPLOAD_BYTES`]. Non-image parts are rejected before any read.
async fn read_file_part(multipart: &mut Multipart) -> Result<Option<FilePart>, UploadError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            return Ok(None);
        };
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(UploadError::NotAnImage);
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            push_within_limit(&mut bytes, &chunk)?;
        }
        return Ok(Some(FilePart {
            file_name,
            content_type,
            bytes,
        }));
    }
    Ok(None)
}

#[instrument(skip_all, fields(method = %method))]
pub async fn upload_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    if method != Method::POST {
        return Err(UploadError::MethodNotAllowed);
    }
    check_token(&headers, state.config.upload_token.as_deref())?;
    if !is_multipart(&headers) {
        return Err(UploadError::NotMultipart);
    }
    let mut multipart = multipart.map_err(|err| {
        debug!(error = %err, "multipart rejected");
        UploadError::NotMultipart
    })?;

    let file = read_file_part(&mut multipart)
        .await?
        .ok_or(UploadError::MissingFile)?;

    let now = Utc::now();
    let key = object_key(now.timestamp_millis(), Uuid::new_v4(), &file.file_name);
    let size = file.bytes.len();
    state
        .store
        .put(
            &key,
            StoredObject {
                bytes: file.bytes,
                metadata: ObjectMetadata {
                    content_type: file.content_type,
                    uploaded_at: now,
                },
            },
        )
        .await?;
    info!(%key, size, "stored upload");

    let response = match state.config.public_base_url.as_deref() {
        Some(base) => UploadResponse {
            url: Some(format!("{}/{key}", base.trim_end_matches('/'))),
            key,
            note: None,
        },
        None => UploadResponse {
            key,
            url: None,
            note: Some(NO_BASE_URL_NOTE.to_string()),
        },
    };
    Ok(Json(response))
}
