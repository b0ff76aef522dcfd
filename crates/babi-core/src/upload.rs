use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, instrument};

const MISSING_URL_HINT: &str =
    "Upload API did not return a public url. Set PUBLIC_BASE_URL on the upload server.";

/// Where images go. Without a URL, images are inlined as data URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    url: Option<String>,
    note: Option<String>,
}

/// Uploads the image at `path` and returns a URL to show in chat.
#[instrument(skip(settings), fields(path = %path.display()))]
pub fn upload_image_file(path: &Path, settings: &UploadSettings) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = guess_mime(path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let Some(url) = settings.url.as_deref().filter(|url| !url.trim().is_empty()) else {
        debug!(mime, bytes = bytes.len(), "no upload url configured; inlining image");
        return Ok(to_data_url(mime, &bytes));
    };

    let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .context("invalid upload content type")?;
    let form = Form::new().part("file", part);

    let client = reqwest::blocking::Client::new();
    let mut request = client.post(url).multipart(form);
    if let Some(token) = settings.token.as_deref().filter(|token| !token.is_empty()) {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .with_context(|| format!("failed sending upload to {url}"))?;
    let status = response.status();
    let body = response.text().context("failed reading upload reply")?;
    if !status.is_success() {
        return Err(anyhow!("Upload failed: {body}"));
    }

    let reply: UploadReply =
        serde_json::from_str(&body).context("upload reply was not valid JSON")?;
    match reply.url {
        Some(url) => {
            info!(%url, "uploaded image");
            Ok(url)
        }
        None => Err(anyhow!(
            "{}",
            reply.note.unwrap_or_else(|| MISSING_URL_HINT.to_string())
        )),
    }
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_common_image_types() {
        assert_eq!(guess_mime(Path::new("a/b/cat.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("cat.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn inlines_without_upload_url() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("dot.gif");
        fs::write(&path, b"GIF89a").expect("write gif");

        let url = upload_image_file(&path, &UploadSettings::default()).expect("inline");
        assert_eq!(url, "data:image/gif;base64,R0lGODlh");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = upload_image_file(Path::new("/nonexistent/x.png"), &UploadSettings::default())
            .expect_err("missing file");
        assert!(format!("{err:#}").contains("failed reading"));
    }
}
