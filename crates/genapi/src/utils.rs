use anyhow::{Context, Result};
use base64::Engine as _;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::types::ApiStatusError;

/// Sends the request and decodes a JSON body, turning non-success statuses
/// into [`ApiStatusError`] so the status survives inside the `anyhow` chain.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder, label: &str) -> Result<T> {
    let response_text = send_checked(request, label).await?;

    serde_json::from_str(&response_text).with_context(|| {
        format!(
            "Failed to decode {label} JSON. Raw: {}",
            truncate_for_log(&response_text, 512)
        )
    })
}

/// Like [`send_json`] for endpoints whose body carries nothing useful.
pub(crate) async fn send_checked(request: RequestBuilder, label: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .with_context(|| format!("HTTP request ({label}) failed"))?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .with_context(|| format!("Reading {label} response body failed"))?;

    if !status.is_success() {
        return Err(anyhow::Error::new(ApiStatusError {
            status: status.as_u16(),
            body: truncate_for_log(&response_text, 512),
        }))
        .with_context(|| format!("{label} failed"));
    }

    Ok(response_text)
}

pub async fn download_image(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to send request to {}", url))?
        .error_for_status()
        .with_context(|| format!("Non-success HTTP status from {}", url))?;

    let bytes = resp
        .bytes()
        .await
        .context("Failed to read response bytes")?;

    Ok(bytes.to_vec())
}

/// Decodes base64 image data, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>> {
    let trimmed = data.trim();
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .context("Base64 decoding failed")
}

/// Guesses an image MIME type from magic bytes.
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "application/octet-stream",
    }
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}
