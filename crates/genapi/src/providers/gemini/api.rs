use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::types::{ImageClient, ImageData, ImageRequest};
use crate::utils::{decode_base64_image, send_json, sniff_mime_type};

use super::models::{GeminiModelInfo, GeminiResponse};

const SUPPORTED_ASPECT_RATIOS: [(u32, u32); 10] = [
    (1, 1),
    (2, 3),
    (3, 2),
    (3, 4),
    (4, 3),
    (4, 5),
    (5, 4),
    (9, 16),
    (16, 9),
    (21, 9),
];

fn model_path(client: &ImageClient) -> &str {
    client
        .default_model()
        .strip_prefix("models/")
        .unwrap_or(client.default_model())
}

/// Fetches model metadata. Used at startup to prove the key and model name are valid.
pub async fn fetch_model(client: &ImageClient) -> Result<GeminiModelInfo> {
    let url = format!("{}/{}", client.endpoint(), model_path(client));
    let request = client
        .http()
        .get(url)
        .header("x-goog-api-key", client.api_key());

    send_json(request, "Gemini model lookup").await
}

pub async fn send_generate_request(
    client: &ImageClient,
    request: &ImageRequest,
) -> Result<GeminiResponse> {
    let url = format!("{}/{}:generateContent", client.endpoint(), model_path(client));
    let body = build_generate_body(request);

    let http_request = client
        .http()
        .post(url)
        .header("x-goog-api-key", client.api_key())
        .header("Content-Type", "application/json")
        .json(&body);

    send_json(http_request, "Gemini generateContent").await
}

/// Gemini returns one image per call, so `count` images cost `count` requests.
pub async fn generate_images(client: &ImageClient, request: &ImageRequest) -> Result<Vec<ImageData>> {
    let mut images = Vec::new();
    for _ in 0..request.count.max(1) {
        let response = send_generate_request(client, request).await?;
        images.extend(response_to_images(&response)?);
    }
    Ok(images)
}

pub(crate) fn build_generate_body(request: &ImageRequest) -> Value {
    let mut text = request.prompt.clone();
    if let Some(negative) = request
        .negative_prompt
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        text.push_str(&format!("\n\nAvoid: {negative}"));
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": text }]
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
            "imageConfig": {
                "aspectRatio": nearest_aspect_ratio(request.width, request.height)
            }
        }
    })
}

pub(crate) fn nearest_aspect_ratio(width: u32, height: u32) -> String {
    let target = width.max(1) as f64 / height.max(1) as f64;
    let (w, h) = SUPPORTED_ASPECT_RATIOS
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = (a.0 as f64 / a.1 as f64 - target).abs();
            let db = (b.0 as f64 / b.1 as f64 - target).abs();
            da.total_cmp(&db)
        })
        .unwrap_or((1, 1));
    format!("{w}:{h}")
}

/// Collects every inline image part. A response without any is an error,
/// carrying the block reason or the model's text reply when there is one.
pub fn response_to_images(response: &GeminiResponse) -> Result<Vec<ImageData>> {
    let mut images = Vec::new();
    let mut first_text: Option<String> = None;

    for candidate in &response.candidates {
        for part in &candidate.content.parts {
            if let Some(inline_data) = &part.inline_data {
                if inline_data.data.trim().is_empty() {
                    continue;
                }
                let bytes = decode_base64_image(&inline_data.data)?;
                let mime_type = match inline_data.mime_type.trim() {
                    "" => sniff_mime_type(&bytes).to_string(),
                    value => value.to_string(),
                };
                images.push(ImageData::new(mime_type, bytes));
            } else if let Some(text) = &part.text {
                let trimmed = text.trim();
                if !trimmed.is_empty() && first_text.is_none() {
                    first_text = Some(trimmed.to_string());
                }
            }
        }
    }

    if !images.is_empty() {
        return Ok(images);
    }

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(anyhow!("Gemini blocked the prompt: {reason}"));
    }

    match first_text {
        Some(text) => Err(anyhow!("Gemini returned text instead of an image: {text}")),
        None => Err(anyhow!("Provider did not return an image payload")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_closest_supported_ratio() {
        assert_eq!(nearest_aspect_ratio(1024, 1024), "1:1");
        assert_eq!(nearest_aspect_ratio(1920, 1080), "16:9");
        assert_eq!(nearest_aspect_ratio(768, 1024), "3:4");
    }

    #[test]
    fn body_requests_image_modality() {
        let mut request = ImageRequest::new("a red spoiler");
        request.negative_prompt = Some("text, watermark".into());
        let body = build_generate_body(&request);

        assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("a red spoiler"));
        assert!(text.ends_with("Avoid: text, watermark"));
    }

    #[test]
    fn decodes_inline_images() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here is your part." },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        let images = response_to_images(&response).unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(&images[0].bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn text_only_reply_is_an_error() {
        let raw = r#"{ "candidates": [{ "content": { "parts": [{ "text": "I can't draw that." }] } }] }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        let err = response_to_images(&response).unwrap_err();
        assert!(err.to_string().contains("I can't draw that."));
    }

    #[test]
    fn blocked_prompt_reports_reason() {
        let raw = r#"{ "promptFeedback": { "blockReason": "SAFETY" } }"#;
        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        let err = response_to_images(&response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
