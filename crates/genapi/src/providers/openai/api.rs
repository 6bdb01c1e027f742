use anyhow::{Result, anyhow};
use reqwest::RequestBuilder;
use serde_json::{Value, json};

use crate::types::{ImageClient, ImageData, ImageRequest};
use crate::utils::{decode_base64_image, download_image, is_http_url, send_json, sniff_mime_type};

use super::models::{ImagesResponse, ModelList};

fn authorize(client: &ImageClient, request: RequestBuilder) -> RequestBuilder {
    if client.api_key().is_empty() {
        request
    } else {
        request.bearer_auth(client.api_key())
    }
}

pub async fn list_models(client: &ImageClient) -> Result<Vec<String>> {
    let url = format!("{}/models", client.endpoint());
    let models: ModelList = send_json(authorize(client, client.http().get(url)), "models").await?;
    Ok(models.data.into_iter().map(|entry| entry.id).collect())
}

pub async fn generate_images(client: &ImageClient, request: &ImageRequest) -> Result<Vec<ImageData>> {
    let url = format!("{}/images/generations", client.endpoint());
    let body = build_generation_body(client.default_model(), request);

    let response: ImagesResponse = send_json(
        authorize(client, client.http().post(url)).json(&body),
        "images/generations",
    )
    .await?;

    let mut images = Vec::with_capacity(response.data.len());
    for entry in response.data {
        let bytes = match (entry.b64_json, entry.url) {
            (Some(data), _) if !data.trim().is_empty() => decode_base64_image(&data)?,
            (_, Some(url)) if is_http_url(&url) => download_image(client.http(), &url).await?,
            _ => continue,
        };
        images.push(ImageData::new(sniff_mime_type(&bytes), bytes));
    }

    if images.is_empty() {
        return Err(anyhow!("images/generations returned no images"));
    }
    Ok(images)
}

/// `step` is the LocalAI extension for the diffusion step count; servers that
/// do not know it ignore it.
pub(crate) fn build_generation_body(model: &str, request: &ImageRequest) -> Value {
    json!({
        "model": model,
        "prompt": request.prompt,
        "n": request.count.max(1),
        "size": request.size_string(),
        "step": request.steps,
        "response_format": "b64_json"
    })
}
