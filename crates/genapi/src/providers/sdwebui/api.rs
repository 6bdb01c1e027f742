use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::types::{ImageClient, ImageData, ImageRequest};
use crate::utils::{decode_base64_image, send_checked, send_json, sniff_mime_type};

use super::models::{SdModel, Txt2ImgResponse};

pub async fn list_checkpoints(client: &ImageClient) -> Result<Vec<SdModel>> {
    let url = format!("{}/sdapi/v1/sd-models", client.endpoint());
    send_json(client.http().get(url), "sd-models").await
}

/// Switches the server's active checkpoint. WebUI loads the weights into
/// memory before answering, so this can take a while on first use.
pub async fn load_checkpoint(client: &ImageClient, checkpoint_title: &str) -> Result<()> {
    let url = format!("{}/sdapi/v1/options", client.endpoint());
    let body = json!({ "sd_model_checkpoint": checkpoint_title });
    send_checked(client.http().post(url).json(&body), "options").await?;
    Ok(())
}

pub async fn txt2img(client: &ImageClient, request: &ImageRequest) -> Result<Vec<ImageData>> {
    let url = format!("{}/sdapi/v1/txt2img", client.endpoint());
    let body = build_txt2img_body(request);
    let response: Txt2ImgResponse =
        send_json(client.http().post(url).json(&body), "txt2img").await?;

    response_to_images(&response, request.count)
}

pub(crate) fn build_txt2img_body(request: &ImageRequest) -> Value {
    json!({
        "prompt": request.prompt,
        "negative_prompt": request.negative_prompt.clone().unwrap_or_default(),
        "width": request.width,
        "height": request.height,
        "steps": request.steps,
        "cfg_scale": request.guidance,
        "batch_size": request.count.max(1),
        "n_iter": 1,
        "send_images": true,
        "save_images": false
    })
}

/// With `batch_size > 1` WebUI may prepend a grid of the whole batch; only the
/// trailing `count` images are the individual results.
pub(crate) fn response_to_images(response: &Txt2ImgResponse, count: u32) -> Result<Vec<ImageData>> {
    let wanted = count.max(1) as usize;
    let skip = response.images.len().saturating_sub(wanted);

    let images = response
        .images
        .iter()
        .skip(skip)
        .filter(|data| !data.trim().is_empty())
        .map(|data| {
            let bytes = decode_base64_image(data)?;
            Ok(ImageData::new(sniff_mime_type(&bytes), bytes))
        })
        .collect::<Result<Vec<_>>>()?;

    if images.is_empty() {
        return Err(anyhow!("txt2img returned no images"));
    }
    Ok(images)
}
