use serde::Deserialize;

/// One entry of `/sdapi/v1/sd-models`.
#[derive(Debug, Clone, Deserialize)]
pub struct SdModel {
    pub title: String,
    pub model_name: String,
}

impl SdModel {
    /// WebUI accepts either the full title (`name.safetensors [hash]`) or the bare model name.
    pub fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        self.title == wanted
            || self.model_name == wanted
            || self.title.split_whitespace().next() == Some(wanted)
    }
}

#[derive(Debug, Deserialize)]
pub struct Txt2ImgResponse {
    #[serde(default)]
    pub images: Vec<String>,
}
