use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

use super::GenerationBackend;
use crate::error::{FatalResult, GenerationError};
use crate::models::{GeneratedImage, GenerationOptions, Prompt};

/// Renders one flat colour per prompt. Needs no service, so a whole run can
/// be exercised offline.
#[derive(Debug, Default)]
pub struct PlaceholderBackend;

impl PlaceholderBackend {
    pub fn new() -> Self {
        Self
    }
}

fn colour_for(prompt: &Prompt, index: u32) -> Rgb<u8> {
    let mut hasher = DefaultHasher::new();
    prompt.as_str().hash(&mut hasher);
    index.hash(&mut hasher);
    let [r, g, b, ..] = hasher.finish().to_le_bytes();
    Rgb([r, g, b])
}

#[async_trait]
impl GenerationBackend for PlaceholderBackend {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn startup(&mut self) -> FatalResult<()> {
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        (0..options.count.max(1))
            .map(|index| -> Result<GeneratedImage, GenerationError> {
                let buffer =
                    ImageBuffer::from_pixel(options.width, options.height, colour_for(prompt, index));
                let mut encoded = Cursor::new(Vec::new());
                DynamicImage::ImageRgb8(buffer)
                    .write_to(&mut encoded, ImageFormat::Png)
                    .map_err(|err| GenerationError::Backend(err.into()))?;
                Ok(GeneratedImage::new("image/png", encoded.into_inner()))
            })
            .collect()
    }
}
