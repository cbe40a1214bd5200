use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use studio_contracts::image::EncodedImage;

use crate::client::{EditClient, RemoteError};

const DRYRUN_SIDE: u32 = 256;

/// Offline client: paints a solid tile whose colour is derived from the
/// prompt and the source payload, so every preset gets a distinct image.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunEditClient;

impl DryrunEditClient {
    pub fn new() -> Self {
        Self
    }
}

impl EditClient for DryrunEditClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn edit(&self, source: &EncodedImage, prompt: &str) -> Result<EncodedImage, RemoteError> {
        let (r, g, b) = color_from_prompt(prompt, source.payload());
        let mut tile = RgbImage::new(DRYRUN_SIDE, DRYRUN_SIDE);
        for pixel in tile.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(tile)
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| RemoteError::Other(format!("dryrun encode failed: {err}")))?;
        Ok(EncodedImage::from_bytes("image/png", bytes.get_ref()))
    }
}

fn color_from_prompt(prompt: &str, source: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
