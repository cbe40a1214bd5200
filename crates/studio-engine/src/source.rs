use std::path::Path;

use studio_contracts::image::EncodedImage;

#[derive(Debug, thiserror::Error)]
pub enum SourceImageError {
    #[error("failed reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("{path} is empty")]
    Empty { path: String },

    #[error("{path} is not a recognised image file")]
    NotAnImage { path: String },
}

/// Loads a portrait from disk the way the uploader does: anything that does
/// not sniff as an image is refused, everything else becomes a data URI
/// image carrying its real MIME type.
pub fn load_source_image(path: &Path) -> Result<EncodedImage, SourceImageError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| SourceImageError::Io {
        path: display.clone(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(SourceImageError::Empty { path: display });
    }
    let format =
        image::guess_format(&bytes).map_err(|_| SourceImageError::NotAnImage { path: display })?;
    Ok(EncodedImage::from_bytes(format.to_mime_type(), &bytes))
}
