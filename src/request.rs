use bytes::Bytes;
use eyre::{OptionExt, Result, WrapErr};
use std::path::Path;

use crate::error::InterpretError;

const PROMPT_PREFIX: &str = "Analyze the following image(s) and answer this question: ";

/// An image handed to the model as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Bytes,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read an image file, inferring its MIME type from the extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let mime_type = mime_type_for(path)?;
        let data = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("Failed to read image {}", path.display()))?;

        debug!(
            "Loaded image {} ({} bytes, {})",
            path.display(),
            data.len(),
            mime_type
        );

        Ok(Self::new(mime_type, data))
    }
}

fn mime_type_for(path: &Path) -> Result<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_eyre("Image path has no extension")?
        .to_lowercase();

    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        other => bail!("Unsupported image type '{}' for {}", other, path.display()),
    };

    Ok(mime)
}

/// A single submission to the model. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    instruction_text: String,
    images: Vec<ImagePayload>,
}

impl Request {
    pub fn new(instruction_text: impl Into<String>, images: Vec<ImagePayload>) -> Self {
        Self {
            instruction_text: instruction_text.into(),
            images,
        }
    }

    pub fn instruction_text(&self) -> &str {
        &self.instruction_text
    }

    pub fn images(&self) -> &[ImagePayload] {
        &self.images
    }

    pub fn validate(&self) -> std::result::Result<(), InterpretError> {
        if self.instruction_text.trim().is_empty() {
            return Err(InterpretError::InvalidRequest(
                "instruction text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The instruction wrapped in the fixed prompt template sent upstream
    pub fn prompt(&self) -> String {
        format!("{PROMPT_PREFIX}{}", self.instruction_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_instructions_are_invalid() {
        assert!(matches!(
            Request::new("", vec![]).validate(),
            Err(InterpretError::InvalidRequest(_))
        ));
        assert!(matches!(
            Request::new("  \n\t", vec![]).validate(),
            Err(InterpretError::InvalidRequest(_))
        ));
        assert!(Request::new("What is this?", vec![]).validate().is_ok());
    }

    #[test]
    fn prompt_wraps_instruction() {
        let request = Request::new("Which county?", vec![]);
        assert_eq!(
            request.prompt(),
            "Analyze the following image(s) and answer this question: Which county?"
        );
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_type_for(Path::new("a/b.JPG")).unwrap(), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("tomato.png")).unwrap(), "image/png");
        assert!(mime_type_for(Path::new("notes.txt")).is_err());
        assert!(mime_type_for(Path::new("no_extension")).is_err());
    }

    #[tokio::test]
    async fn reads_image_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mango.webp");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let image = ImagePayload::from_path(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.data.as_ref(), &[1, 2, 3]);
    }
}
