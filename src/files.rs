use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{Result, StoreError};

const DEFAULT_MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Turns uploaded file bytes into something the UI can render inline.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    async fn read_as_displayable_reference(&self, content: &[u8], mime_type: &str) -> Result<String>;
}

/// Encodes images as `data:` URIs.
pub struct DataUriCodec {
    max_size: usize,
}

impl Default for DataUriCodec {
    fn default() -> Self {
        DataUriCodec::new(DEFAULT_MAX_IMAGE_SIZE)
    }
}

impl DataUriCodec {
    pub fn new(max_size: usize) -> Self {
        DataUriCodec { max_size }
    }

    fn check(&self, content: &[u8], mime_type: &str) -> Result<()> {
        let mime_type = mime_type.trim();
        let subtype = mime_type.strip_prefix("image/").unwrap_or_default();
        if subtype.is_empty() || subtype.contains(char::is_whitespace) {
            return Err(StoreError::Decode(format!("'{mime_type}' is not an image type")));
        }
        if content.is_empty() {
            return Err(StoreError::Decode("image content is empty".to_string()));
        }
        if content.len() > self.max_size {
            return Err(StoreError::Decode(format!(
                "image is {} bytes, limit is {}",
                content.len(),
                self.max_size
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImageCodec for DataUriCodec {
    async fn read_as_displayable_reference(&self, content: &[u8], mime_type: &str) -> Result<String> {
        self.check(content, mime_type)?;

        Ok(format!("data:{};base64,{}", mime_type.trim(), BASE64.encode(content)))
    }
}
