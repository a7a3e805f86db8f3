//! Avatar validation.  Only PNG and JPEG images are accepted; the format is
//! sniffed from the file signature, never trusted from a declared type.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::{JPEG_MAGIC, PNG_MAGIC};
use crate::error::Denial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarFormat {
    Png,
    Jpeg,
}

impl AvatarFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&PNG_MAGIC) {
            Some(Self::Png)
        } else if bytes.starts_with(&JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Check that `bytes` is a non-empty PNG or JPEG no larger than `max_bytes`.
pub fn validate(bytes: &[u8], max_bytes: usize) -> Result<AvatarFormat, Denial> {
    if bytes.is_empty() {
        return Err(Denial::InvalidAvatar("image is empty".into()));
    }
    if bytes.len() > max_bytes {
        return Err(Denial::InvalidAvatar(format!(
            "image is {} bytes (max {max_bytes})",
            bytes.len()
        )));
    }
    AvatarFormat::sniff(bytes)
        .ok_or_else(|| Denial::InvalidAvatar("avatar must be a PNG or JPG file".into()))
}

/// Render image bytes as a `data:` URL.  Unknown formats are labelled PNG.
pub fn data_url(bytes: &[u8]) -> String {
    let mime = AvatarFormat::sniff(bytes)
        .unwrap_or(AvatarFormat::Png)
        .mime();
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
