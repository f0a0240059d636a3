//! Display images served alongside the manifest.

use std::path::Path;

use actix_web::web::Bytes;
use anyhow::{Context, Result};

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// 1x1 fully transparent PNG.
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0a, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Small and large icon bytes for the install prompt.
#[derive(Debug, Clone)]
pub struct DisplayImages {
    pub small: Bytes,
    pub large: Bytes,
}

impl DisplayImages {
    pub fn placeholder() -> Self {
        let png = Bytes::from_static(PLACEHOLDER_PNG);
        Self {
            small: png.clone(),
            large: png,
        }
    }

    /// Use one icon for both sizes; the device scales it.
    pub fn from_png(png: impl Into<Bytes>) -> Self {
        let png = png.into();
        Self {
            small: png.clone(),
            large: png,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("read icon {:?}", path))?;
        if !is_png(&data) {
            return Err(anyhow::anyhow!("icon {:?} is not a PNG", path));
        }
        Ok(Self::from_png(data))
    }
}

impl Default for DisplayImages {
    fn default() -> Self {
        Self::placeholder()
    }
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(PNG_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_png() {
        let images = DisplayImages::placeholder();
        assert!(is_png(&images.small));
        assert_eq!(images.small, images.large);
    }

    #[test]
    fn load_rejects_non_png() {
        let path =
            std::env::temp_dir().join(format!("ota-install-icon-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"GIF89a").unwrap();
        assert!(DisplayImages::load(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
