//! In-memory favicon images.
//!
//! An [`Icon`] is an RGBA raster plus an identity token. The token marks the
//! in-memory instance, not its pixels: it is assigned once at construction,
//! shared by clones, and used by the favicon cache as a cheap dirty check.
//! Two pixel-identical icons built separately carry different tokens and are
//! treated as different images. This is a known approximation; switching to a
//! content hash would dedupe them and change when favicon rows are rewritten.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{PageIndexError, Result};

/// Default edge length of a stored favicon raster.
pub const DEFAULT_FAVICON_SIZE: u32 = 16;

static NEXT_IDENTITY: AtomicI64 = AtomicI64::new(1);

fn next_identity() -> i64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

/// A decoded favicon with an instance identity token.
#[derive(Debug, Clone)]
pub struct Icon {
    image: Arc<RgbaImage>,
    identity: i64,
}

impl Icon {
    /// Wrap a raster, assigning a fresh process-unique identity.
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self::with_identity(image, next_identity())
    }

    /// Wrap a raster with a caller-supplied identity token.
    ///
    /// Hosts that already track image instances (a toolkit pixmap cache key,
    /// say) can pass that token through so repeated visits with the same
    /// instance skip re-encoding.
    #[must_use]
    pub fn with_identity(image: RgbaImage, identity: i64) -> Self {
        Self {
            image: Arc::new(image),
            identity,
        }
    }

    /// Build a solid-color icon. Mostly useful for tests and demos.
    #[must_use]
    pub fn solid(size: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(size, size, image::Rgba(rgba)))
    }

    /// Identity token of this instance.
    #[must_use]
    pub const fn identity(&self) -> i64 {
        self.identity
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying raster.
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether the icon has no pixels at all.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Scale to `size`x`size` and encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`PageIndexError::Encode`] if the icon is empty or the PNG
    /// encoder fails.
    pub fn encode_png(&self, size: u32) -> Result<Vec<u8>> {
        if self.is_null() || size == 0 {
            return Err(PageIndexError::encode("icon has no pixels"));
        }
        let scaled = if self.width() == size && self.height() == size {
            (*self.image).clone()
        } else {
            image::imageops::resize(&*self.image, size, size, FilterType::Triangle)
        };

        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(scaled)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| PageIndexError::encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decode PNG bytes into a new icon with a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns [`PageIndexError::Decode`] if the bytes are not a valid PNG.
    pub fn decode_png(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| PageIndexError::Decode {
                reason: e.to_string(),
            })?
            .to_rgba8();
        Ok(Self::new(image))
    }

    /// Read a PNG icon from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid PNG.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| PageIndexError::path_error("read icon", path, e))?;
        Self::decode_png(&bytes)
    }
}
