//! Core types for page previews

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};

use super::request::RenderError;

/// A rasterized page, PNG-encoded.
///
/// Pixels are encoded once when the bitmap is produced so that handing it to a
/// view (file, data URI, terminal protocol) never re-encodes.
#[derive(Clone, PartialEq)]
pub struct Bitmap {
    /// Width in pixels
    pub width_px: u32,
    /// Height in pixels
    pub height_px: u32,
    /// Scale factor the page was rendered at
    pub scale: f32,
    /// PNG bytes
    pub png: Vec<u8>,
}

impl Bitmap {
    /// Encode packed RGB pixels (3 bytes per pixel) as a PNG bitmap
    pub fn from_rgb(
        width_px: u32,
        height_px: u32,
        scale: f32,
        pixels: Vec<u8>,
    ) -> Result<Self, RenderError> {
        let img = RgbImage::from_raw(width_px, height_px, pixels).ok_or_else(|| {
            RenderError::render(scale, format!("pixel buffer does not fit {width_px}x{height_px}"))
        })?;

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RenderError::render(scale, format!("PNG encoding failed: {e}")))?;

        Ok(Self {
            width_px,
            height_px,
            scale,
            png,
        })
    }

    /// Encode a raster surface of `channels` bytes per pixel whose rows are
    /// `stride` bytes apart. Only the first three channels are kept.
    pub fn from_samples(
        width_px: u32,
        height_px: u32,
        scale: f32,
        channels: usize,
        stride: usize,
        samples: &[u8],
    ) -> Result<Self, RenderError> {
        if channels < 3 {
            return Err(RenderError::render(
                scale,
                format!("unsupported surface with {channels} channels"),
            ));
        }
        if width_px == 0 || height_px == 0 {
            return Err(RenderError::render(scale, "empty drawing surface"));
        }

        let row_len = width_px as usize * channels;
        let rows = height_px as usize;
        if stride < row_len || samples.len() < stride * (rows - 1) + row_len {
            return Err(RenderError::render(
                scale,
                format!("{} sample bytes do not cover {width_px}x{height_px}", samples.len()),
            ));
        }

        let pixels = samples
            .chunks(stride)
            .take(rows)
            .flat_map(|row| row[..row_len].chunks_exact(channels))
            .flat_map(|px| px[..3].iter().copied())
            .collect();
        Self::from_rgb(width_px, height_px, scale, pixels)
    }

    /// `data:` URI for embedding in markup
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("scale", &self.scale)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

/// Both resolutions of one page, produced together or not at all
#[derive(Clone, Debug)]
pub struct RenderedPreview {
    /// Inline thumbnail
    pub small: Bitmap,
    /// Full-size modal view
    pub large: Bitmap,
}

/// Authoritative preview state for one key
#[derive(Clone, Debug)]
pub enum PreviewState {
    /// Never requested (or evicted)
    Idle,
    /// Render in flight
    Pending,
    /// Both bitmaps cached
    Ready {
        small: Arc<Bitmap>,
        large: Arc<Bitmap>,
    },
    /// Render failed; terminal for the key
    Failed { message: String },
}

impl PreviewState {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Short label for logs and reports
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_png_and_data_uri() {
        let bitmap = Bitmap::from_rgb(2, 1, 0.5, vec![255, 0, 0, 0, 0, 255]).unwrap();
        assert_eq!(bitmap.width_px, 2);
        assert_eq!(bitmap.height_px, 1);
        assert_eq!(&bitmap.png[1..4], b"PNG");

        let uri = bitmap.data_uri();
        assert!(uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn rejects_short_pixel_buffers() {
        let err = Bitmap::from_rgb(4, 4, 1.5, vec![0; 10]).unwrap_err();
        assert!(matches!(err, RenderError::Render { .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn samples_drop_alpha_and_row_padding() {
        // 2x2 RGBA with two padding bytes per row
        let samples = [
            1, 2, 3, 255, 4, 5, 6, 255, 0, 0, //
            7, 8, 9, 255, 10, 11, 12, 255, 0, 0,
        ];
        let bitmap = Bitmap::from_samples(2, 2, 1.0, 4, 10, &samples).unwrap();
        let expected =
            Bitmap::from_rgb(2, 2, 1.0, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]).unwrap();
        assert_eq!(bitmap, expected);
    }

    #[test]
    fn samples_reject_bad_surfaces() {
        assert!(Bitmap::from_samples(2, 2, 1.0, 1, 2, &[0; 4]).is_err());
        assert!(Bitmap::from_samples(0, 2, 1.0, 3, 0, &[]).is_err());
        assert!(Bitmap::from_samples(2, 2, 1.0, 3, 6, &[0; 8]).is_err());
    }

    #[test]
    fn state_labels() {
        assert_eq!(PreviewState::Idle.label(), "idle");
        assert!(PreviewState::Pending.is_pending());
        assert!(
            !PreviewState::Failed {
                message: "x".into()
            }
            .is_ready()
        );
    }
}
