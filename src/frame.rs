//! Decoded frame container.
//!
//! A `Frame` is the unit every camera source produces and every consumer
//! receives: a tightly packed RGB8 pixel grid plus its dimensions. JPEG
//! decoding is delegated to the `image` codec; this module only owns the
//! container and its validity rules.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;

/// Channel count of every frame produced by this crate (RGB8).
pub const FRAME_CHANNELS: u32 = 3;

/// A decoded video frame: row-major RGB8 pixels.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u32,
}

impl Frame {
    /// Build a frame from raw RGB8 pixels. The buffer length must match the
    /// dimensions exactly.
    pub fn from_rgb8(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * FRAME_CHANNELS as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "pixel buffer is {} bytes, expected {} for {}x{} rgb8",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels: FRAME_CHANNELS,
        })
    }

    /// Decode one encoded JPEG image into a frame.
    pub fn from_jpeg(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode jpeg frame")?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();
        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
            channels: FRAME_CHANNELS,
        })
    }

    /// A frame is valid iff it is non-empty, all three dimensions (height,
    /// width, channel) are present, and the buffer length matches them.
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
            && self.width > 0
            && self.height > 0
            && self.channels == FRAME_CHANNELS
            && self.data.len()
                == self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Raw pixel bytes for the serving layer (re-encoding, display).
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        bytes
    }

    #[test]
    fn jpeg_decode_produces_valid_frame() {
        let jpeg = encode_test_jpeg(64, 48);
        let frame = Frame::from_jpeg(&jpeg).expect("decode");
        assert!(frame.is_valid());
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.channels(), FRAME_CHANNELS);
        assert_eq!(frame.data().len(), 64 * 48 * 3);
    }

    #[test]
    fn garbage_bytes_do_not_decode() {
        assert!(Frame::from_jpeg(b"not a jpeg").is_err());
    }

    #[test]
    fn rgb8_constructor_rejects_mismatched_buffer() {
        assert!(Frame::from_rgb8(vec![0u8; 10], 4, 4).is_err());
        assert!(Frame::from_rgb8(vec![0u8; 4 * 4 * 3], 4, 4).is_ok());
    }

    #[test]
    fn empty_frame_is_invalid() {
        let frame = Frame::from_rgb8(Vec::new(), 0, 0).expect("zero-sized buffer matches");
        assert!(!frame.is_valid());
    }
}
