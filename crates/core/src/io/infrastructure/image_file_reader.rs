use std::path::Path;

use crate::io::domain::frame_reader::FrameReader;
use crate::shared::frame::Frame;

/// Decodes image files with the `image` crate, converting to 8-bit RGB.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader for ImageFileReader {
    fn read(&self, path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>> {
        let img = image::open(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Frame::new(img.into_raw(), width, height, 3, index)
            .with_name(path.to_string_lossy()))
    }
}
