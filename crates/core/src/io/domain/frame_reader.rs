use std::path::Path;

use crate::shared::frame::Frame;

/// Decodes one still image into an RGB [`Frame`].
///
/// Implementations set the frame name to the source path so downstream
/// stages can report and key by it.
pub trait FrameReader: Send + Sync {
    fn read(&self, path: &Path, index: usize) -> Result<Frame, Box<dyn std::error::Error>>;
}
