//! Data types crossing the engine boundary.

/// Opaque handle to an initialized pipeline on the device.
///
/// Handles are valid from the moment `init_pipeline` returns until the next
/// device reset. They are cheap to copy and carry no ownership.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineHandle(pub i32);

/// The pair of pipeline handles used for one inference call.
///
/// Both handles come from the same init generation; mixing handles from
/// before and after a reset is undefined engine behavior.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineHandles {
    /// Handle to the detection pipeline.
    pub detection: PipelineHandle,
    /// Handle to the recognition pipeline.
    pub recognition: PipelineHandle,
}

/// A decoded image ready for inference.
///
/// The request layer decodes and grayscales incoming images before they
/// reach the pool, so the buffer is immutable from submission onward.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    /// Raw pixel data, row-major, `height * width * channels` bytes.
    pub data: Vec<u8>,
    /// Image height in pixels.
    pub height: u32,
    /// Image width in pixels.
    pub width: u32,
    /// Channel count (1 for grayscale).
    pub channels: u8,
}

impl PixelBuffer {
    /// Creates a single-channel (grayscale) buffer.
    pub fn grayscale(data: Vec<u8>, height: u32, width: u32) -> Self {
        Self {
            data,
            height,
            width,
            channels: 1,
        }
    }

    /// Returns the number of bytes the dimensions imply.
    pub fn expected_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize
    }
}

/// Axis-aligned region of an image, in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Region width.
    pub width: f32,
    /// Region height.
    pub height: f32,
    /// Rotation angle in degrees, counterclockwise.
    pub angle: f32,
}

/// One detected region with its recognized text.
#[derive(Clone, Debug, PartialEq)]
pub struct TextRegion {
    /// Where the text was found.
    pub bbox: BoundingBox,
    /// The transcription.
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Device memory usage snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryInfo {
    /// Bytes currently in use on the device.
    pub used_bytes: u64,
    /// Total device memory in bytes.
    pub total_bytes: u64,
}

impl MemoryInfo {
    /// Returns used/total as a fraction, or 0.0 for a zero-size device.
    pub fn usage_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}
