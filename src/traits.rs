//! Core traits and types for the capture backend abstraction.

use std::time::Duration;

use crate::error::{BackendError, BackendResult};

/// Pixel layout of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 24-bit RGB.
    Rgb24,
    /// 8-bit luminance.
    Gray8,
}

impl PixelFormat {
    /// Bytes used by one pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Gray8 => 1,
        }
    }
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
}

/// A captured video frame with tightly packed rows.
///
/// The buffer length always equals `width * height * bytes_per_pixel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u32,
    timestamp: Duration,
}

impl Frame {
    /// Wrap a pixel buffer, checking that its size matches the geometry.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        metadata: FrameMetadata,
    ) -> BackendResult<Self> {
        let expected = expected_len(width, height, format);
        if data.len() != expected {
            return Err(BackendError::Stream(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} {format:?}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            format,
            sequence: metadata.sequence,
            timestamp: metadata.timestamp,
        })
    }

    /// Frame width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sequence number and timestamp reported by the backend.
    #[must_use]
    pub const fn metadata(&self) -> FrameMetadata {
        FrameMetadata {
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }

    /// Bytes of the pixel at `(x, y)`, or `None` when out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        self.data.get(offset..offset + bpp)
    }

    /// RGB value of the pixel at `(x, y)`.
    ///
    /// Gray frames report the luminance on all three channels.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        match (self.format, self.pixel(x, y)?) {
            (PixelFormat::Rgb24, &[r, g, b]) => Some((r, g, b)),
            (PixelFormat::Gray8, &[v]) => Some((v, v, v)),
            _ => None,
        }
    }
}

/// Buffer size in bytes for the given geometry.
#[must_use]
pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
    width as usize * height as usize * format.bytes_per_pixel()
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}

/// Convert a packed YUYV (4:2:2) buffer to packed RGB24.
///
/// Each `[Y0 U Y1 V]` group yields two pixels sharing the chroma pair.
/// A trailing partial group is ignored.
#[must_use]
pub fn yuyv_to_rgb24(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for group in yuyv.chunks_exact(4) {
        if let &[y0, u, y1, v] = group {
            let (r, g, b) = yuv_to_rgb(y0, u, v);
            rgb.extend_from_slice(&[r, g, b]);
            let (r, g, b) = yuv_to_rgb(y1, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb
}

/// Opaque backend property key.
///
/// Keys and value semantics are defined by the backend. The constants below
/// are the V4L2 control ids for common image controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// Picture brightness.
    pub const BRIGHTNESS: Self = Self(0x0098_0900);
    /// Picture contrast.
    pub const CONTRAST: Self = Self(0x0098_0901);
    /// Color saturation.
    pub const SATURATION: Self = Self(0x0098_0902);
    /// Sensor gain.
    pub const GAIN: Self = Self(0x0098_0913);
}

/// Capture settings pushed to a backend. Backends treat them as requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Requested raw width in pixels.
    pub width: u32,
    /// Requested raw height in pixels.
    pub height: u32,
    /// Requested number of driver buffers.
    pub buffer_size: u32,
}

/// Effective stream parameters as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Negotiated raw width in pixels.
    pub width: u32,
    /// Negotiated raw height in pixels.
    pub height: u32,
    /// Frame rate; `0.0` when the backend cannot tell.
    pub fps: f64,
}

/// A source of capture handles, addressed by numeric device id.
pub trait CaptureBackend: Send + Sync {
    /// Acquire the device with the given id.
    fn open(&self, device_id: u32) -> BackendResult<Box<dyn CaptureHandle>>;
}

/// One acquired capture device.
pub trait CaptureHandle: Send {
    /// Request a capture mode. Returns whether the backend applied the
    /// request exactly; unsupported values are clamped or ignored rather than
    /// reported as errors.
    fn configure(&mut self, request: &CaptureRequest) -> BackendResult<bool>;

    /// Query the negotiated stream parameters.
    fn query(&self) -> BackendResult<StreamInfo>;

    /// Set a backend property. Returns whether the backend accepted it.
    fn set_property(&mut self, key: PropertyId, value: f64) -> BackendResult<bool>;

    /// Read a backend property.
    fn property(&self, key: PropertyId) -> BackendResult<f64>;

    /// Read the next raw, unrotated frame. `Ok(None)` means no frame was
    /// available.
    fn read_frame(&mut self) -> BackendResult<Option<Frame>>;

    /// Free the underlying device.
    fn close(self: Box<Self>);
}
