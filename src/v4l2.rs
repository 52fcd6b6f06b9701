//! V4L2 backend implementation using the v4l crate.
//!
//! Devices are captured as YUYV and converted to packed RGB24 so frames can
//! be rotated pixel by pixel.

use std::io::ErrorKind;
use std::time::Duration;

use tracing::debug;
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::error::{BackendError, BackendResult};
use crate::traits::{
    yuyv_to_rgb24, CaptureBackend, CaptureHandle, CaptureRequest, Frame, FrameMetadata,
    PixelFormat, PropertyId, StreamInfo,
};

/// Longest a single read may block before it is reported as an empty read.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

const YUYV: FourCC = FourCC { repr: *b"YUYV" };

/// Backend opening `/dev/video{N}` devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Backend;

impl CaptureBackend for V4l2Backend {
    fn open(&self, device_id: u32) -> BackendResult<Box<dyn CaptureHandle>> {
        Ok(Box::new(V4l2Handle::open(device_id)?))
    }
}

/// An open V4L2 capture device.
///
/// The mmap stream is created lazily on the first read and torn down
/// whenever the format changes.
pub struct V4l2Handle {
    stream: Option<Stream<'static>>,
    device: Device,
    buffer_count: u32,
}

impl V4l2Handle {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> BackendResult<Self> {
        let device = Device::new(index as usize).map_err(|err| match err.kind() {
            ErrorKind::NotFound => BackendError::DeviceNotFound(index),
            _ => BackendError::OpenFailed(err.to_string()),
        })?;

        let caps = device
            .query_caps()
            .map_err(|err| BackendError::OpenFailed(err.to_string()))?;

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(BackendError::Unsupported(format!(
                "{} ({}) cannot capture video",
                caps.card, caps.driver
            )));
        }

        debug!(device_id = index, driver = %caps.driver, "opened {}", caps.card);
        Ok(Self {
            stream: None,
            device,
            buffer_count: 1,
        })
    }

    fn start_stream(&self) -> BackendResult<Stream<'static>> {
        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)
            .map_err(|err| BackendError::Stream(err.to_string()))?;
        stream.set_timeout(READ_TIMEOUT);
        Ok(stream)
    }
}

impl CaptureHandle for V4l2Handle {
    fn configure(&mut self, request: &CaptureRequest) -> BackendResult<bool> {
        // Drivers refuse format changes while buffers are mapped.
        self.stream = None;
        self.buffer_count = request.buffer_size.max(1);

        let mut fmt = self.device.format()?;
        fmt.width = request.width;
        fmt.height = request.height;
        fmt.fourcc = YUYV;

        let fmt = self.device.set_format(&fmt)?;
        Ok(fmt.width == request.width && fmt.height == request.height && fmt.fourcc == YUYV)
    }

    fn query(&self) -> BackendResult<StreamInfo> {
        let fmt = self.device.format()?;
        let fps = self
            .device
            .params()
            .map(|params| frame_rate(params.interval.numerator, params.interval.denominator))
            .unwrap_or(0.0);

        Ok(StreamInfo {
            width: fmt.width,
            height: fmt.height,
            fps,
        })
    }

    fn set_property(&mut self, key: PropertyId, value: f64) -> BackendResult<bool> {
        #[allow(clippy::cast_possible_truncation)]
        let control = Control {
            id: key.0,
            value: Value::Integer(value.round() as i64),
        };

        match self.device.set_control(control) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::InvalidInput => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn property(&self, key: PropertyId) -> BackendResult<f64> {
        let control = self.device.control(key.0)?;

        #[allow(clippy::cast_precision_loss)]
        match control.value {
            Value::Integer(value) => Ok(value as f64),
            Value::Boolean(value) => Ok(if value { 1.0 } else { 0.0 }),
            _ => Err(BackendError::Unsupported(format!(
                "control {:#x} is not numeric",
                key.0
            ))),
        }
    }

    fn read_frame(&mut self) -> BackendResult<Option<Frame>> {
        let fmt = self.device.format()?;
        if fmt.fourcc != YUYV {
            return Err(BackendError::Unsupported(format!(
                "driver negotiated {} instead of YUYV",
                fmt.fourcc
            )));
        }

        if self.stream.is_none() {
            self.stream = Some(self.start_stream()?);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(None),
            Err(err) => return Err(BackendError::Stream(err.to_string())),
        };

        let used = buf.get(..meta.bytesused as usize).unwrap_or(buf);
        let Some(yuyv) = pack_rows(used, fmt.stride as usize, fmt.width as usize * 2, fmt.height as usize)
        else {
            // Short or empty buffer; the driver delivered no complete frame.
            return Ok(None);
        };

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let metadata = FrameMetadata {
            sequence: meta.sequence,
            timestamp: Duration::new(secs, nanos),
        };

        Frame::new(
            fmt.width,
            fmt.height,
            PixelFormat::Rgb24,
            yuyv_to_rgb24(&yuyv),
            metadata,
        )
        .map(Some)
    }

    fn close(self: Box<Self>) {
        // Stream unmaps its buffers before the device fd closes.
        drop(self);
    }
}

/// Copy `height` rows of `row_bytes` out of a buffer whose rows are `stride`
/// bytes apart. `None` if the buffer is too short.
fn pack_rows(buf: &[u8], stride: usize, row_bytes: usize, height: usize) -> Option<Vec<u8>> {
    let stride = stride.max(row_bytes);
    if row_bytes == 0 || height == 0 {
        return None;
    }

    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        packed.extend_from_slice(buf.get(start..start + row_bytes)?);
    }
    Some(packed)
}

fn frame_rate(numerator: u32, denominator: u32) -> f64 {
    if numerator == 0 {
        0.0
    } else {
        f64::from(denominator) / f64::from(numerator)
    }
}
