//! A single camera: one backend handle plus orientation-aware frame delivery.

use std::fmt;

use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{CaptureError, CaptureResult, OpenError};
use crate::orientation::Orientation;
use crate::traits::{CaptureBackend, CaptureHandle, CaptureRequest, Frame, PropertyId};

/// Snapshot of a device's state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    /// Backend device id.
    pub device_id: u32,
    /// Lookup name.
    pub name: String,
    /// Negotiated capture width before rotation.
    pub raw_width: u32,
    /// Negotiated capture height before rotation.
    pub raw_height: u32,
    /// Width of delivered frames.
    pub oriented_width: u32,
    /// Height of delivered frames.
    pub oriented_height: u32,
    /// Normalized rotation.
    pub orientation: Orientation,
    /// Requested driver buffer count.
    pub buffer_size: u32,
    /// Whether the device holds a live handle.
    pub opened: bool,
    /// Frame rate reported by the backend, `0.0` if unknown.
    pub fps: f64,
}

/// One camera device.
///
/// A `Device` exclusively owns its backend handle and is not meant to be
/// shared between threads without external locking. It is `Send`, so a
/// caller can drive each device's capture loop on its own thread.
pub struct Device {
    name: String,
    device_id: u32,
    handle: Option<Box<dyn CaptureHandle>>,
    raw_width: u32,
    raw_height: u32,
    orientation: Orientation,
    buffer_size: u32,
    opened: bool,
}

impl Device {
    /// Open and configure the device described by `config`.
    ///
    /// The requested resolution and buffer size are advisory; the effective
    /// raw resolution is whatever the backend reports afterwards.
    pub fn open(backend: &dyn CaptureBackend, config: &DeviceConfig) -> Result<Self, OpenError> {
        let device_id = config.device_id;
        let mut handle = backend.open(device_id).map_err(|err| OpenError {
            device_id,
            reason: err.to_string(),
        })?;

        let request = CaptureRequest {
            width: config.width,
            height: config.height,
            buffer_size: config.buffer_size,
        };
        match handle.configure(&request) {
            Ok(true) => {}
            Ok(false) => debug!(
                name = %config.name,
                device_id,
                "backend adjusted requested {}x{}",
                config.width,
                config.height
            ),
            Err(err) => warn!(name = %config.name, device_id, "capture request ignored: {err}"),
        }

        // The handle only counts as live once the backend answers a query.
        let stream = match handle.query() {
            Ok(stream) => stream,
            Err(err) => {
                handle.close();
                return Err(OpenError {
                    device_id,
                    reason: format!("device did not respond after configure: {err}"),
                });
            }
        };

        let mut device = Self::unopened(config);
        device.store_raw(stream.width, stream.height);
        device.handle = Some(handle);
        device.opened = true;

        info!(
            name = %device.name,
            device_id,
            "camera opened: raw {}x{}, oriented {}x{} ({})",
            device.raw_width,
            device.raw_height,
            device.oriented_width(),
            device.oriented_height(),
            device.orientation
        );
        Ok(device)
    }

    /// A device that holds no handle, with geometry taken from `config`.
    ///
    /// Used to keep failed opens visible to callers.
    #[must_use]
    pub fn unopened(config: &DeviceConfig) -> Self {
        Self {
            name: config.name.clone(),
            device_id: config.device_id,
            handle: None,
            raw_width: config.width,
            raw_height: config.height,
            orientation: Orientation::from_degrees(config.orientation),
            buffer_size: config.buffer_size,
            opened: false,
        }
    }

    /// Capture one frame and rotate it to the configured orientation.
    pub fn get_frame(&mut self) -> CaptureResult<Frame> {
        let raw = self.live_handle_mut()?.read_frame()?;
        let Some(raw) = raw else {
            debug!(name = %self.name, device_id = self.device_id, "no frame available");
            return Err(CaptureError::NoFrame);
        };

        if (raw.width(), raw.height()) != (self.raw_width, self.raw_height) {
            debug!(
                name = %self.name,
                "frame is {}x{}, expected {}x{}; resyncing",
                raw.width(),
                raw.height(),
                self.raw_width,
                self.raw_height
            );
            self.store_raw(raw.width(), raw.height());
        }

        Ok(self.orientation.rotate(raw))
    }

    /// Request a new raw (unrotated) resolution.
    ///
    /// Returns whether the backend applied it exactly. The stored raw and
    /// oriented dimensions are refreshed from the backend either way.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> bool {
        let request = CaptureRequest {
            width,
            height,
            buffer_size: self.buffer_size,
        };
        let Ok(handle) = self.live_handle_mut() else {
            return false;
        };

        let accepted = handle.configure(&request).unwrap_or_else(|err| {
            warn!("resolution request {width}x{height} failed: {err}");
            false
        });
        let queried = handle.query();

        match queried {
            Ok(stream) => self.store_raw(stream.width, stream.height),
            // Some backends apply silently without answering queries.
            Err(err) if accepted => {
                debug!(name = %self.name, "query after resize failed: {err}");
                self.store_raw(width, height);
            }
            Err(err) => warn!(name = %self.name, "query after resize failed: {err}"),
        }
        accepted
    }

    /// Current oriented `(width, height)`, i.e. the size of delivered frames.
    #[must_use]
    pub const fn get_resolution(&self) -> (u32, u32) {
        self.orientation.apply(self.raw_width, self.raw_height)
    }

    /// Current raw `(width, height)` as negotiated with the backend.
    #[must_use]
    pub const fn raw_resolution(&self) -> (u32, u32) {
        (self.raw_width, self.raw_height)
    }

    /// Width of delivered frames.
    #[must_use]
    pub const fn oriented_width(&self) -> u32 {
        self.get_resolution().0
    }

    /// Height of delivered frames.
    #[must_use]
    pub const fn oriented_height(&self) -> u32 {
        self.get_resolution().1
    }

    /// Pass a property through to the backend.
    pub fn set_property(&mut self, key: PropertyId, value: f64) -> CaptureResult<bool> {
        Ok(self.live_handle_mut()?.set_property(key, value)?)
    }

    /// Read a property from the backend.
    pub fn get_property(&self, key: PropertyId) -> CaptureResult<f64> {
        Ok(self.live_handle()?.property(key)?)
    }

    /// Snapshot of the current state. `fps` is queried live.
    #[must_use]
    pub fn get_device_info(&self) -> DeviceInfo {
        let fps = self
            .live_handle()
            .ok()
            .and_then(|handle| handle.query().ok())
            .map_or(0.0, |stream| stream.fps);
        let (oriented_width, oriented_height) = self.get_resolution();

        DeviceInfo {
            device_id: self.device_id,
            name: self.name.clone(),
            raw_width: self.raw_width,
            raw_height: self.raw_height,
            oriented_width,
            oriented_height,
            orientation: self.orientation,
            buffer_size: self.buffer_size,
            opened: self.opened,
            fps,
        }
    }

    /// Close the backend handle. Safe to call repeatedly and on a device
    /// that never opened.
    pub fn release(&mut self) {
        self.opened = false;
        if let Some(handle) = self.handle.take() {
            handle.close();
            info!(name = %self.name, device_id = self.device_id, "camera released");
        }
    }

    /// Lookup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend device id.
    #[must_use]
    pub const fn device_id(&self) -> u32 {
        self.device_id
    }

    /// Normalized rotation.
    #[must_use]
    pub const fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the device holds a live handle.
    #[must_use]
    pub const fn is_opened(&self) -> bool {
        self.opened
    }

    fn store_raw(&mut self, width: u32, height: u32) {
        // A zero dimension means the backend could not tell; keep what we had.
        if width > 0 && height > 0 {
            self.raw_width = width;
            self.raw_height = height;
        }
    }

    fn live_handle(&self) -> CaptureResult<&(dyn CaptureHandle + 'static)> {
        match (&self.handle, self.opened) {
            (Some(handle), true) => Ok(handle.as_ref()),
            _ => Err(CaptureError::NotOpen),
        }
    }

    fn live_handle_mut(&mut self) -> CaptureResult<&mut (dyn CaptureHandle + 'static)> {
        match (&mut self.handle, self.opened) {
            (Some(handle), true) => Ok(handle.as_mut()),
            _ => Err(CaptureError::NotOpen),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("device_id", &self.device_id)
            .field("raw", &(self.raw_width, self.raw_height))
            .field("orientation", &self.orientation)
            .field("opened", &self.opened)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockCamera};

    fn backend() -> MockBackend {
        MockBackend::new().with_camera(0, MockCamera::new())
    }

    fn open(backend: &MockBackend, config: &DeviceConfig) -> Device {
        Device::open(backend, config).expect("open should succeed")
    }

    #[test]
    fn test_open_normalizes_orientation() {
        let backend = backend();
        let config = DeviceConfig::new("cam", 0).with_orientation(-95.0);
        let device = open(&backend, &config);
        assert_eq!(device.orientation(), Orientation::Deg270);
        assert!(device.is_opened());
    }

    #[test]
    fn test_open_missing_device_reports_id() {
        let backend = MockBackend::new();
        let err = Device::open(&backend, &DeviceConfig::new("cam", 7)).expect_err("open should fail");
        assert_eq!(err.device_id, 7);
    }

    #[test]
    fn test_open_closes_handle_that_never_went_live() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new().failing_query());
        let result = Device::open(&backend, &DeviceConfig::new("cam", 0));
        assert!(result.is_err());
        assert_eq!(backend.close_count(), 1);
        assert_eq!(backend.live_handles(0), 0);
    }

    #[test]
    fn test_quarter_turn_swaps_dimensions() {
        let backend = backend();
        for degrees in [90.0, 270.0] {
            let config = DeviceConfig::new("cam", 0)
                .with_resolution(1280, 720)
                .with_orientation(degrees);
            let device = open(&backend, &config);
            assert_eq!(device.raw_resolution(), (1280, 720));
            assert_eq!(device.get_resolution(), (720, 1280));
        }
    }

    #[test]
    fn test_half_turn_keeps_dimensions() {
        let backend = backend();
        for degrees in [0.0, 180.0] {
            let config = DeviceConfig::new("cam", 0)
                .with_resolution(1280, 720)
                .with_orientation(degrees);
            let device = open(&backend, &config);
            assert_eq!(device.get_resolution(), (1280, 720));
        }
    }

    #[test]
    fn test_open_stores_negotiated_resolution() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new().with_max_resolution(800, 600));
        let config = DeviceConfig::new("cam", 0)
            .with_resolution(1920, 1080)
            .with_orientation(90.0);
        let device = open(&backend, &config);
        assert_eq!(device.raw_resolution(), (800, 600));
        assert_eq!(device.get_resolution(), (600, 800));
    }

    #[test]
    fn test_get_frame_is_rotated() {
        let backend = backend();
        let config = DeviceConfig::new("cam", 0)
            .with_resolution(64, 32)
            .with_orientation(90.0);
        let mut device = open(&backend, &config);

        let frame = device.get_frame().expect("frame should be available");
        assert_eq!((frame.width(), frame.height()), (32, 64));
        assert_eq!(frame.data().len(), 64 * 32 * 3);
    }

    #[test]
    fn test_get_frame_on_unopened_device() {
        let mut device = Device::unopened(&DeviceConfig::new("cam", 0));
        assert!(matches!(device.get_frame(), Err(CaptureError::NotOpen)));
    }

    #[test]
    fn test_get_frame_empty_read_is_retryable() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new().with_empty_reads(1));
        let mut device = open(&backend, &DeviceConfig::new("cam", 0));

        assert!(matches!(device.get_frame(), Err(CaptureError::NoFrame)));
        assert!(device.get_frame().is_ok());
    }

    #[test]
    fn test_release_twice() {
        let backend = backend();
        let mut device = open(&backend, &DeviceConfig::new("cam", 0));

        device.release();
        assert!(!device.is_opened());
        device.release();
        assert!(!device.is_opened());

        assert_eq!(backend.close_count(), 1);
        assert!(matches!(device.get_frame(), Err(CaptureError::NotOpen)));
    }

    #[test]
    fn test_release_never_opened_is_noop() {
        let backend = backend();
        let mut device = Device::unopened(&DeviceConfig::new("cam", 0));
        device.release();
        assert!(!device.is_opened());
        assert_eq!(backend.close_count(), 0);
    }

    #[test]
    fn test_drop_releases_handle() {
        let backend = backend();
        {
            let _device = open(&backend, &DeviceConfig::new("cam", 0));
            assert_eq!(backend.live_handles(0), 1);
        }
        assert_eq!(backend.live_handles(0), 0);
        assert_eq!(backend.close_count(), 1);
    }

    #[test]
    fn test_set_resolution_round_trip() {
        let backend = backend();
        let config = DeviceConfig::new("cam", 0).with_orientation(270.0);
        let mut device = open(&backend, &config);

        assert!(device.set_resolution(1280, 720));
        assert_eq!(device.raw_resolution(), (1280, 720));
        assert_eq!(device.get_resolution(), (720, 1280));
        assert_eq!(device.orientation(), Orientation::Deg270);
    }

    #[test]
    fn test_set_resolution_clamped_keeps_swap() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new().with_max_resolution(1024, 768));
        let config = DeviceConfig::new("cam", 0).with_orientation(90.0);
        let mut device = open(&backend, &config);

        assert!(!device.set_resolution(1920, 1080));
        assert_eq!(device.raw_resolution(), (1024, 768));
        assert_eq!(device.get_resolution(), (768, 1024));

        let frame = device.get_frame().expect("frame should be available");
        assert_eq!((frame.width(), frame.height()), (768, 1024));
    }

    #[test]
    fn test_set_resolution_on_unopened_device() {
        let mut device = Device::unopened(&DeviceConfig::new("cam", 0));
        assert!(!device.set_resolution(1280, 720));
        assert_eq!(device.raw_resolution(), (640, 480));
    }

    #[test]
    fn test_properties_require_open_device() {
        let backend = backend();
        let mut device = open(&backend, &DeviceConfig::new("cam", 0));

        assert!(device
            .set_property(PropertyId::GAIN, 3.0)
            .expect("set should succeed"));
        let gain = device.get_property(PropertyId::GAIN).expect("get should succeed");
        assert!((gain - 3.0).abs() < f64::EPSILON);

        device.release();
        assert!(matches!(
            device.set_property(PropertyId::GAIN, 1.0),
            Err(CaptureError::NotOpen)
        ));
        assert!(matches!(
            device.get_property(PropertyId::GAIN),
            Err(CaptureError::NotOpen)
        ));
    }

    #[test]
    fn test_device_info() {
        let backend = MockBackend::new().with_camera(4, MockCamera::new().with_fps(15.0));
        let config = DeviceConfig::new("side", 4)
            .with_resolution(320, 240)
            .with_orientation(180.0)
            .with_buffer_size(3);
        let mut device = open(&backend, &config);

        let info = device.get_device_info();
        assert_eq!(info.name, "side");
        assert_eq!(info.device_id, 4);
        assert_eq!((info.raw_width, info.raw_height), (320, 240));
        assert_eq!((info.oriented_width, info.oriented_height), (320, 240));
        assert_eq!(info.orientation, Orientation::Deg180);
        assert_eq!(info.buffer_size, 3);
        assert!(info.opened);
        assert!((info.fps - 15.0).abs() < f64::EPSILON);

        device.release();
        let info = device.get_device_info();
        assert!(!info.opened);
        assert!(info.fps.abs() < f64::EPSILON);
    }
}
