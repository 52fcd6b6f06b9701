//! Mock backend for testing and hardware-less runs.
//!
//! Each mock camera generates RGB test patterns at the negotiated resolution.
//! Cameras can be scripted to clamp resolutions, return empty reads or fail
//! their live check, and the backend records every open and close so tests
//! can assert on handle lifetimes.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::discovery::{DeviceDiscovery, DiscoveredDevice};
use crate::error::{BackendError, BackendResult};
use crate::traits::{
    CaptureBackend, CaptureHandle, CaptureRequest, Frame, FrameMetadata, PixelFormat, PropertyId,
    StreamInfo,
};

/// RGB values of the eight color bars, left to right.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
pub const COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 11),
    (12, 236, 237),
    (13, 237, 13),
    (237, 13, 237),
    (238, 14, 13),
    (15, 15, 239),
    (16, 16, 16),
];

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// Eight vertical color bars.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with the given R, G, B values.
    Solid(u8, u8, u8),
}

/// Behavior of one mock camera.
#[derive(Debug, Clone)]
pub struct MockCamera {
    max_width: u32,
    max_height: u32,
    fps: f64,
    pattern: TestPattern,
    empty_reads: u32,
    fail_query: bool,
    properties: BTreeMap<PropertyId, f64>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCamera {
    /// A 1920x1080, 30 fps camera producing color bars.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            fps: 30.0,
            pattern: TestPattern::ColorBars,
            empty_reads: 0,
            fail_query: false,
            properties: BTreeMap::new(),
        }
    }

    /// Clamp requested resolutions to at most `width` x `height`.
    #[must_use]
    pub const fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    /// Frame rate reported by `query`.
    #[must_use]
    pub const fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    /// Set the test pattern for frame generation.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Return `count` empty reads before the first frame.
    #[must_use]
    pub const fn with_empty_reads(mut self, count: u32) -> Self {
        self.empty_reads = count;
        self
    }

    /// Open successfully but fail every `query`, so the handle never
    /// becomes live.
    #[must_use]
    pub const fn failing_query(mut self) -> Self {
        self.fail_query = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    cameras: BTreeMap<u32, MockCamera>,
    any_device: Option<MockCamera>,
    exclusive: bool,
    open_handles: HashMap<u32, usize>,
    opens: usize,
    closes: usize,
}

/// Mock capture backend.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// A backend with no cameras attached; every open fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that opens any device id as a default [`MockCamera`].
    #[must_use]
    pub fn virtual_rig() -> Self {
        let backend = Self::new();
        backend.lock().any_device = Some(MockCamera::new());
        backend
    }

    /// Attach a camera under `device_id`.
    #[must_use]
    pub fn with_camera(self, device_id: u32, camera: MockCamera) -> Self {
        self.lock().cameras.insert(device_id, camera);
        self
    }

    /// Refuse a second open of a device id that already has a live handle.
    #[must_use]
    pub fn exclusive(self) -> Self {
        self.lock().exclusive = true;
        self
    }

    /// Number of successful opens so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().opens
    }

    /// Number of handles closed so far.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Number of handles currently open for `device_id`.
    #[must_use]
    pub fn live_handles(&self, device_id: u32) -> usize {
        self.lock().open_handles.get(&device_id).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CaptureBackend for MockBackend {
    fn open(&self, device_id: u32) -> BackendResult<Box<dyn CaptureHandle>> {
        let mut state = self.lock();
        let camera = state
            .cameras
            .get(&device_id)
            .or(state.any_device.as_ref())
            .cloned()
            .ok_or(BackendError::DeviceNotFound(device_id))?;

        let exclusive = state.exclusive;
        let live = state.open_handles.entry(device_id).or_insert(0);
        if exclusive && *live > 0 {
            return Err(BackendError::OpenFailed(format!(
                "device {device_id} is busy"
            )));
        }
        *live += 1;
        state.opens += 1;

        Ok(Box::new(MockHandle {
            device_id,
            width: camera.max_width.min(640),
            height: camera.max_height.min(480),
            buffer_size: 1,
            sequence: 0,
            empty_reads_left: camera.empty_reads,
            properties: camera.properties.clone(),
            camera,
            state: Arc::clone(&self.state),
        }))
    }
}

impl DeviceDiscovery for MockBackend {
    fn list_devices(&self) -> Vec<DiscoveredDevice> {
        self.lock()
            .cameras
            .keys()
            .map(|&id| DiscoveredDevice {
                device_id: Some(id),
                path: PathBuf::from(format!("/dev/video{id}")),
                description: format!("Mock Camera {id}"),
            })
            .collect()
    }
}

/// Handle returned by [`MockBackend::open`].
#[derive(Debug)]
pub struct MockHandle {
    device_id: u32,
    camera: MockCamera,
    width: u32,
    height: u32,
    buffer_size: u32,
    sequence: u32,
    empty_reads_left: u32,
    properties: BTreeMap<PropertyId, f64>,
    state: Arc<Mutex<MockState>>,
}

impl CaptureHandle for MockHandle {
    fn configure(&mut self, request: &CaptureRequest) -> BackendResult<bool> {
        self.width = request.width.min(self.camera.max_width).max(1);
        self.height = request.height.min(self.camera.max_height).max(1);
        self.buffer_size = request.buffer_size.max(1);
        Ok(self.width == request.width && self.height == request.height)
    }

    fn query(&self) -> BackendResult<StreamInfo> {
        if self.camera.fail_query {
            return Err(BackendError::Stream(format!(
                "device {} stopped responding",
                self.device_id
            )));
        }
        Ok(StreamInfo {
            width: self.width,
            height: self.height,
            fps: self.camera.fps,
        })
    }

    fn set_property(&mut self, key: PropertyId, value: f64) -> BackendResult<bool> {
        self.properties.insert(key, value);
        Ok(true)
    }

    fn property(&self, key: PropertyId) -> BackendResult<f64> {
        self.properties
            .get(&key)
            .copied()
            .ok_or_else(|| BackendError::Unsupported(format!("property {:#x}", key.0)))
    }

    fn read_frame(&mut self) -> BackendResult<Option<Frame>> {
        if self.empty_reads_left > 0 {
            self.empty_reads_left -= 1;
            return Ok(None);
        }

        let data = generate_test_frame(self.width, self.height, self.camera.pattern);
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let metadata = FrameMetadata {
            sequence: seq,
            timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
        };
        Frame::new(self.width, self.height, PixelFormat::Rgb24, data, metadata).map(Some)
    }

    fn close(self: Box<Self>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = state.open_handles.get_mut(&self.device_id) {
            *live = live.saturating_sub(1);
        }
        state.closes += 1;
    }
}

/// Generate packed RGB24 frame data for a pattern.
#[must_use]
pub fn generate_test_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    let bar_width = (width / 8).max(1);

    for _ in 0..height {
        for x in 0..width {
            let (r, g, b) = match pattern {
                TestPattern::ColorBars => {
                    let bar_idx = (x / bar_width).min(7) as usize;
                    COLOR_BARS.get(bar_idx).copied().unwrap_or_default()
                }
                TestPattern::Gradient => {
                    #[allow(clippy::cast_possible_truncation)]
                    let v = (u64::from(x) * 255 / u64::from(width)) as u8;
                    (v, v, v)
                }
                TestPattern::Solid(r, g, b) => (r, g, b),
            };
            data.extend_from_slice(&[r, g, b]);
        }
    }

    data
}
