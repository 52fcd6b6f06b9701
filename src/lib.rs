//! Webcam-Registry: named, oriented camera devices built from configuration
//!
//! This library opens every camera listed under `webcam_plugin.devices`,
//! rotates delivered frames to each camera's configured orientation, and keeps
//! them in a lazily built, resettable registry. Capture goes through the
//! [`CaptureBackend`] trait, enabling both production use with V4L2 hardware
//! and testing with mock devices.

pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod manager;
pub mod mock;
pub mod orientation;
pub mod registry;
pub mod traits;
pub mod v4l2;
pub mod validation;

pub use config::{ConfigSource, ConfigStore, DeviceConfig, FALLBACK_CAMERA_NAME};
pub use device::{Device, DeviceInfo};
pub use discovery::{DeviceDiscovery, DiscoveredDevice, SysfsDiscovery};
pub use error::{BackendError, CaptureError, ConfigError, OpenError};
pub use fallback::FallbackReason;
pub use manager::DeviceManager;
pub use mock::{MockBackend, MockCamera, TestPattern};
pub use orientation::Orientation;
pub use registry::{lock_manager, Registry, SharedManager};
pub use traits::{
    CaptureBackend, CaptureHandle, CaptureRequest, Frame, FrameMetadata, PixelFormat, PropertyId,
    StreamInfo,
};
pub use v4l2::V4l2Backend;
