//! The named collection of devices built from configuration.

use std::io::{self, Write};

use tracing::{info, warn};

use crate::config::{ConfigSource, DeviceConfig};
use crate::device::{Device, DeviceInfo};
use crate::fallback::{fallback_plan, plan_devices, FallbackReason};
use crate::traits::CaptureBackend;

/// Owns every configured [`Device`], keyed by name in configuration order.
///
/// Devices leave the collection only through [`DeviceManager::release_all`].
/// A manager never re-reads configuration; build a new one to pick up
/// changes.
#[derive(Debug, Default)]
pub struct DeviceManager {
    cameras: Vec<Device>,
    fallback: Option<FallbackReason>,
}

impl DeviceManager {
    /// Read the device list from `source` and open every device on
    /// `backend`.
    ///
    /// A record that fails to open is logged and kept as an unopened device.
    /// If the configuration is unusable, or nothing it names could be opened,
    /// the fallback camera is tried as well, unless a configured camera
    /// already uses its name. A failed fallback leaves the manager without
    /// active cameras, which is a valid state.
    pub fn from_source(backend: &dyn CaptureBackend, source: &dyn ConfigSource) -> Self {
        let plan = plan_devices(source.device_records());

        let mut manager = Self {
            cameras: Vec::with_capacity(plan.devices.len()),
            fallback: plan.fallback,
        };
        for config in &plan.devices {
            manager.cameras.push(open_or_placeholder(backend, config));
        }

        if manager.fallback.is_none() && manager.get_active_cameras().is_empty() {
            let plan = fallback_plan(FallbackReason::NoDeviceOpened);
            for config in &plan.devices {
                if manager.get_camera(&config.name).is_some() {
                    warn!(
                        name = %config.name,
                        "none of the configured cameras opened; fallback name is taken, not trying it"
                    );
                    continue;
                }
                warn!("none of the configured cameras opened; trying the fallback camera");
                manager.fallback = plan.fallback;
                manager.cameras.push(open_or_placeholder(backend, config));
            }
        }

        info!(
            "loaded {} cameras ({} active)",
            manager.cameras.len(),
            manager.get_active_cameras().len()
        );
        manager
    }

    /// Open each config directly, with the same failure handling as
    /// [`DeviceManager::from_source`].
    pub fn from_configs(backend: &dyn CaptureBackend, configs: Vec<DeviceConfig>) -> Self {
        Self::from_source(backend, &configs)
    }

    /// Device with the given name.
    #[must_use]
    pub fn get_camera(&self, name: &str) -> Option<&Device> {
        self.cameras.iter().find(|d| d.name() == name)
    }

    /// Mutable access to the device with the given name.
    pub fn get_camera_mut(&mut self, name: &str) -> Option<&mut Device> {
        self.cameras.iter_mut().find(|d| d.name() == name)
    }

    /// First device, in configuration order, using `device_id`.
    #[must_use]
    pub fn get_camera_by_id(&self, device_id: u32) -> Option<&Device> {
        self.cameras.iter().find(|d| d.device_id() == device_id)
    }

    /// Snapshot of the named device's state.
    #[must_use]
    pub fn get_camera_info(&self, name: &str) -> Option<DeviceInfo> {
        self.get_camera(name).map(Device::get_device_info)
    }

    /// Every device, including those that failed to open.
    #[must_use]
    pub fn get_all_cameras(&self) -> &[Device] {
        &self.cameras
    }

    /// Devices holding a live handle.
    #[must_use]
    pub fn get_active_cameras(&self) -> Vec<&Device> {
        self.cameras.iter().filter(|d| d.is_opened()).collect()
    }

    /// Mutable access to every device holding a live handle.
    pub fn active_cameras_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.cameras.iter_mut().filter(|d| d.is_opened())
    }

    /// Device names in configuration order.
    #[must_use]
    pub fn get_camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(Device::name).collect()
    }

    /// Why the fallback camera was used, if it was.
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<FallbackReason> {
        self.fallback
    }

    /// Print a summary of all devices to stdout.
    pub fn list_cameras(&self) {
        let stdout = io::stdout();
        if let Err(err) = self.write_summary(&mut stdout.lock()) {
            warn!("failed to write camera summary: {err}");
        }
    }

    /// Write a human-readable summary of all devices.
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Cameras ({}):", self.cameras.len())?;
        writeln!(out, "{}", "-".repeat(72))?;

        for camera in &self.cameras {
            let info = camera.get_device_info();
            let status = if info.opened { "active" } else { "inactive" };
            writeln!(
                out,
                "{:15} | {:8} | {}x{} (raw {}x{}, {}) | device {}",
                info.name,
                status,
                info.oriented_width,
                info.oriented_height,
                info.raw_width,
                info.raw_height,
                info.orientation,
                info.device_id
            )?;
        }
        Ok(())
    }

    /// Release every device in configuration order, then forget them.
    ///
    /// Idempotent. The manager stays usable but empty; recovering devices
    /// requires building a new manager.
    pub fn release_all(&mut self) {
        if self.cameras.is_empty() {
            return;
        }
        for camera in &mut self.cameras {
            camera.release();
        }
        self.cameras.clear();
        info!("all cameras released");
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn open_or_placeholder(backend: &dyn CaptureBackend, config: &DeviceConfig) -> Device {
    Device::open(backend, config).unwrap_or_else(|err| {
        warn!(name = %config.name, device_id = config.device_id, "{err}");
        Device::unopened(config)
    })
}
