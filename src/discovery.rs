//! Informational device discovery.
//!
//! Discovery results are only logged; they never decide which device a
//! configuration record opens.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

/// A capture device found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Numeric id when the path follows the `videoN` convention.
    pub device_id: Option<u32>,
    /// Device node.
    pub path: PathBuf,
    /// Driver-provided description.
    pub description: String,
}

/// Source of discovered devices.
pub trait DeviceDiscovery: Send + Sync {
    /// List devices currently attached.
    fn list_devices(&self) -> Vec<DiscoveredDevice>;
}

/// Discovery through `/sys/class/video4linux`.
#[derive(Debug, Clone)]
pub struct SysfsDiscovery {
    root: PathBuf,
}

impl Default for SysfsDiscovery {
    fn default() -> Self {
        Self::with_root("/sys/class/video4linux")
    }
}

impl SysfsDiscovery {
    /// Scan a sysfs-style directory other than the default.
    #[must_use]
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl DeviceDiscovery for SysfsDiscovery {
    fn list_devices(&self) -> Vec<DiscoveredDevice> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut devices: Vec<DiscoveredDevice> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let node = entry.file_name().to_string_lossy().into_owned();
                let device_id = node.strip_prefix("video")?.parse().ok();
                let description = fs::read_to_string(entry.path().join("name"))
                    .map(|name| name.trim().to_owned())
                    .unwrap_or_default();
                Some(DiscoveredDevice {
                    device_id,
                    path: Path::new("/dev").join(&node),
                    description,
                })
            })
            .collect();

        devices.sort_by_key(|device| (device.device_id.is_none(), device.device_id, device.path.clone()));
        devices
    }
}

/// Log every discovered device. Returns how many were found.
pub fn log_devices(discovery: &dyn DeviceDiscovery) -> usize {
    let devices = discovery.list_devices();
    info!("found {} capture devices", devices.len());
    for device in &devices {
        info!(
            path = %device.path.display(),
            "  {}",
            if device.description.is_empty() { "unknown" } else { device.description.as_str() }
        );
    }
    devices.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(entries: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        for (node, name) in entries {
            let node_dir = dir.path().join(node);
            fs::create_dir(&node_dir).expect("node dir should be created");
            fs::write(node_dir.join("name"), format!("{name}\n")).expect("name should be written");
        }
        dir
    }

    #[test]
    fn test_lists_video_nodes_in_order() {
        let dir = fake_sysfs(&[("video10", "vivid"), ("video2", "USB Camera"), ("video0", "Integrated")]);
        let devices = SysfsDiscovery::with_root(dir.path()).list_devices();

        let ids: Vec<_> = devices.iter().map(|d| d.device_id).collect();
        assert_eq!(ids, vec![Some(0), Some(2), Some(10)]);
        assert_eq!(devices[0].path, PathBuf::from("/dev/video0"));
        assert_eq!(devices[1].description, "USB Camera");
    }

    #[test]
    fn test_ignores_other_nodes() {
        let dir = fake_sysfs(&[("v4l-subdev0", "sensor"), ("video1", "cam")]);
        let devices = SysfsDiscovery::with_root(dir.path()).list_devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, Some(1));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let discovery = SysfsDiscovery::with_root("/nonexistent/video4linux");
        assert!(discovery.list_devices().is_empty());
        assert_eq!(log_devices(&discovery), 0);
    }
}
