//! Policy turning a configuration outcome into the set of devices to open.

use std::collections::HashSet;
use std::fmt;

use tracing::warn;

use crate::config::{DeviceConfig, DeviceRecords};
use crate::error::ConfigResult;

/// Why the fallback camera was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The device list could not be read.
    Unreadable,
    /// The device list held no usable record.
    NoValidRecords,
    /// Records were usable but none of them opened.
    NoDeviceOpened,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable => write!(f, "configuration unreadable"),
            Self::NoValidRecords => write!(f, "no valid camera records"),
            Self::NoDeviceOpened => write!(f, "no configured camera opened"),
        }
    }
}

/// Devices to open, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePlan {
    /// Records to open.
    pub devices: Vec<DeviceConfig>,
    /// Set when `devices` is the fallback camera.
    pub fallback: Option<FallbackReason>,
}

/// Decide which devices to open.
///
/// - Unreadable configuration yields the fallback camera.
/// - Malformed records are logged and dropped; the rest keep their order.
/// - A repeated name keeps its first record.
/// - No usable record at all yields the fallback camera.
pub fn plan_devices(outcome: ConfigResult<DeviceRecords>) -> DevicePlan {
    let records = match outcome {
        Ok(records) => records,
        Err(err) => {
            warn!("cannot read camera configuration: {err}");
            return fallback_plan(FallbackReason::Unreadable);
        }
    };

    let mut seen = HashSet::new();
    let mut devices = Vec::with_capacity(records.len());
    for record in records {
        match record {
            Ok(config) if seen.contains(&config.name) => {
                warn!(name = %config.name, device_id = config.device_id, "duplicate camera name, skipping record");
            }
            Ok(config) => {
                seen.insert(config.name.clone());
                devices.push(config);
            }
            Err(err) => warn!("skipping camera record: {err}"),
        }
    }

    if devices.is_empty() {
        return fallback_plan(FallbackReason::NoValidRecords);
    }
    DevicePlan {
        devices,
        fallback: None,
    }
}

/// The single-camera plan used whenever configuration cannot be honored.
#[must_use]
pub fn fallback_plan(reason: FallbackReason) -> DevicePlan {
    DevicePlan {
        devices: vec![DeviceConfig::fallback()],
        fallback: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_unreadable_config_falls_back() {
        let plan = plan_devices(Err(ConfigError::Missing("webcam_plugin.devices".to_owned())));
        assert_eq!(plan.fallback, Some(FallbackReason::Unreadable));
        assert_eq!(plan.devices, vec![DeviceConfig::fallback()]);
    }

    #[test]
    fn test_empty_list_falls_back() {
        let plan = plan_devices(Ok(Vec::new()));
        assert_eq!(plan.fallback, Some(FallbackReason::NoValidRecords));
        assert_eq!(plan.devices.len(), 1);
    }

    #[test]
    fn test_only_invalid_records_fall_back() {
        let bad = ConfigError::InvalidRecord {
            index: 0,
            reason: "width must be positive".to_owned(),
        };
        let plan = plan_devices(Ok(vec![Err(bad)]));
        assert_eq!(plan.fallback, Some(FallbackReason::NoValidRecords));
    }

    #[test]
    fn test_invalid_records_are_dropped_in_order() {
        let bad = ConfigError::InvalidRecord {
            index: 1,
            reason: "bad".to_owned(),
        };
        let plan = plan_devices(Ok(vec![
            Ok(DeviceConfig::new("a", 0)),
            Err(bad),
            Ok(DeviceConfig::new("b", 1)),
        ]));
        assert_eq!(plan.fallback, None);
        let names: Vec<_> = plan.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let plan = plan_devices(Ok(vec![
            Ok(DeviceConfig::new("cam", 0)),
            Ok(DeviceConfig::new("cam", 1)),
        ]));
        assert_eq!(plan.devices.len(), 1);
        assert_eq!(plan.devices[0].device_id, 0);
    }
}
