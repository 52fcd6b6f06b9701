//! Camera configuration.
//!
//! [`ConfigStore`] is a read-only key-value view over TOML, addressed by
//! dotted paths such as `webcam_plugin.devices`. Each entry of that array is
//! one [`DeviceConfig`] record.

use std::path::Path;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::error::{ConfigError, ConfigResult};

/// Name given to the camera synthesized when configuration is unusable.
pub const FALLBACK_CAMERA_NAME: &str = "default_camera";

/// Declarative description of one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Lookup key, unique within a manager.
    #[serde(default = "default_name")]
    pub name: String,
    /// Numeric backend device id (0 for `/dev/video0`).
    pub device_id: u32,
    /// Requested raw capture width.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Requested raw capture height.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Rotation in degrees; snapped to a multiple of 90 when opened.
    #[serde(default)]
    pub orientation: f64,
    /// Requested number of driver buffers.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
}

fn default_name() -> String {
    FALLBACK_CAMERA_NAME.to_owned()
}

const fn default_width() -> u32 {
    640
}

const fn default_height() -> u32 {
    480
}

const fn default_buffer_size() -> u32 {
    1
}

impl DeviceConfig {
    /// A record with default geometry for `device_id`.
    #[must_use]
    pub fn new<S: Into<String>>(name: S, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
            width: default_width(),
            height: default_height(),
            orientation: 0.0,
            buffer_size: default_buffer_size(),
        }
    }

    /// The fallback camera: device 0, 640x480, no rotation, one buffer.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(FALLBACK_CAMERA_NAME, 0)
    }

    /// Set the requested raw resolution.
    #[must_use]
    pub const fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the rotation in degrees.
    #[must_use]
    pub const fn with_orientation(mut self, degrees: f64) -> Self {
        self.orientation = degrees;
        self
    }

    /// Set the requested buffer count.
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: u32) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Check the positivity constraints. `index` is only used in the error.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::InvalidRecord { index, reason };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty".to_owned()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "'{}': resolution {}x{} must be positive",
                self.name, self.width, self.height
            )));
        }
        if self.buffer_size == 0 {
            return Err(invalid(format!("'{}': buffer_size must be positive", self.name)));
        }
        Ok(())
    }
}

/// Per-record outcome of reading the device list.
pub type DeviceRecords = Vec<ConfigResult<DeviceConfig>>;

/// Read-only access to the device list.
pub trait ConfigSource: Send + Sync {
    /// Read the ordered device records.
    ///
    /// The outer error means the list itself is unavailable; inner errors
    /// mark individual malformed records.
    fn device_records(&self) -> ConfigResult<DeviceRecords>;
}

/// TOML-backed configuration store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    root: Table,
}

impl ConfigStore {
    /// Dotted path of the device list.
    pub const DEVICES_KEY: &'static str = "webcam_plugin.devices";

    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(Self {
            root: toml::from_str(content)?,
        })
    }

    /// Read and parse a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Look up a value by dotted path.
    #[must_use]
    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let mut parts = dotted.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// Layer `overlay` on top of this store. Tables merge recursively; any
    /// other value in the overlay replaces the existing one.
    pub fn merge(&mut self, overlay: Self) {
        merge_tables(&mut self.root, overlay.root);
    }
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl ConfigSource for ConfigStore {
    fn device_records(&self) -> ConfigResult<DeviceRecords> {
        let value = self
            .get(Self::DEVICES_KEY)
            .ok_or_else(|| ConfigError::Missing(Self::DEVICES_KEY.to_owned()))?;
        let entries = value.as_array().ok_or_else(|| ConfigError::InvalidValue {
            key: Self::DEVICES_KEY.to_owned(),
            reason: format!("expected an array, found {}", value.type_str()),
        })?;

        Ok(entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let config: DeviceConfig =
                    entry
                        .clone()
                        .try_into()
                        .map_err(|err: toml::de::Error| ConfigError::InvalidRecord {
                            index,
                            reason: err.message().to_owned(),
                        })?;
                config.validate(index)?;
                Ok(config)
            })
            .collect())
    }
}

impl ConfigSource for Vec<DeviceConfig> {
    fn device_records(&self) -> ConfigResult<DeviceRecords> {
        Ok(self
            .iter()
            .enumerate()
            .map(|(index, config)| config.validate(index).map(|()| config.clone()))
            .collect())
    }
}

/// A configuration that failed to load still acts as a source: it reports
/// the device list as unavailable.
impl<S: ConfigSource> ConfigSource for ConfigResult<S> {
    fn device_records(&self) -> ConfigResult<DeviceRecords> {
        match self {
            Ok(source) => source.device_records(),
            Err(err) => Err(ConfigError::Unavailable(err.to_string())),
        }
    }
}
