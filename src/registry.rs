//! Process-scoped holder that builds the [`DeviceManager`] once.
//!
//! Create one `Registry` at startup and hand references to whatever needs
//! camera state. The first [`Registry::get_instance`] reads configuration and
//! opens the devices; later calls return the same manager until
//! [`Registry::reset`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::config::ConfigSource;
use crate::discovery::{log_devices, DeviceDiscovery};
use crate::manager::DeviceManager;
use crate::traits::CaptureBackend;

/// Shared handle to the constructed manager.
pub type SharedManager = Arc<Mutex<DeviceManager>>;

/// Lazily constructed, resettable owner of the camera set.
pub struct Registry {
    backend: Arc<dyn CaptureBackend>,
    source: Arc<dyn ConfigSource>,
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    instance: Mutex<Option<SharedManager>>,
}

impl Registry {
    /// A registry that will open devices on `backend` as described by
    /// `source`.
    pub fn new(backend: Arc<dyn CaptureBackend>, source: Arc<dyn ConfigSource>) -> Self {
        Self {
            backend,
            source,
            discovery: None,
            instance: Mutex::new(None),
        }
    }

    /// Log devices found by `discovery` whenever the manager is built.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn DeviceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// The manager, building it on first use.
    pub fn get_instance(&self) -> SharedManager {
        let mut slot = self.slot();
        if let Some(manager) = slot.as_ref() {
            return Arc::clone(manager);
        }

        if let Some(discovery) = &self.discovery {
            log_devices(discovery.as_ref());
        }
        let manager = Arc::new(Mutex::new(DeviceManager::from_source(
            self.backend.as_ref(),
            self.source.as_ref(),
        )));
        *slot = Some(Arc::clone(&manager));
        manager
    }

    /// Whether the manager has been built.
    pub fn is_initialized(&self) -> bool {
        self.slot().is_some()
    }

    /// Release all devices and forget the manager, so the next
    /// [`Registry::get_instance`] re-reads configuration. Returns whether a
    /// manager existed.
    pub fn reset(&self) -> bool {
        let Some(manager) = self.slot().take() else {
            return false;
        };
        lock_manager(&manager).release_all();
        info!("camera registry reset");
        true
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Registry {
    fn slot(&self) -> MutexGuard<'_, Option<SharedManager>> {
        self.instance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock a shared manager, recovering from a poisoned lock.
///
/// Every manager operation leaves it consistent, so a panic elsewhere while
/// holding the lock does not invalidate the camera set.
pub fn lock_manager(manager: &SharedManager) -> MutexGuard<'_, DeviceManager> {
    manager.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::mock::{MockBackend, MockCamera};

    fn registry(backend: &MockBackend) -> Registry {
        let source: Vec<DeviceConfig> = vec![DeviceConfig::new("front", 0)];
        Registry::new(Arc::new(backend.clone()), Arc::new(source))
    }

    #[test]
    fn test_constructs_once() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new());
        let registry = registry(&backend);
        assert!(!registry.is_initialized());

        let first = registry.get_instance();
        let second = registry.get_instance();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_initialized());
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_release_all_keeps_instance() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new());
        let registry = registry(&backend);

        lock_manager(&registry.get_instance()).release_all();

        let manager = registry.get_instance();
        assert!(lock_manager(&manager).get_camera_names().is_empty());
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_reset_rebuilds() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new());
        let registry = registry(&backend);

        let first = registry.get_instance();
        assert!(registry.reset());
        assert_eq!(backend.live_handles(0), 0);
        assert!(lock_manager(&first).get_camera_names().is_empty());

        let second = registry.get_instance();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(lock_manager(&second).get_camera_names(), vec!["front"]);
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn test_reset_without_instance() {
        let backend = MockBackend::new();
        assert!(!registry(&backend).reset());
    }

    #[test]
    fn test_discovery_does_not_affect_matching() {
        let backend = MockBackend::new().with_camera(0, MockCamera::new());
        let discovery = MockBackend::new().with_camera(5, MockCamera::new());
        let registry = registry(&backend).with_discovery(Arc::new(discovery));

        let manager = registry.get_instance();
        let manager = lock_manager(&manager);
        assert_eq!(manager.get_camera_names(), vec!["front"]);
        assert_eq!(manager.get_camera("front").map(crate::Device::device_id), Some(0));
    }
}
