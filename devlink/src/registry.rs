// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::instance::{Devlink, DevlinkError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// The set of registered devlink instances, by handle.
#[derive(Debug, Default)]
pub struct DevlinkRegistry {
    instances: Mutex<BTreeMap<String, Arc<Devlink>>>,
    #[cfg(any(test, feature = "testing"))]
    fail_instance_ports: AtomicUsize,
}

impl DevlinkRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` instances registered refuse their first port registration.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_instance_ports(&self, count: usize) {
        self.fail_instance_ports.store(count, Ordering::SeqCst);
    }

    /// Make `devlink` visible to administrators.
    pub fn register(&self, devlink: &Arc<Devlink>) -> Result<(), DevlinkError> {
        let mut instances = self.instances.lock();
        if devlink.is_registered() {
            return Err(DevlinkError::AlreadyRegistered(devlink.handle().to_string()));
        }
        if instances.contains_key(devlink.handle()) {
            return Err(DevlinkError::InstanceExists(devlink.handle().to_string()));
        }
        instances.insert(devlink.handle().to_string(), Arc::clone(devlink));
        #[cfg(any(test, feature = "testing"))]
        if self
            .fail_instance_ports
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            devlink.fail_next_port_registrations(1);
        }
        devlink.set_registered(true);
        debug!("registered devlink instance {}", devlink.handle());
        Ok(())
    }

    /// Withdraw `devlink`.  Its ports stay as they are.
    pub fn unregister(&self, devlink: &Devlink) {
        let removed = self.instances.lock().remove(devlink.handle());
        if removed.is_none() {
            warn!("unregister of unknown devlink instance {}", devlink.handle());
            return;
        }
        devlink.set_registered(false);
        debug!("unregistered devlink instance {}", devlink.handle());
    }

    pub fn get(&self, handle: &str) -> Option<Arc<Devlink>> {
        self.instances.lock().get(handle).cloned()
    }

    /// Every registered instance, in handle order.
    pub fn instances(&self) -> Vec<Arc<Devlink>> {
        self.instances.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::DevlinkRegistry;
    use crate::instance::{Devlink, DevlinkError};
    use crate::port::{PortFlavour, PortIndex};
    use std::sync::Arc;

    #[test]
    fn register_and_unregister() {
        let registry = DevlinkRegistry::new();
        let pf = Arc::new(Devlink::alloc("pci", "0000:3b:00.0"));
        let sf = Arc::new(Devlink::alloc("auxiliary", "ice.sf.1"));
        registry.register(&pf).unwrap();
        registry.register(&sf).unwrap();
        assert!(pf.is_registered());
        assert!(matches!(
            registry.register(&pf),
            Err(DevlinkError::AlreadyRegistered(_))
        ));
        let twin = Arc::new(Devlink::alloc("pci", "0000:3b:00.0"));
        assert!(matches!(
            registry.register(&twin),
            Err(DevlinkError::InstanceExists(_))
        ));
        let handles: Vec<_> = registry
            .instances()
            .iter()
            .map(|d| d.handle().to_string())
            .collect();
        assert_eq!(handles, vec!["auxiliary/ice.sf.1", "pci/0000:3b:00.0"]);

        registry.unregister(&sf);
        assert!(!sf.is_registered());
        assert!(registry.get("auxiliary/ice.sf.1").is_none());
        assert!(registry.get("pci/0000:3b:00.0").is_some());
    }

    #[test]
    fn instance_port_faults_apply_to_the_next_instance() {
        let registry = DevlinkRegistry::new();
        registry.fail_next_instance_ports(1);
        let sf = Arc::new(Devlink::alloc("auxiliary", "ice.sf.2"));
        registry.register(&sf).unwrap();
        assert_eq!(
            sf.port_register(PortIndex::from_raw(4), PortFlavour::Virtual),
            Err(DevlinkError::Injected)
        );
        sf.port_register(PortIndex::from_raw(4), PortFlavour::Virtual)
            .unwrap();
        let other = Arc::new(Devlink::alloc("auxiliary", "ice.sf.3"));
        registry.register(&other).unwrap();
        other
            .port_register(PortIndex::from_raw(5), PortFlavour::Virtual)
            .unwrap();
    }
}
