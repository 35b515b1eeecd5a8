// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::device::{AuxDevice, AuxDeviceConfig, InitError};
#[cfg(any(test, feature = "testing"))]
use crate::device::InitFailure;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicUsize, Ordering};
use tracectl::trace_target;
use tracing::{debug, error, info, warn};

trace_target!("auxbus", LevelFilter::INFO, &["auxbus"]);

/// A driver for auxiliary devices.
pub trait AuxDriver: Send + Sync + 'static {
    /// What the devices this driver binds to carry.
    type Payload: Send + Sync + 'static;
    /// Probe failure.
    type Error: std::error::Error + Clone + Send + Sync + 'static;

    /// Driver name.
    fn name(&self) -> &str;

    /// Device names (`<module>.<name>`) the driver binds to.
    fn id_table(&self) -> &[&str];

    /// Bind to `adev`, matched by id table entry `id`.
    fn probe(&self, adev: &AuxDevice<Self::Payload>, id: &str) -> Result<(), Self::Error>;

    /// Unbind from `adev`.
    fn remove(&self, adev: &AuxDevice<Self::Payload>);
}

/// Failure to add a device to the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddError<E: std::error::Error + 'static> {
    /// A device with the same bus name is already on the bus.
    #[error("auxiliary device {0} already exists")]
    Exists(String),
    /// The device was added twice.
    #[error("auxiliary device {0} was already added")]
    AlreadyAdded(String),
    /// The matching driver failed to probe the device.  The device is no longer on the bus.
    #[error("probe of {name} failed: {source}")]
    Probe {
        name: String,
        #[source]
        source: E,
    },
    /// Refused by an injected failure.
    #[cfg(any(test, feature = "testing"))]
    #[error("injected failure")]
    Injected,
}

/// Driver registration failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("driver {0} is already registered")]
    Exists(String),
    #[error("driver {0} is not registered")]
    NotFound(String),
}

struct Entry<D: AuxDriver> {
    dev: AuxDevice<D::Payload>,
    driver: Option<Arc<D>>,
}

struct BusState<D: AuxDriver> {
    drivers: Vec<Arc<D>>,
    devices: BTreeMap<String, Entry<D>>,
}

/// The auxiliary bus: devices published by parent drivers, matched against registered drivers.
///
/// Probe and remove run without the bus lock held, so drivers may call back into the bus.
pub struct AuxiliaryBus<D: AuxDriver> {
    state: Mutex<BusState<D>>,
    #[cfg(any(test, feature = "testing"))]
    fail_init: AtomicUsize,
    #[cfg(any(test, feature = "testing"))]
    fail_add: AtomicUsize,
}

impl<D: AuxDriver> Default for AuxiliaryBus<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: AuxDriver> std::fmt::Debug for AuxiliaryBus<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AuxiliaryBus")
            .field("drivers", &state.drivers.len())
            .field("devices", &state.devices.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "testing"))]
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// The id table entry matching bus name `full` (`<module>.<name>.<id>`).
fn match_id(id_table: &[&str], full: &str) -> Option<String> {
    id_table
        .iter()
        .find(|id| {
            full.strip_prefix(**id)
                .and_then(|rest| rest.strip_prefix('.'))
                .is_some_and(|num| !num.contains('.'))
        })
        .map(|id| (*id).to_string())
}

impl<D: AuxDriver> AuxiliaryBus<D> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                drivers: Vec::new(),
                devices: BTreeMap::new(),
            }),
            #[cfg(any(test, feature = "testing"))]
            fail_init: AtomicUsize::new(0),
            #[cfg(any(test, feature = "testing"))]
            fail_add: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls to [`AuxiliaryBus::device_init`] fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_init(&self, count: usize) {
        self.fail_init.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls to [`AuxiliaryBus::add`] fail.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_add(&self, count: usize) {
        self.fail_add.store(count, Ordering::SeqCst);
    }

    /// Initialize a device.  On success the returned reference owns `payload` and the release
    /// function of `config` runs once every reference is gone.
    pub fn device_init(
        &self,
        config: AuxDeviceConfig<D::Payload>,
        payload: D::Payload,
    ) -> Result<AuxDevice<D::Payload>, InitError<D::Payload>> {
        #[cfg(any(test, feature = "testing"))]
        if take_one(&self.fail_init) {
            return Err(InitError {
                payload,
                reason: InitFailure::Injected,
            });
        }
        AuxDevice::init(config, payload)
    }

    /// Publish `dev` as `<modname>.<name>.<id>` and probe it with the first matching driver.
    ///
    /// Without a matching driver the device stays on the bus, unbound.  If probe fails the device
    /// is taken off the bus again.
    pub fn add(&self, dev: &AuxDevice<D::Payload>, modname: &str) -> Result<(), AddError<D::Error>> {
        #[cfg(any(test, feature = "testing"))]
        if take_one(&self.fail_add) {
            return Err(AddError::Injected);
        }
        let full = format!("{modname}.{}.{}", dev.name(), dev.id());
        let driver = {
            let mut state = self.state.lock();
            if state.devices.contains_key(&full) {
                return Err(AddError::Exists(full));
            }
            if !dev.set_dev_name(full.clone()) {
                return Err(AddError::AlreadyAdded(full));
            }
            state.devices.insert(
                full.clone(),
                Entry {
                    dev: dev.clone(),
                    driver: None,
                },
            );
            state.drivers.iter().find_map(|driver| {
                match_id(driver.id_table(), &full).map(|id| (Arc::clone(driver), id))
            })
        };
        debug!("added auxiliary device {full} (parent {})", dev.parent());
        let Some((driver, id)) = driver else {
            return Ok(());
        };
        match driver.probe(dev, &id) {
            Ok(()) => {
                info!("auxiliary device {full} bound to driver {}", driver.name());
                if let Some(entry) = self.state.lock().devices.get_mut(&full) {
                    entry.driver = Some(driver);
                }
                Ok(())
            }
            Err(source) => {
                error!("probe of auxiliary device {full} failed: {source}");
                let entry = self.state.lock().devices.remove(&full);
                drop(entry);
                Err(AddError::Probe { name: full, source })
            }
        }
    }

    /// Take `dev` off the bus, unbinding its driver first.
    pub fn delete(&self, dev: &AuxDevice<D::Payload>) {
        let Some(name) = dev.dev_name() else {
            warn!("delete of auxiliary device {} that was never added", dev.name());
            return;
        };
        let entry = self.state.lock().devices.remove(name);
        let Some(entry) = entry else {
            warn!("delete of unknown auxiliary device {name}");
            return;
        };
        if let Some(driver) = entry.driver {
            driver.remove(&entry.dev);
        }
        debug!("deleted auxiliary device {name}");
    }

    /// Register `driver` and probe every unbound device it matches.
    pub fn driver_register(&self, driver: Arc<D>) -> Result<(), DriverError> {
        let candidates: Vec<(AuxDevice<D::Payload>, String)> = {
            let mut state = self.state.lock();
            if state.drivers.iter().any(|d| d.name() == driver.name()) {
                return Err(DriverError::Exists(driver.name().to_string()));
            }
            state.drivers.push(Arc::clone(&driver));
            state
                .devices
                .iter()
                .filter(|(_, entry)| entry.driver.is_none())
                .filter_map(|(full, entry)| {
                    match_id(driver.id_table(), full).map(|id| (entry.dev.clone(), id))
                })
                .collect()
        };
        info!("registered auxiliary driver {}", driver.name());
        for (dev, id) in candidates {
            let name = dev.dev_name().unwrap_or_default().to_string();
            match driver.probe(&dev, &id) {
                Ok(()) => {
                    if let Some(entry) = self.state.lock().devices.get_mut(&name) {
                        entry.driver = Some(Arc::clone(&driver));
                    }
                }
                Err(e) => error!("probe of auxiliary device {name} failed: {e}"),
            }
        }
        Ok(())
    }

    /// Unregister the driver called `name`, unbinding every device it is bound to.  The devices
    /// stay on the bus.
    pub fn driver_unregister(&self, name: &str) -> Result<(), DriverError> {
        let bound: Vec<(Arc<D>, AuxDevice<D::Payload>)> = {
            let mut state = self.state.lock();
            let Some(pos) = state.drivers.iter().position(|d| d.name() == name) else {
                return Err(DriverError::NotFound(name.to_string()));
            };
            state.drivers.remove(pos);
            state
                .devices
                .values_mut()
                .filter(|entry| entry.driver.as_ref().is_some_and(|d| d.name() == name))
                .filter_map(|entry| entry.driver.take().map(|d| (d, entry.dev.clone())))
                .collect()
        };
        for (driver, dev) in bound {
            driver.remove(&dev);
        }
        info!("unregistered auxiliary driver {name}");
        Ok(())
    }

    /// A new reference to the device with bus name `name`.
    pub fn find(&self, name: &str) -> Option<AuxDevice<D::Payload>> {
        self.state.lock().devices.get(name).map(|entry| entry.dev.clone())
    }

    /// Whether the device with bus name `name` is bound to a driver.
    pub fn is_bound(&self, name: &str) -> bool {
        self.state
            .lock()
            .devices
            .get(name)
            .is_some_and(|entry| entry.driver.is_some())
    }

    /// Bus names of every device, in order.
    pub fn devices(&self) -> Vec<String> {
        self.state.lock().devices.keys().cloned().collect()
    }

    /// Read attribute `attr` of device `name` (`cat /sys/bus/auxiliary/devices/<name>/<attr>`).
    pub fn read_attr(&self, name: &str, attr: &str) -> Option<String> {
        self.find(name)?.show_attr(attr)
    }
}

#[cfg(test)]
mod test {
    use super::{AddError, AuxDriver, AuxiliaryBus, DriverError};
    use crate::device::{AuxDevice, AuxDeviceConfig, DeviceAttribute, InitFailure};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    struct Payload {
        sfnum: u32,
        released: Arc<AtomicUsize>,
    }

    fn release(payload: Payload, _id: u32) {
        payload.released.fetch_add(1, Ordering::SeqCst);
    }

    fn show_sfnum(dev: &AuxDevice<Payload>) -> String {
        format!("{}\n", dev.payload().sfnum)
    }

    static ATTRS: &[DeviceAttribute<Payload>] = &[DeviceAttribute {
        name: "sfnum",
        show: show_sfnum,
    }];
    static GROUPS: &[&[DeviceAttribute<Payload>]] = &[ATTRS];

    #[derive(Default)]
    struct Recorder {
        refuse: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    impl AuxDriver for Recorder {
        type Payload = Payload;
        type Error = Refused;

        fn name(&self) -> &str {
            "sf"
        }

        fn id_table(&self) -> &[&str] {
            &["ice.sf"]
        }

        fn probe(&self, adev: &AuxDevice<Payload>, id: &str) -> Result<(), Refused> {
            let name = adev.dev_name().unwrap_or_default();
            self.log.lock().push(format!("probe {name} {id}"));
            if self
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Refused);
            }
            Ok(())
        }

        fn remove(&self, adev: &AuxDevice<Payload>) {
            let name = adev.dev_name().unwrap_or_default();
            self.log.lock().push(format!("remove {name}"));
        }
    }

    fn config(id: u32) -> AuxDeviceConfig<Payload> {
        AuxDeviceConfig {
            name: "sf",
            id,
            parent: Some("0000:3b:00.0".to_string()),
            groups: GROUPS,
            release,
        }
    }

    fn payload(sfnum: u32, released: &Arc<AtomicUsize>) -> Payload {
        Payload {
            sfnum,
            released: Arc::clone(released),
        }
    }

    #[test]
    #[traced_test]
    fn add_probes_matching_driver() {
        let bus = AuxiliaryBus::new();
        let driver = Arc::new(Recorder::default());
        bus.driver_register(Arc::clone(&driver)).unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let dev = bus.device_init(config(1), payload(7, &released)).unwrap();
        bus.add(&dev, "ice").unwrap();
        assert_eq!(dev.dev_name(), Some("ice.sf.1"));
        assert!(bus.is_bound("ice.sf.1"));
        assert_eq!(bus.read_attr("ice.sf.1", "sfnum").as_deref(), Some("7\n"));
        assert_eq!(dev.attributes(), vec!["sfnum"]);
        assert!(bus.read_attr("ice.sf.1", "nope").is_none());

        bus.delete(&dev);
        assert!(bus.devices().is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 0);
        dev.uninit();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(
            *driver.log.lock(),
            vec!["probe ice.sf.1 ice.sf", "remove ice.sf.1"]
        );
        assert!(logs_contain("bound to driver sf"));
    }

    #[test]
    fn release_waits_for_last_reference() {
        let bus: AuxiliaryBus<Recorder> = AuxiliaryBus::new();
        let released = Arc::new(AtomicUsize::new(0));
        let dev = bus.device_init(config(2), payload(1, &released)).unwrap();
        let extra = dev.clone();
        assert_eq!(dev.refcount(), 2);
        dev.uninit();
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(extra.payload().sfnum, 1);
        drop(extra);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn failed_probe_unpublishes_device() {
        let bus = AuxiliaryBus::new();
        let driver = Arc::new(Recorder::default());
        driver.refuse.store(1, Ordering::SeqCst);
        bus.driver_register(Arc::clone(&driver)).unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let dev = bus.device_init(config(3), payload(3, &released)).unwrap();
        let err = bus.add(&dev, "ice").unwrap_err();
        assert_eq!(
            err,
            AddError::Probe {
                name: "ice.sf.3".to_string(),
                source: Refused
            }
        );
        assert!(bus.find("ice.sf.3").is_none());
        assert_eq!(dev.refcount(), 1);
        dev.uninit();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(logs_contain("probe of auxiliary device ice.sf.3 failed"));
    }

    #[test]
    fn init_failure_returns_payload() {
        let bus: AuxiliaryBus<Recorder> = AuxiliaryBus::new();
        let released = Arc::new(AtomicUsize::new(0));
        let mut cfg = config(4);
        cfg.parent = None;
        let err = bus.device_init(cfg, payload(4, &released)).unwrap_err();
        assert_eq!(err.reason, InitFailure::NoParent);
        assert_eq!(err.payload.sfnum, 4);

        let mut cfg = config(4);
        cfg.name = "s.f";
        let err = bus.device_init(cfg, payload(4, &released)).unwrap_err();
        assert_eq!(err.reason, InitFailure::InvalidName("s.f"));

        bus.fail_next_init(1);
        let err = bus.device_init(config(4), payload(4, &released)).unwrap_err();
        assert_eq!(err.reason, InitFailure::Injected);
        drop(err);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_and_injected_add() {
        let bus: AuxiliaryBus<Recorder> = AuxiliaryBus::new();
        let released = Arc::new(AtomicUsize::new(0));
        let a = bus.device_init(config(5), payload(5, &released)).unwrap();
        let b = bus.device_init(config(5), payload(6, &released)).unwrap();
        bus.add(&a, "ice").unwrap();
        assert_eq!(
            bus.add(&b, "ice").unwrap_err(),
            AddError::Exists("ice.sf.5".to_string())
        );
        assert_eq!(
            bus.add(&a, "ice").unwrap_err(),
            AddError::Exists("ice.sf.5".to_string())
        );
        let c = bus.device_init(config(6), payload(6, &released)).unwrap();
        bus.fail_next_add(1);
        assert_eq!(bus.add(&c, "ice").unwrap_err(), AddError::Injected);
        assert!(c.dev_name().is_none());
        // unbound: no driver registered
        assert!(!bus.is_bound("ice.sf.5"));
    }

    #[test]
    fn late_driver_binds_and_unbinds() {
        let bus = AuxiliaryBus::new();
        let released = Arc::new(AtomicUsize::new(0));
        let dev = bus.device_init(config(8), payload(8, &released)).unwrap();
        bus.add(&dev, "ice").unwrap();
        let other = bus.device_init(config(9), payload(9, &released)).unwrap();
        bus.add(&other, "mlx5_core").unwrap();

        let driver = Arc::new(Recorder::default());
        bus.driver_register(Arc::clone(&driver)).unwrap();
        assert!(bus.is_bound("ice.sf.8"));
        assert!(!bus.is_bound("mlx5_core.sf.9"));
        assert_eq!(
            bus.driver_register(Arc::new(Recorder::default())),
            Err(DriverError::Exists("sf".to_string()))
        );

        bus.driver_unregister("sf").unwrap();
        assert!(!bus.is_bound("ice.sf.8"));
        assert!(bus.find("ice.sf.8").is_some());
        assert_eq!(
            bus.driver_unregister("sf"),
            Err(DriverError::NotFound("sf".to_string()))
        );
        assert_eq!(
            *driver.log.lock(),
            vec!["probe ice.sf.8 ice.sf", "remove ice.sf.8"]
        );
    }
}
