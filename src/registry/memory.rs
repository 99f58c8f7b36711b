//! In-memory registry
//!
//! Backs small deployments and the test suite. A single mutex serializes
//! all access; transactions stage their writes on a copy of the state and
//! swap it in on success, so a failed transaction leaves nothing behind.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{
    DevAddr, Device, Gateway, IgnoredLink, Link, PendingDownlink, Registry, RegistryError,
    RxFrame, Transaction, EUI64,
};

#[derive(Debug, Clone, Default)]
struct Shared {
    gateways: HashMap<EUI64, Gateway>,
    devices: HashMap<EUI64, Device>,
    links: HashMap<DevAddr, Link>,
    pending: HashMap<DevAddr, PendingDownlink>,
    ignored: Vec<IgnoredLink>,
    frames: Vec<RxFrame>,
    next_frame_id: u64,
}

/// Registry keeping all records in process memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    shared: Mutex<Shared>,
}

impl MemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a gateway
    pub fn insert_gateway(&self, gateway: Gateway) {
        self.shared.lock().gateways.insert(gateway.mac, gateway);
    }

    /// Provision a device
    pub fn insert_device(&self, device: Device) {
        self.shared.lock().devices.insert(device.dev_eui, device);
    }

    /// Provision a session directly (ABP-style activation)
    pub fn insert_link(&self, link: Link) {
        self.shared.lock().links.insert(link.dev_addr, link);
    }

    /// Add an ignored-address range
    pub fn insert_ignored_link(&self, ignored: IgnoredLink) {
        self.shared.lock().ignored.push(ignored);
    }

    /// Snapshot of the uplink frame log
    pub fn rx_frames(&self) -> Vec<RxFrame> {
        self.shared.lock().frames.clone()
    }
}

impl Registry for MemoryRegistry {
    fn gateway(&self, mac: &EUI64) -> Result<Option<Gateway>, RegistryError> {
        Ok(self.shared.lock().gateways.get(mac).cloned())
    }

    fn update_gateway(&self, gateway: &Gateway) -> Result<(), RegistryError> {
        self.shared
            .lock()
            .gateways
            .insert(gateway.mac, gateway.clone());
        Ok(())
    }

    fn device(&self, dev_eui: &EUI64) -> Result<Option<Device>, RegistryError> {
        Ok(self.shared.lock().devices.get(dev_eui).cloned())
    }

    fn link(&self, dev_addr: &DevAddr) -> Result<Option<Link>, RegistryError> {
        Ok(self.shared.lock().links.get(dev_addr).cloned())
    }

    fn pending_downlink(
        &self,
        dev_addr: &DevAddr,
    ) -> Result<Option<PendingDownlink>, RegistryError> {
        Ok(self.shared.lock().pending.get(dev_addr).cloned())
    }

    fn store_pending_downlink(&self, pending: &PendingDownlink) -> Result<(), RegistryError> {
        self.shared
            .lock()
            .pending
            .insert(pending.dev_addr, pending.clone());
        Ok(())
    }

    fn clear_pending_downlink(&self, dev_addr: &DevAddr) -> Result<(), RegistryError> {
        self.shared.lock().pending.remove(dev_addr);
        Ok(())
    }

    fn ignored_links(&self) -> Result<Vec<IgnoredLink>, RegistryError> {
        Ok(self.shared.lock().ignored.clone())
    }

    fn append_rx_frame(&self, mut frame: RxFrame) -> Result<u64, RegistryError> {
        let mut shared = self.shared.lock();
        shared.next_frame_id += 1;
        frame.frame_id = shared.next_frame_id;
        shared.frames.push(frame);
        Ok(shared.next_frame_id)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
    {
        let mut shared = self.shared.lock();
        let mut staged = shared.clone();
        let value = f(&mut MemoryTransaction {
            state: &mut staged,
        })?;
        *shared = staged;
        Ok(value)
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut Shared,
}

impl Transaction for MemoryTransaction<'_> {
    fn device(&mut self, dev_eui: &EUI64) -> Result<Option<Device>, RegistryError> {
        Ok(self.state.devices.get(dev_eui).cloned())
    }

    fn put_device(&mut self, device: &Device) -> Result<(), RegistryError> {
        self.state.devices.insert(device.dev_eui, device.clone());
        Ok(())
    }

    fn link(&mut self, dev_addr: &DevAddr) -> Result<Option<Link>, RegistryError> {
        Ok(self.state.links.get(dev_addr).cloned())
    }

    fn put_link(&mut self, link: &Link) -> Result<(), RegistryError> {
        self.state.links.insert(link.dev_addr, link.clone());
        Ok(())
    }

    fn clear_pending_downlink(&mut self, dev_addr: &DevAddr) -> Result<(), RegistryError> {
        self.state.pending.remove(dev_addr);
        Ok(())
    }
}
