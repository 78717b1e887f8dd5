use std::collections::HashMap;

use tracing::warn;

use crate::types::{Device, SmartHome, Zone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Location {
    home: usize,
    zone: usize,
    device: usize,
}

/// Cached smart home → zone → device tree with a device-id index.
///
/// Device ids are unique across the whole tree; the first occurrence wins
/// if the API ever reports a duplicate.
#[derive(Debug, Clone, Default)]
pub(crate) struct SmartHomeTree {
    homes: Vec<SmartHome>,
    index: HashMap<String, Location>,
}

impl SmartHomeTree {
    pub fn homes(&self) -> &[SmartHome] {
        &self.homes
    }

    pub fn home(&self, smarthome_id: &str) -> Option<&SmartHome> {
        self.homes.iter().find(|h| h.smarthome_id == smarthome_id)
    }

    pub fn home_ids(&self) -> Vec<String> {
        self.homes.iter().map(|h| h.smarthome_id.clone()).collect()
    }

    /// Swap in a freshly loaded tree.
    pub fn replace_all(&mut self, homes: Vec<SmartHome>) {
        self.homes = homes;
        self.rebuild_index();
    }

    /// Swap in the zones of one known home. Returns false for unknown homes.
    pub fn replace_zones(&mut self, smarthome_id: &str, zones: Vec<Zone>) -> bool {
        let Some(home) = self.homes.iter_mut().find(|h| h.smarthome_id == smarthome_id) else {
            return false;
        };
        home.zones = zones;
        self.rebuild_index();
        true
    }

    pub fn device(&self, smarthome_id: &str, device_id: &str) -> Option<&Device> {
        let loc = self.locate(smarthome_id, device_id)?;
        Some(&self.homes[loc.home].zones[loc.zone].devices[loc.device])
    }

    /// Overwrite a cached record in place, returning the one it replaced.
    /// The slot stays keyed by `device_id`; the record's own `id` is
    /// overwritten to match.
    pub fn set_device(&mut self, smarthome_id: &str, device_id: &str, mut record: Device) -> Option<Device> {
        let loc = self.locate(smarthome_id, device_id)?;
        record.id = device_id.to_string();
        let slot = &mut self.homes[loc.home].zones[loc.zone].devices[loc.device];
        Some(std::mem::replace(slot, record))
    }

    fn locate(&self, smarthome_id: &str, device_id: &str) -> Option<Location> {
        let loc = *self.index.get(device_id)?;
        (self.homes[loc.home].smarthome_id == smarthome_id).then_some(loc)
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (h, home) in self.homes.iter().enumerate() {
            for (z, zone) in home.zones.iter().enumerate() {
                for (d, device) in zone.devices.iter().enumerate() {
                    if let Some(existing) = self.index.get(&device.id) {
                        warn!(
                            device_id = %device.id,
                            smarthome_id = %home.smarthome_id,
                            first_home = %self.homes[existing.home].smarthome_id,
                            "duplicate device id, keeping first"
                        );
                        continue;
                    }
                    self.index.insert(
                        device.id.clone(),
                        Location {
                            home: h,
                            zone: z,
                            device: d,
                        },
                    );
                }
            }
        }
    }
}
