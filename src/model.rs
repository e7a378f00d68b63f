use crate::api::response::switch_group::SwitchGroupEntry;
use crate::api::response::{to_i64, SparseTable};
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Switch group slots the device supports.
pub const MAX_SWITCH_GROUPS: usize = 10;

type Watt = i64;
type WattHours = i64;

/// Device class as encoded by the single set bit of a classification record's bitmask. The
/// labels are the vendor's own and are published verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize)]
pub enum DeviceClass {
    Inverter = 0,
    Sensor = 1,
    Meter = 2,
    HybridSystem = 3,
    Battery = 4,
    SmartConsumer = 5,
    Switch = 6,
    HeatPump = 7,
    HeatingRod = 8,
    ChargingStation = 9,
}

impl Default for DeviceClass {
    fn default() -> Self {
        DeviceClass::Inverter
    }
}

impl DeviceClass {
    /// Resolve a class bitmask. Only exact powers of two inside the known range map to a class.
    pub fn from_mask(mask: u64) -> Option<DeviceClass> {
        if !mask.is_power_of_two() {
            return None;
        }
        num::FromPrimitive::from_u32(mask.trailing_zeros())
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceClass::Inverter => "Wechselrichter",
            DeviceClass::Sensor => "Sensor",
            DeviceClass::Meter => "Zähler",
            DeviceClass::HybridSystem => "Hybrid-System",
            DeviceClass::Battery => "Batterie",
            DeviceClass::SmartConsumer => "Intelligente Verbraucher",
            DeviceClass::Switch => "Schalter",
            DeviceClass::HeatPump => "Wärmepumpe",
            DeviceClass::HeatingRod => "Heizstab",
            DeviceClass::ChargingStation => "Ladestation",
        }
    }
}

/// Entry of the classification table (739): `[brand index, type name, _, _, _, class bitmask, ...]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceRecord {
    pub brand_index: Option<usize>,
    pub type_name: Option<String>,
    pub class_mask: Option<u64>,
}

impl<'de> Deserialize<'de> for DeviceRecord {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let items = match Value::deserialize(d)? {
            Value::Array(items) => items,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected device record array, got {}",
                    other
                )))
            }
        };

        Ok(DeviceRecord {
            brand_index: items
                .get(0)
                .and_then(to_i64)
                .and_then(|i| usize::try_from(i).ok()),
            type_name: items.get(1).and_then(Value::as_str).map(String::from),
            class_mask: items
                .get(5)
                .and_then(to_i64)
                .and_then(|m| u64::try_from(m).ok()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("no classification record for code {0}")]
    UnknownCode(i64),
    #[error("device has no info code")]
    MissingCode,
    #[error("class bitmask {0} does not name a device class")]
    ClassMask(u64),
}

/// Result of classifying one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub device_type: String,
    pub brand: String,
    pub class: DeviceClass,
}

impl Default for Classification {
    fn default() -> Self {
        Classification {
            device_type: String::from("Unknown"),
            brand: String::from("Unknown"),
            class: DeviceClass::Inverter,
        }
    }
}

/// Vendor lookup tables captured from the startup response.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTables {
    pub device_list: SparseTable<DeviceRecord>,
    pub brand_list: SparseTable<String>,
}

impl ClassificationTables {
    pub fn is_complete(&self) -> bool {
        !self.device_list.is_empty() && !self.brand_list.is_empty()
    }

    pub fn classify(&self, info_code: Option<i64>) -> Result<Classification, ClassificationError> {
        let code = info_code.ok_or(ClassificationError::MissingCode)?;
        let record = usize::try_from(code)
            .ok()
            .and_then(|index| self.device_list.get(index))
            .ok_or(ClassificationError::UnknownCode(code))?;

        let class = match record.class_mask {
            None | Some(0) => DeviceClass::default(),
            Some(mask) => DeviceClass::from_mask(mask).ok_or(ClassificationError::ClassMask(mask))?,
        };

        Ok(Classification {
            device_type: record
                .type_name
                .clone()
                .unwrap_or_else(|| String::from("Unknown")),
            brand: record
                .brand_index
                .and_then(|index| self.brand_list.get(index))
                .cloned()
                .unwrap_or_else(|| String::from("Unknown")),
            class,
        })
    }
}

/// One discovered device. Name, info code and classification live together so the per-device
/// sequences cannot drift apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    pub name: String,
    pub info_code: Option<i64>,
    pub classification: Classification,
}

impl DeviceProfile {
    pub fn unclassified(name: String, info_code: Option<i64>) -> DeviceProfile {
        DeviceProfile {
            name,
            info_code,
            classification: Classification::default(),
        }
    }

    pub fn is_battery(&self) -> bool {
        self.classification.class == DeviceClass::Battery
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceTopology {
    /// Count established by the startup status scan
    pub num_inverters: usize,
    pub profiles: Vec<DeviceProfile>,
    pub battery_index: BTreeSet<usize>,
    pub classified: bool,
}

impl DeviceTopology {
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.profiles.get(index).map(|p| p.name.as_str())
    }

    pub fn is_battery(&self, index: usize) -> bool {
        self.battery_index.contains(&index)
    }

    /// The device battery figures are published under.
    pub fn battery(&self) -> Option<&DeviceProfile> {
        self.battery_index
            .iter()
            .next()
            .and_then(|index| self.profiles.get(*index))
    }

    /// Replace the device list. Previous classification is discarded, never left half-applied.
    pub fn set_devices(&mut self, profiles: Vec<DeviceProfile>) {
        self.profiles = profiles;
        self.battery_index.clear();
        self.classified = false;
    }

    /// Classify every device against `tables`. A failing device degrades to the placeholder
    /// classification on its own.
    pub fn classify(&mut self, tables: &ClassificationTables) {
        self.battery_index.clear();

        for (index, profile) in self.profiles.iter_mut().enumerate() {
            profile.classification = match tables.classify(profile.info_code) {
                Ok(classification) => classification,
                Err(e) => {
                    log::debug!("Unable to classify device {} ({}): {}", index, profile.name, e);
                    Classification::default()
                }
            };

            if profile.is_battery() {
                log::info!("Battery device detected at index {}: {}", index, profile.name);
                self.battery_index.insert(index);
            }
        }

        self.classified = true;
    }
}

/// Configured switch group names by slot; `None` marks an unconfigured slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwitchGroupTable {
    pub names: Vec<Option<String>>,
}

impl SwitchGroupTable {
    pub fn from_entries(entries: &SparseTable<SwitchGroupEntry>) -> SwitchGroupTable {
        let names = (0..MAX_SWITCH_GROUPS)
            .map(|slot| {
                entries
                    .get(slot)
                    .and_then(|entry| entry.name.value())
                    .map(|name| name.replace(' ', ""))
                    .filter(|name| !name.is_empty())
            })
            .collect();

        SwitchGroupTable { names }
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).and_then(|n| n.as_deref())
    }

    pub fn configured(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(slot, name)| name.as_deref().map(|n| (slot, n)))
    }

    pub fn count(&self) -> usize {
        self.configured().count()
    }
}

/// Values carried from one decode pass to the next.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunningMetricCache {
    pub yield_day: WattHours,
    pub yield_yesterday: WattHours,
    /// Yesterday's self-consumption and ratio, taken from the last row that matched today
    pub selfcons_yesterday_fallback: Option<(WattHours, f64)>,
    pub total_power: Watt,
    /// Values of the latest fast poll not yet seen by a periodic poll
    pub fast_values: HashMap<String, Watt>,
}

impl RunningMetricCache {
    /// Drop what the previous fast poll recorded.
    pub fn start_fast_cycle(&mut self) {
        self.fast_values.clear();
    }

    pub fn record_fast(&mut self, topic: &str, value: Watt) {
        self.fast_values.insert(topic.to_string(), value);
    }

    /// Whether the fast poll since the last periodic poll saw a non-zero value for `topic`.
    /// The entry is consumed, so a fast value suppresses at most one periodic zero.
    pub fn take_live_fast_value(&mut self, topic: &str) -> bool {
        self.fast_values.remove(topic).map_or(false, |v| v != 0)
    }
}
