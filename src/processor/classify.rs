use super::Processor;
use crate::api::response::device_info::DeviceInfo;
use crate::api::response::to_i64;
use crate::metrics;
use crate::model::DeviceProfile;

impl Processor {
    /// Decode a device-info (141) response into the device list and classify it.
    ///
    /// The startup status scan decides how many devices there are. Only when it found none are
    /// the named entries of the response itself counted.
    pub fn process_device_info(&mut self, data: DeviceInfo) {
        let devices = match data.devices.into_value() {
            Some(devices) => devices,
            None => {
                log::warn!("Device info response without device table (141)");
                return;
            }
        };

        let count = if self.topology.num_inverters > 0 {
            self.topology.num_inverters
        } else {
            let detected = devices
                .iter()
                .filter(|(_, entry)| entry.name.value().is_some())
                .map(|(index, _)| index + 1)
                .max()
                .unwrap_or(0);
            if detected > 0 {
                log::info!("Device count derived from device info: {}", detected);
                self.topology.num_inverters = detected;
                self.publish("info/numinv", detected - 1);
            }
            detected
        };

        let profiles: Vec<DeviceProfile> = (0..count)
            .map(|index| {
                let entry = devices.get(index);
                let name = entry
                    .and_then(|e| e.name.value())
                    .cloned()
                    .unwrap_or_else(|| format!("Inverter_{}", index));
                let info_code = entry.and_then(|e| e.info_code.value()).and_then(to_i64);
                log::debug!("Device {}: {}, info: {:?}", index, name, info_code);
                DeviceProfile::unclassified(name, info_code)
            })
            .collect();

        log::info!(
            "Discovered {} devices: {:?}",
            profiles.len(),
            profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );
        metrics::DEVICES.set(profiles.len() as i64);
        self.topology.set_devices(profiles);

        self.classify_devices();
        self.publish_device_info();
    }

    pub(super) fn classify_devices(&mut self) {
        if !self.tables.is_complete() {
            log::warn!("Device or brand list not available, devices stay unclassified");
            return;
        }
        self.topology.classify(&self.tables);
    }

    pub(super) fn publish_device_info(&self) {
        if !self.topology.classified {
            return;
        }
        for profile in &self.topology.profiles {
            let c = &profile.classification;
            self.publish(&format!("INV/{}/deviceclass", profile.name), c.class.label());
            self.publish(
                &format!("INV/{}/devicetype", profile.name),
                c.device_type.as_str(),
            );
            self.publish(&format!("INV/{}/devicebrand", profile.name), c.brand.as_str());
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::processor;
    use super::*;
    use crate::api::response::test::read_resource;
    use crate::api::response::startup::Startup;
    use crate::model::{Classification, DeviceClass};
    use crate::publisher::Payload;
    use serde_json::json;

    fn device_info(value: serde_json::Value) -> DeviceInfo {
        serde_json::from_value(value).unwrap()
    }

    fn load_tables(p: &mut Processor) {
        let startup: Startup = serde_json::from_value(json!({
            "739": {
                "0": [1, "STP 10000TL", 0, 0, 0, 1],
                "1": [2, "BYD HVS", 0, 0, 0, 16],
                "2": [1, "Odd", 0, 0, 0, 6]
            },
            "744": ["Generic", "SMA", "BYD"]
        }))
        .unwrap();
        p.process_startup(startup);
    }

    #[test]
    fn startup_count_is_authoritative() {
        let (mut p, publisher) = processor();
        load_tables(&mut p);
        p.topology.num_inverters = 2;

        p.process_device_info(device_info(json!({"141": {
            "0": {"119": "WR 1", "162": 0},
            "1": {"119": "Akku", "162": 1},
            "2": {"119": "Extra", "162": 0}
        }})));

        assert_eq!(2, p.topology.len());
        assert!(p.topology.is_battery(1));
        assert_eq!(
            Some(Payload::Str("Batterie".into())),
            publisher.last("INV/Akku/deviceclass")
        );
        assert_eq!(Some(Payload::Str("SMA".into())), publisher.last("INV/WR 1/devicebrand"));
        assert_eq!(None, publisher.last("INV/Extra/devicetype"));
        assert_eq!(None, publisher.last("info/numinv"));
    }

    #[test]
    fn count_falls_back_to_named_entries() {
        let (mut p, publisher) = processor();
        load_tables(&mut p);

        p.process_device_info(device_info(json!({"141": {
            "0": {"119": "WR 1", "162": 0},
            "1": {"119": null, "162": null},
            "2": {"119": "WR 3", "162": 2}
        }})));

        assert_eq!(3, p.topology.num_inverters);
        assert_eq!(Some(Payload::Int(2)), publisher.last("info/numinv"));
        assert_eq!(Some("Inverter_1"), p.topology.name(1));
        // bad class mask degrades only that device
        assert_eq!(Classification::default(), p.topology.profiles[2].classification);
        assert_eq!(
            DeviceClass::Inverter,
            p.topology.profiles[0].classification.class
        );
        assert_eq!("STP 10000TL", p.topology.profiles[0].classification.device_type);
    }

    #[test]
    fn names_without_tables_stay_unclassified() {
        let (mut p, publisher) = processor();
        p.process_device_info(serde_json::from_str(&read_resource("device_info.json")).unwrap());

        assert_eq!(3, p.topology.len());
        assert!(!p.topology.classified);
        assert!(publisher.topics().iter().all(|t| !t.ends_with("/deviceclass")));
    }

    #[test]
    fn late_tables_classify_known_devices() {
        let (mut p, publisher) = processor();
        p.process_device_info(device_info(json!({"141": {
            "0": {"119": "WR 1", "162": 0},
            "1": {"119": "Akku", "162": 1}
        }})));
        assert!(!p.topology.classified);

        load_tables(&mut p);

        assert!(p.topology.classified);
        assert!(p.topology.is_battery(1));
        assert_eq!(
            Some(Payload::Str("BYD".into())),
            publisher.last("INV/Akku/devicebrand")
        );
    }

    #[test]
    fn repeated_device_info_is_idempotent() {
        let (mut p, publisher) = processor();
        load_tables(&mut p);
        p.topology.num_inverters = 1;
        let payload = json!({"141": {"0": {"119": "WR 1", "162": 0}}});

        p.process_device_info(device_info(payload.clone()));
        let first = publisher.snapshot();
        publisher.clear();
        p.process_device_info(device_info(payload));

        assert_eq!(first.len(), publisher.snapshot().len());
        assert_eq!(first.last(), publisher.snapshot().last());
        assert_eq!(1, p.topology.len());
    }
}
