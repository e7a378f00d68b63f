use super::Processor;
use crate::api::response::startup::{SdCardBlock, Startup};
use crate::api::response::{at, text, to_i64, Field};
use crate::metrics;
use crate::model::SwitchGroupTable;
use chrono::{Datelike, Local, NaiveDate};
use serde_json::Value;

/// Highest index probed in the device status table.
const MAX_STATUS_SCAN: usize = 100;
/// Days the monthly setpoint is spread over.
const SETPOINT_DAILY_DIVISOR: f64 = 30.0;
const STATUS_SENTINEL: &str = "Err";

/// Number of devices in a status table (740): entries from index 0 up to the first missing one
/// or the first `"Err"`.
pub fn count_devices(status: &Value) -> usize {
    (0..MAX_STATUS_SCAN)
        .take_while(|i| match at(status, *i) {
            None => false,
            Some(v) => v.as_str() != Some(STATUS_SENTINEL),
        })
        .count()
}

impl Processor {
    pub fn process_startup(&mut self, data: Startup) {
        self.process_startup_on(data, Local::now().date_naive())
    }

    pub fn process_startup_on(&mut self, data: Startup, today: NaiveDate) {
        self.publish_system_info(&data);
        if let Some(sd_card) = data.sd_card.value() {
            self.publish_sd_card(sd_card);
        }
        self.discover_devices(&data);

        if let Some(entries) = data.switch_groups.value() {
            self.switch_groups = SwitchGroupTable::from_entries(entries);
            log::info!("Number of switch groups: {}", self.switch_groups.count());
        }

        if data.battery.value().map_or(false, |b| !b.is_empty()) {
            self.battery_present = true;
            log::info!("Battery detected");
        }

        if data.monthly_weights.is_absent() || data.power.is_absent() || data.efficiency.is_absent()
        {
            log::debug!("Setpoint data (152/161/162) not available in startup data");
        } else {
            self.publish_setpoints(&data, today.month0() as usize);
        }
    }

    fn publish_system_info(&mut self, data: &Startup) {
        for (field, topic) in [
            (&data.rtos, "info/RTOS"),
            (&data.clib, "info/CLIB"),
            (&data.mac, "info/MAC"),
            (&data.serial, "info/SN"),
        ] {
            if let Some(value) = field.value() {
                self.publish(topic, value);
            }
        }

        if let Some(system) = data.system.value() {
            if let Some(model) = system.model.value().and_then(to_i64) {
                log::info!("Detected Solar Log model: {}", model);
                self.model = Some(model);
                self.publish("info/Model", model.to_string());
            }
            if let Some(date) = system.install_date.value() {
                self.publish("info/InstDate", date);
            }
        }

        if let Some(firmware) = data.firmware.value() {
            if let Some(version) = firmware.version.value() {
                self.publish("info/FW", version);
            }
            if let Some(date) = firmware.release_date.value() {
                self.publish("info/FWrelD", date);
            }
        }
    }

    fn publish_sd_card(&self, sd: &SdCardBlock) {
        let part = |field: &Field<Value>| field.value().map(text).unwrap_or_default();

        self.publish(
            "info/SD",
            format!(
                "[{}|{}|{}|{}] - {}/{}",
                part(&sd.k101),
                part(&sd.k103),
                part(&sd.k102),
                part(&sd.k100),
                part(&sd.k104),
                part(&sd.k105)
            ),
        );
    }

    fn discover_devices(&mut self, data: &Startup) {
        let had_tables = self.tables.is_complete();
        if let Some(device_list) = data.device_list.value() {
            log::debug!("Device list: {} entries", device_list.len());
            self.tables.device_list = device_list.clone();
        }
        if let Some(brand_list) = data.brand_list.value() {
            log::debug!("Brand list: {} entries", brand_list.len());
            self.tables.brand_list = brand_list.clone();
        }

        match data.device_status.value() {
            Some(status) => {
                self.topology.num_inverters = count_devices(status);
                metrics::DEVICES.set(self.topology.num_inverters as i64);
                log::info!("Number of inverters/meters: {}", self.topology.num_inverters);
                self.publish(
                    "info/numinv",
                    self.topology.num_inverters.saturating_sub(1),
                );
            }
            None => log::debug!("No device status table (740) in startup data"),
        }

        // Tables that arrive after the device names still have to classify them.
        if !had_tables && self.tables.is_complete() && !self.topology.is_empty() {
            self.classify_devices();
            self.publish_device_info();
        }
    }

    fn publish_setpoints(&self, data: &Startup, month0: usize) {
        let efficiency = data.efficiency.value().copied().unwrap_or(0.0);
        let power = data.power.value().copied().unwrap_or(0.0);
        let setpoint_year = efficiency * (power / 1000.0);

        log::info!(
            "Calculated yearly setpoint: {} (efficiency: {}, power: {})",
            setpoint_year,
            efficiency,
            power
        );
        self.publish("forecast/setpointYear", setpoint_year as i64);

        let weights = match data.monthly_weights.value() {
            Some(weights) if weights.len() >= 12 => weights,
            _ => {
                log::warn!("Invalid setpoint data format (152)");
                return;
            }
        };

        for (i, weight) in weights.iter().take(12).enumerate() {
            let monthly = weight / 100.0 * setpoint_year;
            self.publish(
                &format!("forecast/setpointMonth/{:02}", i + 1),
                monthly as i64,
            );
        }

        let current_month = weights[month0] / 100.0 * setpoint_year;
        self.publish("forecast/setpointCurrMonth", current_month as i64);
        self.publish(
            "forecast/setpointToday",
            (current_month / SETPOINT_DAILY_DIVISOR) as i64,
        );
    }
}

#[cfg(test)]
mod test {
    use super::super::test::processor;
    use super::*;
    use crate::api::response::test::read_resource;
    use crate::publisher::Payload;
    use serde_json::json;

    fn startup(value: Value) -> Startup {
        serde_json::from_value(value).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn status_scan_stops_at_sentinel() {
        assert_eq!(2, count_devices(&json!({"0": "OK", "1": "OK", "2": "Err"})));
        assert_eq!(0, count_devices(&json!({})));
        assert_eq!(3, count_devices(&json!(["OK", "OK", "OK"])));
        assert_eq!(1, count_devices(&json!({"0": "OK", "2": "OK"})));
    }

    #[test]
    fn single_inverter_publishes_zero_based_count() {
        let (mut p, publisher) = processor();
        p.process_startup_on(
            startup(json!({
                "739": {"0": [1, "STP", 0, 0, 0, 1]},
                "740": {"0": "OK", "1": "Err"},
                "744": ["Generic", "SMA"]
            })),
            day(),
        );

        assert_eq!(1, p.topology.num_inverters);
        assert!(p.tables.is_complete());
        assert_eq!(Some(Payload::Int(0)), publisher.last("info/numinv"));
    }

    #[test]
    fn full_startup_fixture() {
        let (mut p, publisher) = processor();
        let data: Startup = serde_json::from_str(&read_resource("startup.json")).unwrap();
        p.process_startup_on(data, day());

        assert_eq!(Some(Payload::Str("3.6.0 Build 99".into())), publisher.last("info/FW"));
        assert_eq!(Some(Payload::Str("1200".into())), publisher.last("info/Model"));
        assert_eq!(Some(1200), p.model);
        assert_eq!(
            Some(Payload::Str("[SD|1|2|0] - 100/7800".into())),
            publisher.last("info/SD")
        );
        assert_eq!(Some("Garage"), p.switch_groups.name(0));
        assert_eq!(1, p.switch_groups.count());
        assert!(p.battery_present);
        assert_eq!(2, p.topology.num_inverters);
        assert_eq!(Some(Payload::Int(1)), publisher.last("info/numinv"));
    }

    #[test]
    fn setpoints_are_apportioned_by_month() {
        let (mut p, publisher) = processor();
        let mut weights = vec![5.0; 12];
        weights[9] = 12.0;
        p.process_startup_on(
            startup(json!({"152": weights, "161": 10000.0, "162": 1000.0})),
            day(),
        );

        // 1000 kWh/kWp * 10 kWp
        assert_eq!(Some(Payload::Int(10000)), publisher.last("forecast/setpointYear"));
        assert_eq!(
            Some(Payload::Int(500)),
            publisher.last("forecast/setpointMonth/01")
        );
        assert_eq!(
            Some(Payload::Int(1200)),
            publisher.last("forecast/setpointMonth/10")
        );
        assert_eq!(Some(Payload::Int(1200)), publisher.last("forecast/setpointCurrMonth"));
        assert_eq!(Some(Payload::Int(40)), publisher.last("forecast/setpointToday"));
    }

    #[test]
    fn malformed_weights_still_publish_the_year() {
        let (mut p, publisher) = processor();
        p.process_startup_on(
            startup(json!({"152": "garbage", "161": 5000, "162": null})),
            day(),
        );

        assert_eq!(Some(Payload::Int(0)), publisher.last("forecast/setpointYear"));
        assert_eq!(None, publisher.last("forecast/setpointCurrMonth"));
    }

    #[test]
    fn basic_info_only_touches_system_fields() {
        let (mut p, publisher) = processor();
        p.topology.num_inverters = 3;
        p.process_startup_on(
            startup(json!({"610": "RTOS 1", "706": 123456, "800": {"100": 500, "160": "01.01.20"}})),
            day(),
        );

        assert_eq!(3, p.topology.num_inverters);
        assert_eq!(Some(500), p.model);
        assert_eq!(Some(Payload::Int(123456)), publisher.last("info/SN"));
        assert_eq!(None, publisher.last("info/numinv"));
    }
}
