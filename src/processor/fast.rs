use super::Processor;
use crate::api::response::fast_poll::FastPoll;
use crate::api::response::{at, int_or_zero, truthy};
use crate::api::Error;
use crate::publisher::Payload;
use serde_json::Value;

const ACCESS_DENIED: &str = "DENIED";
const DISPLAY_ELEMENTS: usize = 16;
/// `(element index, icon topic, error topic)`
const DISPLAY_PAIRS: [(usize, &str, &str); 4] = [
    (0, "invicon", "inverror"),
    (1, "networkicon", "networkerror"),
    (6, "metericon", "metersoffline"),
    (11, "mailicon", "mailerror"),
];

/// Whether any status text in a status table (608) carries the device's access-denied marker.
pub fn is_access_denied(status: &Value) -> bool {
    match status {
        Value::String(s) => s.contains(ACCESS_DENIED),
        Value::Array(items) => items.iter().any(is_access_denied),
        Value::Object(map) => map.values().any(is_access_denied),
        _ => false,
    }
}

fn entries(table: &Value) -> usize {
    match table {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

impl Processor {
    /// Decode a fast poll. An access-denied status rejects the whole payload before anything is
    /// published.
    pub fn process_fast(&mut self, data: FastPoll) -> Result<(), Error> {
        if data.status.value().map_or(false, is_access_denied) {
            log::warn!("Solar Log access denied");
            return Err(Error::AccessDenied);
        }
        if !data.other.is_empty() {
            log::debug!(
                "Fast poll contains keys not handled: {:?}",
                data.other.keys().collect::<Vec<_>>()
            );
        }

        if let Some(status) = data.status.value() {
            self.observed_devices = entries(status);
        }
        if let (Some(status), Some(pac)) = (data.status.value(), data.pac.value()) {
            self.publish_inverter_status(status, pac);
        }
        for (field, suffix) in [(&data.uac, "UAC"), (&data.udc, "UDC")] {
            if let Some(values) = field.value() {
                log::debug!("Per-inverter {} present", suffix);
                for (index, profile) in self.topology.profiles.iter().enumerate() {
                    self.publish(
                        &format!("INV/{}/{}", profile.name, suffix),
                        int_or_zero(at(values, index)),
                    );
                }
            }
        }

        self.publish_switch_states(&data);
        if let Some(elements) = data.display.value().and_then(|d| d.elements.value()) {
            self.publish_display(elements);
        }

        let battery = self.publish_battery(data.battery.value());
        self.cache.start_fast_cycle();
        if !data.production.is_absent() && !data.consumption.is_absent() {
            self.publish_flows(
                int_or_zero(data.production.value()),
                int_or_zero(data.consumption.value()),
                &battery,
            );
        }

        Ok(())
    }

    fn publish_inverter_status(&self, status: &Value, pac: &Value) {
        for (index, profile) in self.topology.profiles.iter().enumerate() {
            if self.topology.is_battery(index) {
                continue;
            }
            let state = at(status, index).map_or_else(|| Payload::from("Unknown"), Payload::from);
            self.publish(&format!("INV/{}/status", profile.name), state);
            self.publish(
                &format!("INV/{}/PAC", profile.name),
                int_or_zero(at(pac, index)),
            );
        }
    }

    fn publish_switch_states(&self, data: &FastPoll) {
        let states = match data.switch_states.value().and_then(|b| b.states.value()) {
            Some(states) => states,
            None => return,
        };

        for (slot, name) in self.switch_groups.configured() {
            if let Some(state) = states.get(slot).and_then(|s| s.state.value()) {
                self.publish(&format!("SwitchGroup/{}/state", name), state);
            }
        }
    }

    fn publish_display(&self, elements: &[Value]) {
        if elements.len() < DISPLAY_ELEMENTS {
            log::warn!("Invalid display data format: {} elements", elements.len());
            return;
        }

        let ok = elements
            .iter()
            .take(DISPLAY_ELEMENTS)
            .all(|element| !at(element, 1).map_or(false, truthy));
        self.publish("display/OK", ok);

        for (index, icon, error) in DISPLAY_PAIRS {
            let element = &elements[index];
            if let (Some(icon_value), Some(error_value)) = (at(element, 0), at(element, 1)) {
                self.publish(&format!("display/{}", icon), icon_value);
                self.publish(&format!("display/{}", error), error_value);
            }
        }
    }

    /// Battery block padded to `[_, level, charge, discharge]`.
    fn publish_battery(&self, block: Option<&Vec<Value>>) -> [i64; 4] {
        let mut battery = [0; 4];
        if let Some(block) = block {
            for (slot, value) in battery.iter_mut().zip(block.iter()) {
                *slot = int_or_zero(Some(value));
            }
        }

        if block.is_some() && self.battery_present {
            if let Some(device) = self.topology.battery() {
                self.publish(&format!("INV/{}/BattLevel", device.name), battery[1]);
                self.publish(&format!("INV/{}/ChargePower", device.name), battery[2]);
                self.publish(&format!("INV/{}/DischargePower", device.name), battery[3]);
            }
        }
        battery
    }

    fn publish_flows(&mut self, production: i64, consumption: i64, battery: &[i64; 4]) {
        let net_production = production - battery[3];
        let net_consumption = consumption - battery[2];
        self.cache.record_fast("status/pac", net_production);
        self.cache.record_fast("status/conspac", net_consumption);
        self.publish("status/pac", net_production);
        self.publish("status/conspac", net_consumption);

        let feed = production - consumption;
        self.publish("status/feed", feed);
        if feed > 0 {
            self.publish("status/feedin", feed);
            self.publish("status/feedinactive", true);
            self.publish("status/feedout", 0i64);
        } else {
            self.publish("status/feedin", 0i64);
            self.publish("status/feedinactive", false);
            self.publish("status/feedout", feed.abs());
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::processor;
    use super::*;
    use crate::api::response::test::read_resource;
    use crate::model::{DeviceProfile, SwitchGroupTable};
    use serde_json::json;

    fn fast(value: Value) -> FastPoll {
        serde_json::from_value(value).unwrap()
    }

    fn devices(p: &mut Processor, names: &[&str]) {
        p.topology.set_devices(
            names
                .iter()
                .map(|n| DeviceProfile::unclassified(n.to_string(), None))
                .collect(),
        );
    }

    #[test]
    fn access_denied_anywhere_in_status() {
        assert!(is_access_denied(&json!(["OK", "ACCESS DENIED"])));
        assert!(is_access_denied(&json!({"0": "ACCESS DENIED"})));
        assert!(!is_access_denied(&json!(["OK", 5])));
        assert!(!is_access_denied(&Value::Null));
    }

    #[test]
    fn access_denied_publishes_nothing() {
        let (mut p, publisher) = processor();
        devices(&mut p, &["WR1"]);

        let result = p.process_fast(fast(json!({
            "608": ["ACCESS DENIED"],
            "780": 1000,
            "781": 500,
            "782": [1000]
        })));

        assert_eq!(Err(Error::AccessDenied), result);
        assert!(publisher.snapshot().is_empty());
    }

    #[test]
    fn feed_in_when_producing_more() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"780": 3000, "781": 1200}))).unwrap();

        assert_eq!(Some(Payload::Int(1800)), publisher.last("status/feed"));
        assert_eq!(Some(Payload::Int(1800)), publisher.last("status/feedin"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/feedout"));
        assert_eq!(Some(Payload::Bool(true)), publisher.last("status/feedinactive"));
    }

    #[test]
    fn feed_out_when_consuming_more() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"780": 200, "781": 900}))).unwrap();

        assert_eq!(Some(Payload::Int(-700)), publisher.last("status/feed"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/feedin"));
        assert_eq!(Some(Payload::Int(700)), publisher.last("status/feedout"));
        assert_eq!(Some(Payload::Bool(false)), publisher.last("status/feedinactive"));
    }

    #[test]
    fn battery_flows_are_netted_out() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"780": 3000, "781": 1200, "858": [0, 80, 300, 100]})))
            .unwrap();

        assert_eq!(Some(Payload::Int(2900)), publisher.last("status/pac"));
        assert_eq!(Some(Payload::Int(900)), publisher.last("status/conspac"));
        assert_eq!(Some(&2900), p.cache.fast_values.get("status/pac"));
    }

    #[test]
    fn null_production_counts_as_zero() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"780": null, "781": 900}))).unwrap();

        assert_eq!(Some(Payload::Int(-900)), publisher.last("status/feed"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/pac"));
        assert_eq!(Some(Payload::Int(900)), publisher.last("status/feedout"));
    }

    #[test]
    fn missing_consumption_skips_flows() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"780": 1200}))).unwrap();

        assert_eq!(None, publisher.last("status/feed"));
        assert_eq!(None, publisher.last("status/pac"));
    }

    #[test]
    fn fast_cycle_replaces_previous_values() {
        let (mut p, _) = processor();
        p.process_fast(fast(json!({"780": 1500, "781": 400}))).unwrap();
        p.process_fast(fast(json!({"608": ["OK"]}))).unwrap();

        assert!(p.cache.fast_values.is_empty());
    }

    #[test]
    fn short_battery_block_is_padded() {
        let (mut p, publisher) = processor();
        p.battery_present = true;
        p.topology.set_devices(vec![DeviceProfile::unclassified("Akku".into(), None)]);
        p.topology.battery_index.insert(0);

        p.process_fast(fast(json!({"858": [0, 55]}))).unwrap();

        assert_eq!(Some(Payload::Int(55)), publisher.last("INV/Akku/BattLevel"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("INV/Akku/DischargePower"));
    }

    #[test]
    fn per_inverter_values_skip_batteries() {
        let (mut p, publisher) = processor();
        devices(&mut p, &["WR1", "Akku", "WR2"]);
        p.topology.battery_index.insert(1);

        p.process_fast(fast(json!({
            "608": {"0": "MPP", "1": "Charging"},
            "782": [1500, 200, "900"],
            "784": [230, 0, 231]
        })))
        .unwrap();

        assert_eq!(3, p.observed_devices);
        assert_eq!(Some(Payload::Str("MPP".into())), publisher.last("INV/WR1/status"));
        assert_eq!(Some(Payload::Str("Unknown".into())), publisher.last("INV/WR2/status"));
        assert_eq!(Some(Payload::Int(900)), publisher.last("INV/WR2/PAC"));
        assert_eq!(None, publisher.last("INV/Akku/PAC"));
        assert_eq!(Some(Payload::Int(231)), publisher.last("INV/WR2/UAC"));
        assert_eq!(None, publisher.last("INV/WR1/UDC"));
    }

    #[test]
    fn switch_states_for_configured_slots() {
        let (mut p, publisher) = processor();
        p.switch_groups = SwitchGroupTable {
            names: vec![Some("Pool".into()), None, Some("Heater".into())],
        };

        p.process_fast(fast(json!({"801": {"175": {
            "0": {"101": 1},
            "1": {"101": 1},
            "2": {"100": "no state"}
        }}})))
        .unwrap();

        assert_eq!(Some(Payload::Int(1)), publisher.last("SwitchGroup/Pool/state"));
        assert_eq!(1, publisher.count_prefix("SwitchGroup/"));
    }

    #[test]
    fn display_health_from_fixture() {
        let (mut p, publisher) = processor();
        p.process_fast(serde_json::from_str(&read_resource("fast.json")).unwrap())
            .unwrap();

        assert_eq!(Some(Payload::Bool(false)), publisher.last("display/OK"));
        assert_eq!(Some(Payload::Bool(true)), publisher.last("display/networkerror"));
        assert_eq!(Some(Payload::Bool(false)), publisher.last("display/inverror"));
        assert!(publisher.last("display/mailicon").is_some());
    }

    #[test]
    fn short_display_table_is_skipped() {
        let (mut p, publisher) = processor();
        p.process_fast(fast(json!({"794": {"0": [[1, false], [2, false]]}})))
            .unwrap();

        assert_eq!(None, publisher.last("display/OK"));
    }
}
