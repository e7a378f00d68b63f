use super::{Processor, DAYS_TO_CHECK_HISTORY, DAY_FORMAT};
use crate::api::response::periodic::{PeriodicPoll, Summary};
use crate::api::response::{at, int_or_zero, text};
use chrono::{Local, NaiveDate};
use serde_json::Value;

/// Share of `part` in `whole` as a percentage with one decimal. An empty `whole` yields 0.
pub fn ratio(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

fn row_len(row: &Value) -> usize {
    row.as_array().map_or(0, Vec::len)
}

fn row_matches(row: &Value, date: &str) -> bool {
    at(row, 0).map_or(false, |d| text(d).contains(date))
}

/// Index of the first row within the history window whose date contains `date`.
fn find_first_row(rows: &[Value], date: &str) -> Option<usize> {
    rows.iter()
        .take(DAYS_TO_CHECK_HISTORY)
        .position(|row| row_matches(row, date))
}

/// Index of the last row within the history window whose date contains `date`.
fn find_last_row(rows: &[Value], date: &str) -> Option<usize> {
    rows.iter()
        .take(DAYS_TO_CHECK_HISTORY)
        .enumerate()
        .filter(|(_, row)| row_matches(row, date))
        .map(|(index, _)| index)
        .last()
}

impl Processor {
    pub fn process_periodic(&mut self, data: PeriodicPoll) {
        self.process_periodic_on(data, Local::now().date_naive())
    }

    /// The summary is decoded first so the day ratios use the yields of the same payload.
    pub fn process_periodic_on(&mut self, data: PeriodicPoll, today: NaiveDate) {
        if let Some(summary) = data.summary.value().and_then(|b| b.summary.value()) {
            self.process_summary(summary);
        }
        if let Some(entries) = data.switch_groups.value() {
            self.process_switch_group_details(entries);
        }

        let today_text = today.format(DAY_FORMAT).to_string();
        if let Some(rows) = data.day_sums.value().and_then(|b| b.rows.value()) {
            self.process_day_sums(rows, &today_text);
        }
        if let Some(rows) = data.self_consumption.value().and_then(|b| b.rows.value()) {
            let yesterday_text = today
                .pred_opt()
                .map(|d| d.format(DAY_FORMAT).to_string())
                .unwrap_or_default();
            self.process_self_consumption(rows, &today_text, &yesterday_text);
        }
    }

    fn process_summary(&mut self, summary: &Summary) {
        let missing = summary.missing_keys();
        if !missing.is_empty() {
            log::debug!("801/170 missing expected keys: {:?}", missing);
        }
        if !summary.other.is_empty() {
            log::debug!(
                "801/170 contains keys not handled: {:?}",
                summary.other.keys().collect::<Vec<_>>()
            );
        }

        // only these two are fed by the fast poll
        for (field, topic) in [
            (&summary.pac, "status/pac"),
            (&summary.cons_pac, "status/conspac"),
        ] {
            let value = int_or_zero(field.value());
            if self.cache.take_live_fast_value(topic) && value == 0 {
                log::debug!("Keeping fast poll value of {} over periodic zero", topic);
                continue;
            }
            self.publish(topic, value);
        }
        for (field, topic) in [
            (&summary.pdc, "status/pdc"),
            (&summary.uac, "status/uac"),
            (&summary.udc, "status/udc"),
        ] {
            self.publish(topic, int_or_zero(field.value()));
        }

        self.cache.yield_day = int_or_zero(summary.yield_day.value());
        self.cache.yield_yesterday = int_or_zero(summary.yield_yesterday.value());
        self.publish("status/yieldday", self.cache.yield_day);
        self.publish("status/yieldyesterday", self.cache.yield_yesterday);

        for (field, topic) in [
            (&summary.yield_month, "status/yieldmonth"),
            (&summary.yield_year, "status/yieldyear"),
            (&summary.yield_total, "status/yieldtotal"),
            (&summary.cons_yield_day, "status/consyieldday"),
            (&summary.cons_yield_yesterday, "status/consyieldyesterday"),
            (&summary.cons_yield_month, "status/consyieldmonth"),
            (&summary.cons_yield_year, "status/consyieldyear"),
            (&summary.cons_yield_total, "status/consyieldtotal"),
        ] {
            self.publish(topic, int_or_zero(field.value()));
        }

        self.publish(
            "info/lastSync",
            summary.last_sync.value().map(text).unwrap_or_default(),
        );

        self.cache.total_power = int_or_zero(summary.total_power.value());
        self.publish("info/totalPower", self.cache.total_power);
    }

    fn process_day_sums(&self, rows: &[Value], today: &str) {
        if self.topology.is_empty() {
            log::warn!("No devices known, skipping day sums");
            return;
        }

        let row = match find_first_row(rows, today) {
            Some(index) => &rows[index],
            None => {
                log::warn!("Could not find today's date ({}) in day sum data", today);
                return;
            }
        };
        let per_device = match at(row, 1) {
            Some(values) => values,
            None => {
                log::warn!("Day sum row without per-device values");
                return;
            }
        };

        let mut published = 0;
        for (index, profile) in self.topology.profiles.iter().enumerate() {
            if self.topology.is_battery(index) {
                continue;
            }
            if let Some(value) = at(per_device, index) {
                self.publish(
                    &format!("INV/{}/daysum", profile.name),
                    int_or_zero(Some(value)),
                );
                published += 1;
            }
        }
        log::info!("Processed day sums for {} inverters", published);
    }

    /// Today's figures replace the yesterday fallback only after yesterday has been published.
    fn process_self_consumption(&mut self, rows: &[Value], today: &str, yesterday: &str) {
        let mut today_figures = None;
        if let Some(row) = find_last_row(rows, today).map(|i| &rows[i]) {
            if row_len(row) > 1 {
                let selfcons = int_or_zero(at(row, 1));
                let day_ratio = ratio(selfcons, self.cache.yield_day);
                self.publish("SelfCons/selfconstoday", selfcons);
                self.publish("SelfCons/selfconsratiotoday", day_ratio);
                today_figures = Some((selfcons, day_ratio));

                if (self.battery_device_present() || self.battery_present) && row_len(row) >= 5 {
                    self.publish_battery_day(row);
                }
            }
        }

        match find_last_row(rows, yesterday).map(|i| &rows[i]) {
            Some(row) if row_len(row) > 1 => {
                let selfcons = int_or_zero(at(row, 1));
                self.publish("SelfCons/selfconsyesterday", selfcons);
                self.publish(
                    "SelfCons/selfconsratioyesterday",
                    ratio(selfcons, self.cache.yield_yesterday),
                );
            }
            _ => match self.cache.selfcons_yesterday_fallback {
                Some((selfcons, day_ratio)) => {
                    log::debug!("No row for {}, publishing last known figures", yesterday);
                    self.publish("SelfCons/selfconsyesterday", selfcons);
                    self.publish("SelfCons/selfconsratioyesterday", day_ratio);
                }
                None => log::debug!("No self-consumption figures for {}", yesterday),
            },
        }

        if today_figures.is_some() {
            self.cache.selfcons_yesterday_fallback = today_figures;
        }
    }

    /// Battery columns of a self-consumption row, under the battery device when one is known.
    fn publish_battery_day(&self, row: &Value) {
        let name = self
            .topology
            .battery()
            .map_or("Battery", |device| device.name.as_str());

        for (column, suffix) in [
            (2, "BattSelfCons"),
            (3, "BattChargeDaysum"),
            (4, "BattDischargeDaysum"),
        ] {
            self.publish(&format!("INV/{}/{}", name, suffix), int_or_zero(at(row, column)));
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::processor;
    use super::*;
    use crate::api::response::fast_poll::FastPoll;
    use crate::api::response::test::read_resource;
    use crate::model::DeviceProfile;
    use crate::publisher::Payload;
    use serde_json::json;

    fn periodic(value: Value) -> PeriodicPoll {
        serde_json::from_value(value).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn ratio_has_one_decimal() {
        assert_eq!(16.7, ratio(15, 90));
        assert_eq!(12.5, ratio(10, 80));
        assert_eq!(33.3, ratio(1, 3));
        assert_eq!(0.0, ratio(5, 0));
    }

    #[test]
    fn periodic_zero_does_not_clobber_fast_value() {
        let (mut p, publisher) = processor();
        let fast: FastPoll = serde_json::from_value(json!({"780": 2000, "781": 500})).unwrap();
        p.process_fast(fast).unwrap();

        p.process_periodic_on(
            periodic(json!({"801": {"170": {"101": 0, "102": 0, "110": 0}}})),
            day(),
        );

        assert_eq!(1, publisher.count("status/pac"));
        assert_eq!(Some(Payload::Int(2000)), publisher.last("status/pac"));
        assert_eq!(1, publisher.count("status/conspac"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/pdc"));
    }

    #[test]
    fn stale_fast_value_suppresses_only_once() {
        let (mut p, publisher) = processor();
        let fast: FastPoll = serde_json::from_value(json!({"780": 2000, "781": 500})).unwrap();
        p.process_fast(fast).unwrap();

        let zero = json!({"801": {"170": {"101": 0, "110": 0}}});
        p.process_periodic_on(periodic(zero.clone()), day());
        p.process_periodic_on(periodic(zero), day());

        assert_eq!(2, publisher.count("status/pac"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/pac"));
        assert_eq!(Some(Payload::Int(0)), publisher.last("status/conspac"));
    }

    #[test]
    fn periodic_non_zero_is_published() {
        let (mut p, publisher) = processor();
        p.cache.record_fast("status/pac", 2000);

        p.process_periodic_on(periodic(json!({"801": {"170": {"101": 1800}}})), day());

        assert_eq!(Some(Payload::Int(1800)), publisher.last("status/pac"));
    }

    #[test]
    fn day_sums_for_todays_row() {
        let (mut p, publisher) = processor();
        p.topology.set_devices(vec![
            DeviceProfile::unclassified("WR1".into(), None),
            DeviceProfile::unclassified("Akku".into(), None),
        ]);
        p.topology.battery_index.insert(1);

        p.process_periodic_on(
            periodic(json!({"777": {"0": [
                ["18.10.26", [100, 5]],
                ["19.10.26", [2500, 300]]
            ]}})),
            day(),
        );

        assert_eq!(Some(Payload::Int(2500)), publisher.last("INV/WR1/daysum"));
        assert_eq!(None, publisher.last("INV/Akku/daysum"));
    }

    #[test]
    fn duplicate_day_rows() {
        let rows = [
            json!(["19.10.26", [100]]),
            json!(["18.10.26", [50]]),
            json!(["19.10.26 23:59", [200]]),
        ];

        assert_eq!(Some(0), find_first_row(&rows, "19.10.26"));
        assert_eq!(Some(2), find_last_row(&rows, "19.10.26"));
        assert_eq!(None, find_first_row(&rows, "17.10.26"));
    }

    #[test]
    fn day_sums_use_the_first_matching_row() {
        let (mut p, publisher) = processor();
        p.topology
            .set_devices(vec![DeviceProfile::unclassified("WR1".into(), None)]);

        p.process_periodic_on(
            periodic(json!({"777": {"0": [
                ["19.10.26", [2500]],
                ["19.10.26", [1]]
            ]}})),
            day(),
        );

        assert_eq!(Some(Payload::Int(2500)), publisher.last("INV/WR1/daysum"));
    }

    #[test]
    fn day_sums_without_todays_row() {
        let (mut p, publisher) = processor();
        p.topology
            .set_devices(vec![DeviceProfile::unclassified("WR1".into(), None)]);

        p.process_periodic_on(
            periodic(json!({"777": {"0": [["17.10.26", [100]]]}})),
            day(),
        );

        assert_eq!(None, publisher.last("INV/WR1/daysum"));
    }

    #[test]
    fn self_consumption_uses_the_same_payloads_yield() {
        let (mut p, publisher) = processor();
        p.process_periodic_on(
            periodic(json!({
                "778": {"0": [
                    ["18.10.26", 800, 0, 0, 0],
                    ["19.10.26", 600, 0, 0, 0]
                ]},
                "801": {"170": {"105": 3600, "106": 4000}}
            })),
            day(),
        );

        assert_eq!(Some(Payload::Int(600)), publisher.last("SelfCons/selfconstoday"));
        assert_eq!(
            Some(Payload::Float(16.7)),
            publisher.last("SelfCons/selfconsratiotoday")
        );
        assert_eq!(Some(Payload::Int(800)), publisher.last("SelfCons/selfconsyesterday"));
        assert_eq!(
            Some(Payload::Float(20.0)),
            publisher.last("SelfCons/selfconsratioyesterday")
        );
    }

    #[test]
    fn yesterday_falls_back_to_last_today_figures() {
        let (mut p, publisher) = processor();
        p.cache.yield_day = 1000;
        p.process_periodic_on(
            periodic(json!({"778": {"0": [["19.10.26", 250]]}})),
            day(),
        );

        // the window rolled over a month boundary and lost yesterday's row
        p.process_periodic_on(
            periodic(json!({"778": {"0": [["20.10.26", 10]]}})),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        );

        assert_eq!(Some(Payload::Int(10)), publisher.last("SelfCons/selfconstoday"));
        assert_eq!(Some(Payload::Int(250)), publisher.last("SelfCons/selfconsyesterday"));
        assert_eq!(
            Some(Payload::Float(25.0)),
            publisher.last("SelfCons/selfconsratioyesterday")
        );
        assert_eq!(Some((10, 1.0)), p.cache.selfcons_yesterday_fallback);
    }

    #[test]
    fn no_yesterday_figures_at_all() {
        let (mut p, publisher) = processor();
        p.process_periodic_on(periodic(json!({"778": {"0": []}})), day());

        assert_eq!(None, publisher.last("SelfCons/selfconsyesterday"));
    }

    #[test]
    fn battery_day_figures_without_battery_device() {
        let (mut p, publisher) = processor();
        p.battery_present = true;

        p.process_periodic_on(
            periodic(json!({"778": {"0": [["19.10.26", 600, 120, 900, 700]]}})),
            day(),
        );

        assert_eq!(Some(Payload::Int(120)), publisher.last("INV/Battery/BattSelfCons"));
        assert_eq!(
            Some(Payload::Int(700)),
            publisher.last("INV/Battery/BattDischargeDaysum")
        );
    }

    #[test]
    fn summary_fixture_is_fully_decoded() {
        let (mut p, publisher) = processor();
        let data: PeriodicPoll = serde_json::from_str(&read_resource("periodic.json")).unwrap();
        p.process_periodic_on(data, day());

        assert_eq!(Some(Payload::Int(5120)), publisher.last("status/pac"));
        assert_eq!(
            Some(Payload::Str("19.10.26 12:00:00".into())),
            publisher.last("info/lastSync")
        );
        assert_eq!(Some(Payload::Int(9800)), publisher.last("info/totalPower"));
        assert_eq!(9800, p.cache.total_power);
        assert_eq!(21000, p.cache.yield_day);
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let (mut p, publisher) = processor();
        let payload = json!({
            "778": {"0": [["18.10.26", 800], ["19.10.26", 600]]},
            "801": {"170": {"101": 1500, "105": 3600, "106": 4000}}
        });

        p.process_periodic_on(periodic(payload.clone()), day());
        let first = publisher.snapshot();
        publisher.clear();
        p.process_periodic_on(periodic(payload), day());

        assert_eq!(first, publisher.snapshot());
    }
}
