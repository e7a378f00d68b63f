use super::{ratio, Processor};
use crate::api::response::historic::{month, year_suffix, AggregateRow, Historic, InverterYearRow};
use crate::api::response::{at, truthy};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Period {
    Month,
    Year,
}

impl Period {
    /// `(current, current ratio, previous, previous ratio)` self-consumption topics
    fn selfcons_topics(&self) -> [&'static str; 4] {
        match self {
            Period::Month => [
                "SelfCons/selfconsmonth",
                "SelfCons/selfconsratiomonth",
                "SelfCons/selfconslastmonth",
                "SelfCons/selfconsratiolastmonth",
            ],
            Period::Year => [
                "SelfCons/selfconsyear",
                "SelfCons/selfconsratioyear",
                "SelfCons/selfconslastyear",
                "SelfCons/selfconsratiolastyear",
            ],
        }
    }

    fn series_prefix(&self, date: &str) -> Option<String> {
        let year = year_suffix(date)?;
        match self {
            Period::Month => Some(format!("Historic/20{}/monthly/{}", year, month(date)?)),
            Period::Year => Some(format!("Historic/20{}", year)),
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl Processor {
    /// Decode the historic response (854/877/878). Aggregate rows come oldest first.
    pub fn process_historic(&self, data: Historic) {
        if let Some(rows) = data.yearly_by_inverter.value() {
            log::debug!("Processing yearly data (854): {} entries", rows.len());
            self.publish_inverter_years(rows);
        }
        if let Some(rows) = data.monthly.value() {
            log::debug!("Processing monthly totals (877): {} entries", rows.len());
            self.publish_aggregates(
                Period::Month,
                rows,
                rows.len().checked_sub(1),
                rows.len().checked_sub(2),
            );
        }
        if let Some(rows) = data.yearly.value() {
            log::debug!("Processing yearly totals (878): {} entries", rows.len());
            self.publish_aggregates(
                Period::Year,
                rows,
                rows.len().checked_sub(1),
                rows.len().checked_sub(2),
            );
        }
    }

    /// Decode `/months.json`, newest row first.
    pub fn process_months_json(&self, rows: &[Value]) {
        log::debug!("Processing monthly JSON data: {} entries", rows.len());
        self.publish_aggregates(Period::Month, rows, Some(0), Some(1));
    }

    /// Decode `/years.json`, newest row first.
    pub fn process_years_json(&self, rows: &[Value]) {
        log::debug!("Processing yearly JSON data: {} entries", rows.len());
        self.publish_aggregates(Period::Year, rows, Some(0), Some(1));
    }

    fn publish_inverter_years(&self, rows: &[Value]) {
        for row in rows.iter().filter_map(InverterYearRow::parse) {
            if !truthy(&row.per_inverter) {
                continue;
            }
            let year = match year_suffix(&row.date) {
                Some(year) => year,
                None => continue,
            };
            for (index, profile) in self.topology.profiles.iter().enumerate() {
                if let Some(value) = at(&row.per_inverter, index).filter(|v| truthy(v)) {
                    self.publish(
                        &format!("Historic/20{}/yieldyearINV/{}", year, profile.name),
                        value,
                    );
                }
            }
        }
    }

    /// Current and previous period figures need at least two rows; the dated series is
    /// published for every row with a yield.
    fn publish_aggregates(
        &self,
        period: Period,
        rows: &[Value],
        current: Option<usize>,
        previous: Option<usize>,
    ) {
        if rows.len() >= 2 {
            let [now, now_ratio, last, last_ratio] = period.selfcons_topics();
            for (index, topic, ratio_topic) in
                [(current, now, now_ratio), (previous, last, last_ratio)]
            {
                if let Some(row) = index.and_then(|i| rows.get(i)).and_then(AggregateRow::parse) {
                    self.publish(topic, row.self_consumption);
                    self.publish(ratio_topic, ratio(row.self_consumption, row.consumption));
                }
            }
        }

        let suffix = period.suffix();
        for row in rows.iter().filter_map(AggregateRow::parse) {
            if row.yield_wh == 0 {
                continue;
            }
            let prefix = match period.series_prefix(&row.date) {
                Some(prefix) => prefix,
                None => {
                    log::debug!("Skipping historic row with malformed date {:?}", row.date);
                    continue;
                }
            };
            self.publish(&format!("{}/yield{}", prefix, suffix), row.yield_wh);
            self.publish(&format!("{}/cons{}", prefix, suffix), row.consumption);
            self.publish(&format!("{}/selfcons{}", prefix, suffix), row.self_consumption);
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::processor;
    use super::*;
    use crate::api::response::test::read_resource;
    use crate::model::DeviceProfile;
    use crate::publisher::Payload;
    use serde_json::json;

    fn historic(value: Value) -> Historic {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn monthly_current_and_previous_from_the_end() {
        let (p, publisher) = processor();
        p.process_historic(historic(json!({"877": [
            ["01.08.26", 90, 70, 5],
            ["01.09.26", 100, 80, 10],
            ["01.10.26", 120, 90, 15]
        ]})));

        assert_eq!(Some(Payload::Int(15)), publisher.last("SelfCons/selfconsmonth"));
        assert_eq!(
            Some(Payload::Float(16.7)),
            publisher.last("SelfCons/selfconsratiomonth")
        );
        assert_eq!(Some(Payload::Int(10)), publisher.last("SelfCons/selfconslastmonth"));
        assert_eq!(
            Some(Payload::Float(12.5)),
            publisher.last("SelfCons/selfconsratiolastmonth")
        );
        assert_eq!(
            Some(Payload::Int(100)),
            publisher.last("Historic/2026/monthly/09/yieldmonth")
        );
        assert_eq!(
            Some(Payload::Int(5)),
            publisher.last("Historic/2026/monthly/08/selfconsmonth")
        );
    }

    #[test]
    fn single_row_only_feeds_the_series() {
        let (p, publisher) = processor();
        p.process_historic(historic(json!({"878": [["01.01.26", 5000, 3000, 1000]]})));

        assert_eq!(None, publisher.last("SelfCons/selfconsyear"));
        assert_eq!(Some(Payload::Int(3000)), publisher.last("Historic/2026/consyear"));
    }

    #[test]
    fn zero_consumption_publishes_zero_ratio() {
        let (p, publisher) = processor();
        p.process_historic(historic(json!({"878": [
            ["01.01.25", 0, 0, 0],
            ["01.01.26", 5000, 0, 1000]
        ]})));

        assert_eq!(Some(Payload::Float(0.0)), publisher.last("SelfCons/selfconsratioyear"));
        assert_eq!(None, publisher.last("Historic/2025/yieldyear"));
    }

    #[test]
    fn months_json_is_newest_first() {
        let (p, publisher) = processor();
        p.process_months_json(&[
            json!(["01.10.26", 120, 90, 15]),
            json!(["01.09.26", 100, 80, 10]),
        ]);

        assert_eq!(Some(Payload::Int(15)), publisher.last("SelfCons/selfconsmonth"));
        assert_eq!(Some(Payload::Int(10)), publisher.last("SelfCons/selfconslastmonth"));
        assert_eq!(
            Some(Payload::Int(90)),
            publisher.last("Historic/2026/monthly/10/consmonth")
        );
    }

    #[test]
    fn years_json_publishes_year_series() {
        let (p, publisher) = processor();
        p.process_years_json(&[
            json!(["01.01.26", 4000, 3000, 900]),
            json!(["01.01.25", 5000, 3500, 1400]),
        ]);

        assert_eq!(Some(Payload::Float(30.0)), publisher.last("SelfCons/selfconsratioyear"));
        assert_eq!(Some(Payload::Float(40.0)), publisher.last("SelfCons/selfconsratiolastyear"));
        assert_eq!(Some(Payload::Int(5000)), publisher.last("Historic/2025/yieldyear"));
    }

    #[test]
    fn yearly_yield_per_inverter() {
        let (mut p, publisher) = processor();
        p.topology.set_devices(vec![
            DeviceProfile::unclassified("WR1".into(), None),
            DeviceProfile::unclassified("WR2".into(), None),
        ]);

        p.process_historic(historic(json!({"854": [
            ["31.12.25", [8000, 0]],
            ["31.12.24", null]
        ]})));

        assert_eq!(
            Some(Payload::Int(8000)),
            publisher.last("Historic/2025/yieldyearINV/WR1")
        );
        assert_eq!(None, publisher.last("Historic/2025/yieldyearINV/WR2"));
        assert_eq!(1, publisher.count_prefix("Historic/"));
    }

    #[test]
    fn historic_fixture() {
        let (p, publisher) = processor();
        p.process_historic(serde_json::from_str(&read_resource("historic.json")).unwrap());

        assert_eq!(Some(Payload::Int(15)), publisher.last("SelfCons/selfconsmonth"));
        assert!(publisher.last("SelfCons/selfconsyear").is_some());
    }
}
