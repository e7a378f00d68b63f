use super::switch_group::SwitchGroupEntry;
use super::{Field, SparseTable};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Rolling window of dated rows, newest somewhere inside the last 31 entries.
#[derive(Debug, Default, Deserialize)]
pub struct WindowBlock {
    #[serde(rename = "0", default)]
    pub rows: Field<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Summary {
    #[serde(rename = "100", default)]
    pub last_sync: Field<Value>,
    #[serde(rename = "101", default)]
    pub pac: Field<Value>,
    #[serde(rename = "102", default)]
    pub pdc: Field<Value>,
    #[serde(rename = "103", default)]
    pub uac: Field<Value>,
    #[serde(rename = "104", default)]
    pub udc: Field<Value>,
    #[serde(rename = "105", default)]
    pub yield_day: Field<Value>,
    #[serde(rename = "106", default)]
    pub yield_yesterday: Field<Value>,
    #[serde(rename = "107", default)]
    pub yield_month: Field<Value>,
    #[serde(rename = "108", default)]
    pub yield_year: Field<Value>,
    #[serde(rename = "109", default)]
    pub yield_total: Field<Value>,
    #[serde(rename = "110", default)]
    pub cons_pac: Field<Value>,
    #[serde(rename = "111", default)]
    pub cons_yield_day: Field<Value>,
    #[serde(rename = "112", default)]
    pub cons_yield_yesterday: Field<Value>,
    #[serde(rename = "113", default)]
    pub cons_yield_month: Field<Value>,
    #[serde(rename = "114", default)]
    pub cons_yield_year: Field<Value>,
    #[serde(rename = "115", default)]
    pub cons_yield_total: Field<Value>,
    #[serde(rename = "116", default)]
    pub total_power: Field<Value>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Summary {
    pub fn missing_keys(&self) -> Vec<&'static str> {
        [
            ("100", &self.last_sync),
            ("101", &self.pac),
            ("102", &self.pdc),
            ("103", &self.uac),
            ("104", &self.udc),
            ("105", &self.yield_day),
            ("106", &self.yield_yesterday),
            ("107", &self.yield_month),
            ("108", &self.yield_year),
            ("109", &self.yield_total),
            ("110", &self.cons_pac),
            ("111", &self.cons_yield_day),
            ("112", &self.cons_yield_yesterday),
            ("113", &self.cons_yield_month),
            ("114", &self.cons_yield_year),
            ("115", &self.cons_yield_total),
            ("116", &self.total_power),
        ]
        .iter()
        .filter(|(_, field)| field.is_absent())
        .map(|(key, _)| *key)
        .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryBlock {
    #[serde(rename = "170", default)]
    pub summary: Field<Summary>,
}

/// Response to the periodic request, and to the summary-only request of simple mode.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodicPoll {
    #[serde(rename = "447", default)]
    pub switch_groups: Field<SparseTable<SwitchGroupEntry>>,
    /// `[date, [per-inverter Wh]]` rows
    #[serde(rename = "777", default)]
    pub day_sums: Field<WindowBlock>,
    /// `[date, selfcons, batt selfcons, batt charge, batt discharge]` rows
    #[serde(rename = "778", default)]
    pub self_consumption: Field<WindowBlock>,
    #[serde(rename = "801", default)]
    pub summary: Field<SummaryBlock>,
}
