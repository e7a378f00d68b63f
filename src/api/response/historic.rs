use super::{at, int_or_zero, Field};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct Historic {
    /// `[date, [per-inverter Wh]]` per year
    #[serde(rename = "854", default)]
    pub yearly_by_inverter: Field<Vec<Value>>,
    /// Monthly aggregate rows, oldest first
    #[serde(rename = "877", default)]
    pub monthly: Field<Vec<Value>>,
    /// Yearly aggregate rows, oldest first
    #[serde(rename = "878", default)]
    pub yearly: Field<Vec<Value>>,
}

/// `[date, yield, consumption, self-consumption]`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub date: String,
    pub yield_wh: i64,
    pub consumption: i64,
    pub self_consumption: i64,
}

impl AggregateRow {
    pub fn parse(row: &Value) -> Option<AggregateRow> {
        let items = row.as_array().filter(|items| items.len() >= 4)?;
        let date = items[0].as_str()?.to_string();

        Some(AggregateRow {
            date,
            yield_wh: int_or_zero(items.get(1)),
            consumption: int_or_zero(items.get(2)),
            self_consumption: int_or_zero(items.get(3)),
        })
    }
}

/// `[date, [per-inverter Wh]]`
#[derive(Debug, Clone, PartialEq)]
pub struct InverterYearRow {
    pub date: String,
    pub per_inverter: Value,
}

impl InverterYearRow {
    pub fn parse(row: &Value) -> Option<InverterYearRow> {
        let date = at(row, 0)?.as_str()?.to_string();
        let per_inverter = at(row, 1)?.clone();

        Some(InverterYearRow { date, per_inverter })
    }
}

/// Two-digit year of a `dd.mm.yy` date.
pub fn year_suffix(date: &str) -> Option<&str> {
    date.len().checked_sub(2).and_then(|start| date.get(start..))
}

/// Two-digit month of a `dd.mm.yy` date.
pub fn month(date: &str) -> Option<&str> {
    date.get(3..5)
}
