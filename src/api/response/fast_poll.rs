use super::switch_group::SwitchState;
use super::{Field, SparseTable};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub struct DisplayBlock {
    /// `[icon, error]` pairs, 16 of them
    #[serde(rename = "0", default)]
    pub elements: Field<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SwitchStateBlock {
    #[serde(rename = "175", default)]
    pub states: Field<SparseTable<SwitchState>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FastPoll {
    /// Per-inverter status text
    #[serde(rename = "608", default)]
    pub status: Field<Value>,
    /// Total production (W)
    #[serde(rename = "780", default)]
    pub production: Field<Value>,
    /// Total consumption (W)
    #[serde(rename = "781", default)]
    pub consumption: Field<Value>,
    /// Per-inverter AC power
    #[serde(rename = "782", default)]
    pub pac: Field<Value>,
    #[serde(rename = "784", default)]
    pub uac: Field<Value>,
    #[serde(rename = "785", default)]
    pub udc: Field<Value>,
    #[serde(rename = "794", default)]
    pub display: Field<DisplayBlock>,
    #[serde(rename = "801", default)]
    pub switch_states: Field<SwitchStateBlock>,
    /// `[?, level, charge, discharge]`
    #[serde(rename = "858", default)]
    pub battery: Field<Vec<Value>>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}
