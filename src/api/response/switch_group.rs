use super::Field;
use serde::Deserialize;
use serde_json::Value;

/// One slot of the switch group table (447), both in the startup and the periodic response.
#[derive(Debug, Default, Deserialize)]
pub struct SwitchGroupEntry {
    #[serde(rename = "100", default)]
    pub name: Field<String>,
    #[serde(rename = "101", default)]
    pub linked: Field<Vec<LinkedDevice>>,
    #[serde(rename = "102", default)]
    pub mode: Field<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkedDevice {
    /// Index into the inverter table
    #[serde(rename = "100", default)]
    pub device: Field<Value>,
    #[serde(rename = "101", default)]
    pub sub_unit: Field<Value>,
}

/// Live state of a switch group (801/175).
#[derive(Debug, Default, Deserialize)]
pub struct SwitchState {
    #[serde(rename = "101", default)]
    pub state: Field<Value>,
}
