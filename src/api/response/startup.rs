use super::switch_group::SwitchGroupEntry;
use super::{Field, SparseTable};
use crate::model::DeviceRecord;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "100", default)]
    pub model: Field<Value>,
    #[serde(rename = "160", default)]
    pub install_date: Field<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FirmwareBlock {
    #[serde(rename = "101", default)]
    pub version: Field<Value>,
    #[serde(rename = "102", default)]
    pub release_date: Field<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SdCardBlock {
    #[serde(rename = "100", default)]
    pub k100: Field<Value>,
    #[serde(rename = "101", default)]
    pub k101: Field<Value>,
    #[serde(rename = "102", default)]
    pub k102: Field<Value>,
    #[serde(rename = "103", default)]
    pub k103: Field<Value>,
    #[serde(rename = "104", default)]
    pub k104: Field<Value>,
    #[serde(rename = "105", default)]
    pub k105: Field<Value>,
}

/// Response to the startup request. Also used for the reduced basic-info request, which simply
/// leaves the discovery fields absent.
#[derive(Debug, Default, Deserialize)]
pub struct Startup {
    /// Monthly share of the yearly yield, in percent
    #[serde(rename = "152", default)]
    pub monthly_weights: Field<Vec<f64>>,
    /// Installed power (W)
    #[serde(rename = "161", default)]
    pub power: Field<f64>,
    /// Specific yield (kWh/kWp)
    #[serde(rename = "162", default)]
    pub efficiency: Field<f64>,
    #[serde(rename = "447", default)]
    pub switch_groups: Field<SparseTable<SwitchGroupEntry>>,
    #[serde(rename = "610", default)]
    pub rtos: Field<Value>,
    #[serde(rename = "611", default)]
    pub clib: Field<Value>,
    #[serde(rename = "617", default)]
    pub mac: Field<Value>,
    #[serde(rename = "706", default)]
    pub serial: Field<Value>,
    #[serde(rename = "739", default)]
    pub device_list: Field<SparseTable<DeviceRecord>>,
    /// Per-index device status, terminated by `"Err"`
    #[serde(rename = "740", default)]
    pub device_status: Field<Value>,
    #[serde(rename = "744", default)]
    pub brand_list: Field<SparseTable<String>>,
    #[serde(rename = "800", default)]
    pub system: Field<SystemBlock>,
    #[serde(rename = "801", default)]
    pub firmware: Field<FirmwareBlock>,
    #[serde(rename = "858", default)]
    pub battery: Field<Vec<Value>>,
    #[serde(rename = "895", default)]
    pub sd_card: Field<SdCardBlock>,
}
