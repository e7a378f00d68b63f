use super::{Field, SparseTable};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "119", default)]
    pub name: Field<String>,
    #[serde(rename = "162", default)]
    pub info_code: Field<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "141", default)]
    pub devices: Field<SparseTable<DeviceEntry>>,
}
