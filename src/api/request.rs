use super::endpoint::{self, Endpoint};
use std::borrow::Cow;

/// Upper bound for the device-info request when the inverter count is unknown.
pub const MAX_DEVICES_DISCOVERY: usize = 64;

pub const STARTUP_DATA: &str = r#"{"152":null,"161":null,"162":null,"447":null,"610":null,"611":null,"617":null,"706":null,"739":null,"740":null,"744":null,"800":{"100":null,"160":null},"801":{"101":null,"102":null},"858":null,"895":{"100":null,"101":null,"102":null,"103":null,"104":null,"105":null}}"#;
pub const BASIC_INFO_DATA: &str = r#"{"610":null,"611":null,"617":null,"706":null,"800":{"100":null,"160":null},"801":{"101":null,"102":null}}"#;
pub const POLLING_DATA: &str = r#"{"447":null,"777":{"0":null},"778":{"0":null},"801":{"170":null}}"#;
pub const FAST_POLL_DATA: &str = r#"{"608":null,"780":null,"781":null,"782":null,"794":{"0":null},"801":{"175":null},"858":null}"#;
pub const SUMMARY_DATA: &str = r#"{"801":{"170":null}}"#;
pub const HISTORIC_DATA: &str = r#"{"854":null,"877":null,"878":null}"#;
pub const HISTORIC_YEARLY_DATA: &str = r#"{"854":null}"#;

/// Device model that only serves per-inverter yearly history over `/getjp`.
pub const MODEL_YEARLY_HISTORY_ONLY: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoricScope {
    /// 854, 877 and 878
    Full,
    /// 854 only
    YearlyOnly,
}

impl HistoricScope {
    pub fn for_model(model: Option<i64>) -> HistoricScope {
        match model {
            Some(MODEL_YEARLY_HISTORY_ONLY) => HistoricScope::YearlyOnly,
            _ => HistoricScope::Full,
        }
    }
}

/// Every request shape the bridge issues. The response to a request is routed by its kind, so
/// adding a variant forces a decoder to be chosen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Startup,
    BasicInfo,
    /// Names and info codes for this many device indices.
    DeviceInfo(usize),
    Fast,
    Periodic,
    Summary,
    Historic(HistoricScope),
    MonthsJson,
    YearsJson,
}

impl RequestKind {
    /// JSON query sent to `/getjp`. Static resources have no body.
    pub fn body(&self) -> Cow<'static, str> {
        match self {
            RequestKind::Startup => Cow::Borrowed(STARTUP_DATA),
            RequestKind::BasicInfo => Cow::Borrowed(BASIC_INFO_DATA),
            RequestKind::DeviceInfo(count) => Cow::Owned(device_info_body(*count)),
            RequestKind::Fast => Cow::Borrowed(FAST_POLL_DATA),
            RequestKind::Periodic => Cow::Borrowed(POLLING_DATA),
            RequestKind::Summary => Cow::Borrowed(SUMMARY_DATA),
            RequestKind::Historic(HistoricScope::Full) => Cow::Borrowed(HISTORIC_DATA),
            RequestKind::Historic(HistoricScope::YearlyOnly) => Cow::Borrowed(HISTORIC_YEARLY_DATA),
            RequestKind::MonthsJson | RequestKind::YearsJson => Cow::Borrowed(""),
        }
    }

    /// Path of the static JSON resource, for kinds that are fetched with GET.
    pub fn static_path(&self) -> Option<&'static Endpoint> {
        match self {
            RequestKind::MonthsJson => Some(endpoint::MONTHS_JSON),
            RequestKind::YearsJson => Some(endpoint::YEARS_JSON),
            _ => None,
        }
    }

    /// Short name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::Startup => "startup",
            RequestKind::BasicInfo => "basic_info",
            RequestKind::DeviceInfo(_) => "device_info",
            RequestKind::Fast => "fast",
            RequestKind::Periodic => "periodic",
            RequestKind::Summary => "summary",
            RequestKind::Historic(_) => "historic",
            RequestKind::MonthsJson => "months_json",
            RequestKind::YearsJson => "years_json",
        }
    }
}

fn device_info_body(count: usize) -> String {
    let count = if count == 0 { MAX_DEVICES_DISCOVERY } else { count };
    let entries: Vec<String> = (0..count)
        .map(|i| format!(r#""{}":{{"119":null,"162":null}}"#, i))
        .collect();

    format!(r#"{{"141":{{{}}}}}"#, entries.join(","))
}
