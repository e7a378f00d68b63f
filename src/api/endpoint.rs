pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/login";
pub const LOGCHECK: &Endpoint = "/logcheck?";
pub const GETJP: &Endpoint = "/getjp";
pub const ROOT: &Endpoint = "/";
/* Static resources take a cache-busting millisecond suffix */
pub const MONTHS_JSON: &Endpoint = "/months.json?_=";
pub const YEARS_JSON: &Endpoint = "/years.json?_=";

pub const FORECAST_ESTIMATE: &str = "https://api.forecast.solar/estimate/watthours/day/";
