use crate::api::Error;
use config::Config;
use std::time::Duration;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_ENV: &str = "SOLARLOG2MQTT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "/etc/solarlog2mqtt";
const ENV_PREFIX: &str = "SL";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Settings {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_keepalive: u64,
    pub mqtt_clientid: String,
    pub mqtt_user: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic: String,
    pub mqtt_tls: bool,
    pub mqtt_ca_path: Option<String>,

    pub solarlog_host: String,
    pub solarlog_port: u16,
    pub solarlog_user: Option<String>,
    pub solarlog_password: Option<String>,

    pub poll_interval_current: u64,
    pub poll_interval_periodic: u64,
    pub inverter_import: bool,

    pub historic_data: bool,
    pub historic_hour: u32,
    pub historic_minute: u32,

    pub forecast_enabled: bool,
    pub forecast_latitude: Option<f64>,
    pub forecast_longitude: Option<f64>,
    pub forecast_declination: i64,
    pub forecast_azimuth: i64,

    /// Seconds between health checks, 0 disables them
    pub health_check_interval: u64,
    pub restart_delay: u64,
    pub timestamp: bool,
    /// Port of the internal metrics endpoint, 0 disables it
    pub metrics_port: u16,
}

fn config_error(e: config::ConfigError) -> Error {
    Error::ValidationFailure(e.to_string())
}

/// Configuration holding only the defaults.
pub fn defaults() -> Result<Config, Error> {
    let mut settings = Config::default();
    settings
        .set_default("mqtt_host", "localhost")
        .and_then(|s| s.set_default("mqtt_port", 1883i64))
        .and_then(|s| s.set_default("mqtt_keepalive", 30i64))
        .and_then(|s| s.set_default("mqtt_clientid", "solarlog2mqtt"))
        .and_then(|s| s.set_default("mqtt_topic", "solarlog"))
        .and_then(|s| s.set_default("mqtt_tls", false))
        .and_then(|s| s.set_default("solarlog_host", "192.168.1.100"))
        .and_then(|s| s.set_default("solarlog_port", 80i64))
        .and_then(|s| s.set_default("poll_interval_current", 30i64))
        .and_then(|s| s.set_default("poll_interval_periodic", 300i64))
        .and_then(|s| s.set_default("inverter_import", true))
        .and_then(|s| s.set_default("historic_data", false))
        .and_then(|s| s.set_default("historic_hour", 0i64))
        .and_then(|s| s.set_default("historic_minute", 0i64))
        .and_then(|s| s.set_default("forecast_enabled", false))
        .and_then(|s| s.set_default("forecast_declination", 30i64))
        .and_then(|s| s.set_default("forecast_azimuth", 180i64))
        .and_then(|s| s.set_default("health_check_interval", 0i64))
        .and_then(|s| s.set_default("restart_delay", 90i64))
        .and_then(|s| s.set_default("timestamp", false))
        .and_then(|s| s.set_default("metrics_port", 0i64))
        .map_err(config_error)?;

    Ok(settings)
}

/// Defaults, then the optional configuration file, then `SL_*` environment variables.
pub fn read_settings() -> Result<Settings, Error> {
    let path = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    let mut settings = defaults()?;
    settings
        .merge(config::File::with_name(&path).required(false))
        .and_then(|s| s.merge(config::Environment::with_prefix(ENV_PREFIX)))
        .map_err(config_error)?;

    let settings: Settings = settings.try_into().map_err(config_error)?;
    settings.validate()?;
    Ok(settings)
}

fn require(ok: bool, message: &str) -> Result<(), Error> {
    if ok {
        Ok(())
    } else {
        Err(Error::ValidationFailure(message.to_string()))
    }
}

impl Settings {
    /// Reject out-of-range values before anything starts.
    pub fn validate(&self) -> Result<(), Error> {
        require(self.mqtt_port > 0, "mqtt_port must be within 1-65535")?;
        require(self.solarlog_port > 0, "solarlog_port must be within 1-65535")?;
        require(self.mqtt_keepalive > 0, "mqtt_keepalive must be positive")?;
        require(
            self.poll_interval_current > 0,
            "poll_interval_current must be positive",
        )?;
        require(
            self.poll_interval_periodic > 0,
            "poll_interval_periodic must be positive",
        )?;
        require(self.historic_hour <= 23, "historic_hour must be within 0-23")?;
        require(self.historic_minute <= 59, "historic_minute must be within 0-59")?;
        require(
            !self.mqtt_tls || self.mqtt_ca_path.is_some(),
            "mqtt_tls requires mqtt_ca_path",
        )?;

        if self.forecast_enabled {
            let latitude = self.forecast_latitude.ok_or_else(|| {
                Error::ValidationFailure("forecast_latitude is required for the forecast".into())
            })?;
            let longitude = self.forecast_longitude.ok_or_else(|| {
                Error::ValidationFailure("forecast_longitude is required for the forecast".into())
            })?;
            require(
                (-90.0..=90.0).contains(&latitude),
                "forecast_latitude must be within -90..90",
            )?;
            require(
                (-180.0..=180.0).contains(&longitude),
                "forecast_longitude must be within -180..180",
            )?;
            require(
                (0..=90).contains(&self.forecast_declination),
                "forecast_declination must be within 0-90",
            )?;
            require(
                (0..=360).contains(&self.forecast_azimuth),
                "forecast_azimuth must be within 0-360",
            )?;
        }

        Ok(())
    }

    /// Device password, when both user and password are configured.
    pub fn solarlog_credentials(&self) -> Option<String> {
        match (&self.solarlog_user, &self.solarlog_password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(password.to_owned())
            }
            _ => None,
        }
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_current)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_periodic)
    }
}
