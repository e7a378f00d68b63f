use crate::api::endpoint::FORECAST_ESTIMATE;
use crate::api::response::int_or_zero;
use crate::api::Error;
use crate::publisher::Publish;
use crate::settings::Settings;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;
use std::sync::Arc;

/// Installed power assumed until the device reports one.
const DEFAULT_KWP: f64 = 5.0;
const FORECAST_MINUTE: u32 = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSite {
    pub latitude: f64,
    pub longitude: f64,
    pub declination: i64,
    pub azimuth: i64,
}

impl ForecastSite {
    pub fn from_settings(settings: &Settings) -> Option<ForecastSite> {
        Some(ForecastSite {
            latitude: settings.forecast_latitude?,
            longitude: settings.forecast_longitude?,
            declination: settings.forecast_declination,
            azimuth: settings.forecast_azimuth,
        })
    }
}

/// Estimate URL for `site`, sized by the last reported total power in W.
pub fn forecast_url(site: &ForecastSite, total_power: i64) -> String {
    let kwp = if total_power > 0 {
        total_power as f64 / 1000.0
    } else {
        DEFAULT_KWP
    };

    format!(
        "{}{}/{}/{}/{}/{}",
        FORECAST_ESTIMATE, site.latitude, site.longitude, site.declination, site.azimuth, kwp
    )
}

/// Next full hour plus 25 minutes.
pub fn next_forecast_run(now: NaiveDateTime) -> NaiveDateTime {
    let next = now + Duration::hours(1);
    next.with_minute(FORECAST_MINUTE)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(next)
}

/// Publish today's and tomorrow's estimate from a forecast response body.
pub fn publish_forecast(
    body: &Value,
    site: &ForecastSite,
    today: NaiveDate,
    publisher: &dyn Publish,
) -> Result<(i64, i64), Error> {
    let message = &body["message"];
    if message["type"].as_str() != Some("success") {
        return Err(Error::Forecast(
            message["text"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string(),
        ));
    }

    let result = &body["result"];
    let estimate = |day: Option<NaiveDate>| {
        day.map_or(0, |d| {
            int_or_zero(result.get(d.format("%Y-%m-%d").to_string()))
        })
    };
    let wh_today = estimate(Some(today));
    let wh_tomorrow = estimate(today.succ_opt());

    publisher.publish("forecast/today", wh_today.into());
    publisher.publish("forecast/tomorrow", wh_tomorrow.into());
    publisher.publish("info/latitude", site.latitude.into());
    publisher.publish("info/longitude", site.longitude.into());
    publisher.publish("info/inclination", site.declination.into());
    publisher.publish("info/azimuth", site.azimuth.into());

    Ok((wh_today, wh_tomorrow))
}

/// Client of the external estimate service.
pub struct Forecaster {
    client: reqwest::Client,
    site: ForecastSite,
    publisher: Arc<dyn Publish>,
}

impl Forecaster {
    pub fn new(
        site: ForecastSite,
        publisher: Arc<dyn Publish>,
        timeout: std::time::Duration,
    ) -> Result<Forecaster, Error> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Forecast(format!("Unable to build HTTP client: {}", e)))?;

        Ok(Forecaster {
            client,
            site,
            publisher,
        })
    }

    pub async fn update(&self, total_power: i64) -> Result<(), Error> {
        let url = forecast_url(&self.site, total_power);
        log::debug!("Forecast API request: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Forecast(e.to_string()))?;
        if response.status() != http::StatusCode::OK {
            return Err(Error::Forecast(format!("HTTP error: {}", response.status())));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Forecast(format!("Malformed response: {}", e)))?;

        let (today, tomorrow) = publish_forecast(
            &body,
            &self.site,
            Local::now().date_naive(),
            self.publisher.as_ref(),
        )?;
        log::info!("Forecast - Today: {}Wh, Tomorrow: {}Wh", today, tomorrow);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::publisher::test::RecordingPublisher;
    use crate::publisher::Payload;
    use serde_json::json;

    fn site() -> ForecastSite {
        ForecastSite {
            latitude: 48.1,
            longitude: 11.6,
            declination: 30,
            azimuth: 180,
        }
    }

    #[test]
    fn url_uses_reported_power() {
        assert_eq!(
            "https://api.forecast.solar/estimate/watthours/day/48.1/11.6/30/180/9.8",
            forecast_url(&site(), 9800)
        );
        assert!(forecast_url(&site(), 0).ends_with("/180/5"));
    }

    #[test]
    fn next_run_is_next_hour_at_25() {
        let now = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(23, 40, 12)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2026, 10, 20)
            .unwrap()
            .and_hms_opt(0, 25, 0)
            .unwrap();
        assert_eq!(expected, next_forecast_run(now));
    }

    #[test]
    fn success_publishes_estimates_and_site() {
        let publisher = RecordingPublisher::new();
        let body = json!({
            "result": {"2026-10-19": 12500, "2026-10-20": 8300},
            "message": {"type": "success", "code": 0}
        });

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let result = publish_forecast(&body, &site(), today, publisher.as_ref());

        assert_eq!(Ok((12500, 8300)), result);
        assert_eq!(Some(Payload::Int(8300)), publisher.last("forecast/tomorrow"));
        assert_eq!(Some(Payload::Float(48.1)), publisher.last("info/latitude"));
        assert_eq!(Some(Payload::Int(180)), publisher.last("info/azimuth"));
    }

    #[test]
    fn api_error_publishes_nothing() {
        let publisher = RecordingPublisher::new();
        let body = json!({"message": {"type": "error", "text": "Rate limit"}});

        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let result = publish_forecast(&body, &site(), today, publisher.as_ref());

        assert_eq!(Err(Error::Forecast("Rate limit".into())), result);
        assert!(publisher.snapshot().is_empty());
    }
}
