//! Polling cadences, the startup sequence and restart escalation.
//!
//! Every cadence is its own task looping over request, dispatch and sleep. Loops never end on a
//! failed request; they back off to a fallback interval and only stop when [`Shutdown`] fires.

use crate::api::request::{HistoricScope, RequestKind};
use crate::api::{Error, Transport};
use crate::dispatch::{dispatch, Outcome};
use crate::forecast::{next_forecast_run, ForecastSite, Forecaster};
use crate::health::check_health;
use crate::processor::{self, SharedProcessor};
use crate::publisher::Publish;
use crate::session::Session;
use crate::settings::Settings;
use crate::shutdown::{Shutdown, StopReason};
use crate::{HTTP_TIMEOUT, MAX_LOGIN_FAILURES, MAX_REQUEST_FAILURES};
use chrono::{Local, NaiveDateTime};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STARTUP_INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const STARTUP_MAX_BACKOFF: Duration = Duration::from_secs(60);

const FAST_FALLBACK: Duration = Duration::from_secs(10);
const PERIODIC_FALLBACK: Duration = Duration::from_secs(30);
const HISTORIC_FALLBACK: Duration = Duration::from_secs(3600);
const FORECAST_FALLBACK: Duration = Duration::from_secs(3600);
const FORECAST_INITIAL_DELAY: Duration = Duration::from_secs(60);
const HEALTH_FALLBACK: Duration = Duration::from_secs(60);
/// Pauses between the historic request and the two static resources.
const MONTHS_JSON_DELAY: Duration = Duration::from_secs(2);
const YEARS_JSON_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    AwaitingTables,
    TablesPresent,
    DeviceInfoRequested,
    Done,
}

impl StartupState {
    pub fn advance(self, tables_complete: bool) -> StartupState {
        match self {
            StartupState::AwaitingTables if tables_complete => StartupState::TablesPresent,
            StartupState::AwaitingTables => StartupState::AwaitingTables,
            StartupState::TablesPresent => StartupState::DeviceInfoRequested,
            StartupState::DeviceInfoRequested | StartupState::Done => StartupState::Done,
        }
    }
}

pub fn next_startup_backoff(delay: Duration) -> Duration {
    (delay * 2).min(STARTUP_MAX_BACKOFF)
}

/// Today at `hour:minute`, or tomorrow when that has passed.
pub fn next_daily_run(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    match now.date().and_hms_opt(hour, minute, 0) {
        Some(run) if run > now => run,
        Some(run) => run + chrono::Duration::days(1),
        None => now + chrono::Duration::days(1),
    }
}

/// Device count a device-info request should be issued for, if one is due.
///
/// The startup count wins over the number of entries seen in fast polls. Nothing is requested
/// while the known devices cover the count, or when that count was already requested.
pub fn device_info_target(
    num_inverters: usize,
    observed: usize,
    known: usize,
    last_requested: usize,
) -> Option<usize> {
    let target = if num_inverters > 0 {
        num_inverters
    } else {
        observed
    };
    if target > known && target != last_requested {
        Some(target)
    } else {
        None
    }
}

fn until(next: NaiveDateTime) -> Duration {
    (next - Local::now().naive_local())
        .to_std()
        .unwrap_or_default()
}

pub struct Bridge<T> {
    session: Arc<Session<T>>,
    processor: SharedProcessor,
    publisher: Arc<dyn Publish>,
    settings: Settings,
    shutdown: Shutdown,
    last_requested: AtomicUsize,
}

impl<T: Transport + 'static> Bridge<T> {
    pub fn new(
        session: Arc<Session<T>>,
        processor: SharedProcessor,
        publisher: Arc<dyn Publish>,
        settings: Settings,
        shutdown: Shutdown,
    ) -> Arc<Bridge<T>> {
        Arc::new(Bridge {
            session,
            processor,
            publisher,
            settings,
            shutdown,
            last_requested: AtomicUsize::new(0),
        })
    }

    /// Request, decode and escalate. `None` when every attempt failed.
    pub async fn issue(&self, kind: RequestKind) -> Option<Outcome> {
        let payload = match self.session.request(&kind).await {
            Some(payload) => payload,
            None => {
                self.escalate();
                return None;
            }
        };

        let outcome = dispatch(&self.processor, &kind, payload);
        if outcome == Outcome::AccessDenied {
            self.shutdown
                .trigger(StopReason::Restart(String::from("Access denied")));
        }
        Some(outcome)
    }

    fn escalate(&self) {
        if self.session.request_failures() > MAX_REQUEST_FAILURES {
            log::error!(
                "{} consecutive request failures",
                self.session.request_failures()
            );
            self.shutdown
                .trigger(StopReason::Restart(String::from("Request failures")));
        } else if self.session.login_failures() > MAX_LOGIN_FAILURES {
            log::error!(
                "{} consecutive login failures",
                self.session.login_failures()
            );
            self.shutdown
                .trigger(StopReason::Restart(String::from("Login failures")));
        }
    }

    async fn request_device_info(&self, count: usize) {
        log::info!("Requesting device info for {} devices", count);
        self.last_requested.store(count, Ordering::SeqCst);
        if self.issue(RequestKind::DeviceInfo(count)).await.is_none() {
            log::warn!("Device info request failed, classification waits for the next one");
        }
    }

    fn pending_device_info(&self) -> Option<usize> {
        let p = processor::lock(&self.processor);
        device_info_target(
            p.topology.num_inverters,
            p.observed_devices,
            p.topology.len(),
            self.last_requested.load(Ordering::SeqCst),
        )
    }

    /// Request startup data until the device tables arrive, then the device info. Returns
    /// `false` when stopped on the way.
    pub async fn run_startup(&self) -> bool {
        let mut state = StartupState::AwaitingTables;
        let mut delay = STARTUP_INITIAL_BACKOFF;

        loop {
            if !self.shutdown.is_running() {
                return false;
            }
            log::debug!("Startup sequence: {:?}", state);

            state = match state {
                StartupState::AwaitingTables => {
                    log::info!("Requesting startup data");
                    self.issue(RequestKind::Startup).await;
                    let complete = processor::lock(&self.processor).tables.is_complete();
                    let next = state.advance(complete);
                    if next == StartupState::AwaitingTables {
                        log::warn!("Device tables not available yet, retrying in {:?}", delay);
                        if !self.shutdown.sleep(delay).await {
                            return false;
                        }
                        delay = next_startup_backoff(delay);
                    }
                    next
                }
                StartupState::TablesPresent => {
                    let count = processor::lock(&self.processor).topology.num_inverters;
                    self.request_device_info(count).await;
                    state.advance(true)
                }
                StartupState::DeviceInfoRequested => {
                    log::info!("Startup sequence complete");
                    state.advance(true)
                }
                StartupState::Done => return true,
            };
        }
    }

    async fn fast_loop(self: Arc<Self>) {
        while self.shutdown.is_running() {
            let wait = match self.issue(RequestKind::Fast).await {
                Some(_) => {
                    if let Some(count) = self.pending_device_info() {
                        self.request_device_info(count).await;
                    }
                    self.settings.fast_interval()
                }
                None => FAST_FALLBACK,
            };
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }
        log::debug!("Fast polling stopped");
    }

    async fn poll_loop(self: Arc<Self>, kind: RequestKind, interval: Duration, fallback: Duration) {
        while self.shutdown.is_running() {
            let wait = match self.issue(kind).await {
                Some(_) => interval,
                None => fallback,
            };
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }
        log::debug!("{} polling stopped", kind.label());
    }

    async fn periodic_loop(self: Arc<Self>) {
        // the seed poll already ran
        if self.shutdown.sleep(self.settings.periodic_interval()).await {
            let interval = self.settings.periodic_interval();
            self.poll_loop(RequestKind::Periodic, interval, PERIODIC_FALLBACK)
                .await;
        }
    }

    async fn collect_historic(&self) -> bool {
        let model = processor::lock(&self.processor).model;
        let scope = HistoricScope::for_model(model);
        log::info!("Getting long term historic data ({:?}, model {:?})", scope, model);

        let ok = self.issue(RequestKind::Historic(scope)).await.is_some();
        if !self.shutdown.sleep(MONTHS_JSON_DELAY).await {
            return ok;
        }
        self.issue(RequestKind::MonthsJson).await;
        if !self.shutdown.sleep(YEARS_JSON_DELAY).await {
            return ok;
        }
        self.issue(RequestKind::YearsJson).await;
        ok
    }

    async fn historic_loop(self: Arc<Self>) {
        loop {
            let now = Local::now().naive_local();
            let next = next_daily_run(now, self.settings.historic_hour, self.settings.historic_minute);
            let wait = until(next);
            log::info!(
                "Historic data scheduled for {}, sleeping {:.1} hours",
                next,
                wait.as_secs_f64() / 3600.0
            );
            if !self.shutdown.sleep(wait).await {
                break;
            }

            if !self.collect_historic().await && !self.shutdown.sleep(HISTORIC_FALLBACK).await {
                break;
            }
        }
        log::debug!("Historic polling stopped");
    }

    async fn forecast_loop(self: Arc<Self>, forecaster: Forecaster) {
        if !self.shutdown.sleep(FORECAST_INITIAL_DELAY).await {
            return;
        }

        loop {
            let total_power = processor::lock(&self.processor).cache.total_power;
            let wait = match forecaster.update(total_power).await {
                Ok(()) => {
                    let next = next_forecast_run(Local::now().naive_local());
                    log::debug!("Next forecast call at {}", next);
                    until(next)
                }
                Err(e) => {
                    log::warn!("Forecast update failed: {}", e);
                    FORECAST_FALLBACK
                }
            };
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }
        log::debug!("Forecast polling stopped");
    }

    async fn health_loop(self: Arc<Self>, interval: Duration) {
        loop {
            let wait = if check_health(self.publisher.as_ref(), &self.session).await {
                interval
            } else {
                interval.min(HEALTH_FALLBACK)
            };
            if !self.shutdown.sleep(wait).await {
                break;
            }
        }
    }

    /// Start every configured cadence and wait for the stop signal.
    pub async fn run(self: Arc<Self>) -> StopReason {
        if self.session.requires_login() && !self.session.login().await {
            log::warn!("Initial login failed, retrying with the first request");
        }

        if self.settings.inverter_import {
            log::info!("Starting startup sequence (inverter import enabled)");
            if self.run_startup().await {
                log::info!("Seeding first periodic poll");
                self.issue(RequestKind::Periodic).await;

                tokio::spawn(self.clone().fast_loop());
                tokio::spawn(self.clone().periodic_loop());
            }
        } else {
            log::info!("Requesting basic startup data (inverter import disabled)");
            self.issue(RequestKind::BasicInfo).await;

            let interval = self.settings.fast_interval();
            tokio::spawn(self.clone().poll_loop(RequestKind::Summary, interval, FAST_FALLBACK));
        }

        if self.settings.historic_data {
            log::info!(
                "Historic data enabled - collection at {}:{:02}",
                self.settings.historic_hour,
                self.settings.historic_minute
            );
            tokio::spawn(self.clone().historic_loop());
        }

        if self.settings.forecast_enabled {
            let forecaster = ForecastSite::from_settings(&self.settings)
                .ok_or_else(|| Error::ValidationFailure("forecast site not configured".into()))
                .and_then(|site| Forecaster::new(site, self.publisher.clone(), HTTP_TIMEOUT));
            match forecaster {
                Ok(forecaster) => {
                    log::info!("External forecast API enabled");
                    tokio::spawn(self.clone().forecast_loop(forecaster));
                }
                Err(e) => log::warn!("Forecast disabled: {}", e),
            }
        }

        if self.settings.health_check_interval > 0 {
            let interval = Duration::from_secs(self.settings.health_check_interval);
            log::info!("Health monitoring enabled - check every {:?}", interval);
            tokio::spawn(self.clone().health_loop(interval));
        }

        self.shutdown.stopped().await
    }
}
