use crate::api::request::RequestKind;
use crate::api::{Error, Transport};
use crate::metrics;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Upper bound of the delay between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Authenticated access to the device.
///
/// Holds the session token and the failure counters the scheduler consults for restart
/// escalation. Transport errors are logged and counted here; callers only see `bool`/`Option`.
pub struct Session<T> {
    transport: T,
    password: Option<String>,
    token: Mutex<String>,
    login_failures: AtomicU32,
    request_failures: AtomicU32,
}

impl<T: Transport> Session<T> {
    /// `password` is `None` when the device is not password protected.
    pub fn new(transport: T, password: Option<String>) -> Session<T> {
        Session {
            transport,
            password,
            token: Mutex::new(String::new()),
            login_failures: AtomicU32::new(0),
            request_failures: AtomicU32::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn requires_login(&self) -> bool {
        self.password.is_some()
    }

    pub fn login_failures(&self) -> u32 {
        self.login_failures.load(Ordering::SeqCst)
    }

    pub fn request_failures(&self) -> u32 {
        self.request_failures.load(Ordering::SeqCst)
    }

    fn token(&self) -> String {
        self.token.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn set_token(&self, token: String) {
        if let Ok(mut current) = self.token.lock() {
            *current = token;
        } else {
            log::warn!("Unable to lock session token, keeping the previous one");
        }
    }

    /// A session is active once a token is held, or always for unprotected devices.
    pub fn is_active(&self) -> bool {
        !self.requires_login() || !self.token().is_empty()
    }

    pub async fn login(&self) -> bool {
        let password = match &self.password {
            Some(password) => password,
            None => return true,
        };

        log::debug!("Attempting Solar-Log login");
        match self.transport.login(password).await {
            Ok(token) => {
                log::debug!(
                    "Login successful, token: {}...",
                    token.chars().take(10).collect::<String>()
                );
                self.set_token(token);
                self.login_failures.store(0, Ordering::SeqCst);
                true
            }
            Err(e) => {
                let failures = self.login_failures.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::LOGIN_FAILURES.inc();
                log::warn!("Login failed ({} consecutive): {}", failures, e);
                false
            }
        }
    }

    /// Verify the session, logging in again when the device reports it as gone.
    pub async fn check_login_status(&self) -> bool {
        if !self.requires_login() {
            return true;
        }

        match self.transport.check(&self.token()).await {
            Ok(body) => {
                if body.split(';').next().map(str::trim) == Some("0") {
                    log::info!("Not logged in, logging in");
                    self.login().await
                } else {
                    true
                }
            }
            Err(e) => {
                let failures = self.login_failures.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::LOGIN_FAILURES.inc();
                log::warn!("Login status check failed ({} consecutive): {}", failures, e);
                false
            }
        }
    }

    pub async fn request_with_auth_check(&self, kind: &RequestKind) -> Result<Value, Error> {
        if !self.check_login_status().await {
            return Err(Error::AuthFailure(String::from("no valid session")));
        }

        metrics::REQUESTS.with_label_values(&[kind.label()]).inc();
        self.transport.request(&self.token(), kind).await
    }

    /// Issue `kind` up to `attempts` times, doubling the delay between attempts. Returns `None`
    /// once every attempt has failed.
    pub async fn request_with_retry(
        &self,
        kind: &RequestKind,
        attempts: u32,
        base_delay: Duration,
    ) -> Option<Value> {
        let mut delay = base_delay;

        for attempt in 1..=attempts {
            match self.request_with_auth_check(kind).await {
                Ok(value) => {
                    self.request_failures.store(0, Ordering::SeqCst);
                    return Some(value);
                }
                Err(e) => {
                    if e.is_transport() {
                        self.request_failures.fetch_add(1, Ordering::SeqCst);
                        metrics::REQUEST_FAILURES
                            .with_label_values(&[kind.label()])
                            .inc();
                    }
                    log::warn!(
                        "{} request failed (attempt {}/{}): {}",
                        kind.label(),
                        attempt,
                        attempts,
                        e
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }

        log::error!("{} request failed after {} attempts", kind.label(), attempts);
        None
    }

    pub async fn request(&self, kind: &RequestKind) -> Option<Value> {
        self.request_with_retry(kind, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY)
            .await
    }
}
