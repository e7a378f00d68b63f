pub mod endpoint;
pub mod error;
pub mod request;
pub mod response;

use async_trait::async_trait;
use endpoint::Endpoint;
pub use error::Error;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Response;
use request::RequestKind;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SESSION_COOKIE: &str = "SolarLog";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/80.0.3987.149 Safari/537.36";

/// Wire access to the device. Implementations return the raw outcome; counting, retrying and
/// re-authenticating is left to the session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit the password and return the session token.
    async fn login(&self, password: &str) -> Result<String, Error>;

    /// Body of the login status endpoint.
    async fn check(&self, token: &str) -> Result<String, Error>;

    /// Issue `kind` and parse the response as JSON.
    async fn request(&self, token: &str, kind: &RequestKind) -> Result<Value, Error>;

    /// HTTP status of a plain GET on `path`.
    async fn probe(&self, path: &Endpoint) -> Result<u16, Error>;
}

#[derive(Debug, Clone)]
pub struct SolarLogClient {
    address: String,
    client: reqwest::Client,
}

impl SolarLogClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<SolarLogClient, Error> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::TransportFailure(format!("Unable to build HTTP client: {}", e)))?;

        Ok(SolarLogClient {
            address: device_address(host, port),
            client,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Headers the device's own web frontend sends with data requests.
    fn data_headers(&self, token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.address)) {
            headers.insert(header::REFERER, referer);
        }
        headers.extend(cookie_header(token));
        headers
    }

    async fn text(response: Response) -> Result<String, Error> {
        response
            .error_for_status()
            .map_err(map_api_err)?
            .text()
            .await
            .map_err(|e| Error::TransportFailure(format!("Error reading device response: {}", e)))
    }
}

/// `http://host[:port]`, leaving an explicit scheme in `host` alone.
pub fn device_address(host: &str, port: u16) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    if port == 80 {
        base
    } else {
        format!("{}:{}", base, port)
    }
}

fn cookie_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cookie = if token.is_empty() {
        String::from("banner_hidden=false")
    } else {
        format!("banner_hidden=false; {}={}", SESSION_COOKIE, token)
    };
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::COOKIE, value);
    }
    headers
}

/// The device answers a successful login with `Set-Cookie: SolarLog=<token>; path=/`.
fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn extract_session_token(response: Response) -> Result<String, Error> {
    session_token(response.headers()).ok_or_else(|| {
        Error::AuthFailure(format!(
            "Login answered {} without a {} cookie",
            response.status(),
            SESSION_COOKIE
        ))
    })
}

/// Map a failed HTTP exchange to Error
fn map_api_err(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        return Error::Timeout(error.to_string());
    }
    match error.status() {
        Some(http::StatusCode::UNAUTHORIZED) | Some(http::StatusCode::FORBIDDEN) => {
            Error::AuthFailure(error.to_string())
        }
        Some(status) => Error::HttpStatus(status.as_u16()),
        None => Error::TransportFailure(error.to_string()),
    }
}

fn parse_json(body: &str) -> Result<Value, Error> {
    serde_json::from_str::<Value>(body).map_err(|e| {
        let preview: String = body.chars().take(80).collect();
        Error::DecodeFailure(format!("{} in {:?}", e, preview))
    })
}

fn cache_buster() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[async_trait]
impl Transport for SolarLogClient {
    async fn login(&self, password: &str) -> Result<String, Error> {
        let url = format!("{}{}", self.address, endpoint::LOGIN);

        self.client
            .post(url)
            .headers(cookie_header(""))
            .body(format!("u=user&p={}", password))
            .send()
            .await
            .map_err(map_api_err)?
            .error_for_status()
            .map_err(map_api_err)
            .and_then(extract_session_token)
    }

    async fn check(&self, token: &str) -> Result<String, Error> {
        let url = format!("{}{}", self.address, endpoint::LOGCHECK);

        let response = self
            .client
            .get(url)
            .headers(cookie_header(token))
            .send()
            .await
            .map_err(map_api_err)?;

        Self::text(response).await
    }

    async fn request(&self, token: &str, kind: &RequestKind) -> Result<Value, Error> {
        let response = match kind.static_path() {
            Some(path) => {
                let url = format!("{}{}{}", self.address, path, cache_buster());
                self.client.get(url).headers(self.data_headers(token))
            }
            None => {
                let url = format!("{}{}", self.address, endpoint::GETJP);
                self.client
                    .post(url)
                    .headers(self.data_headers(token))
                    .body(format!("token={};preval=none;{}", token, kind.body()))
            }
        }
        .send()
        .await
        .map_err(map_api_err)?;

        let body = Self::text(response).await?;
        log::trace!("{} response: {}", kind.label(), body);
        parse_json(&body)
    }

    async fn probe(&self, path: &Endpoint) -> Result<u16, Error> {
        let url = format!("{}{}", self.address, path);

        self.client
            .get(url)
            .send()
            .await
            .map_err(map_api_err)
            .map(|response| response.status().as_u16())
    }
}
