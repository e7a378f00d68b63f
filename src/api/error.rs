use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("device responded with HTTP {0}")]
    HttpStatus(u16),
    #[error("unable to decode response: {0}")]
    DecodeFailure(String),
    #[error("invalid configuration: {0}")]
    ValidationFailure(String),
    #[error("device reported access denied")]
    AccessDenied,
    #[error("MQTT error: {0}")]
    Mqtt(String),
    #[error("forecast API error: {0}")]
    Forecast(String),
}

impl Error {
    /// Errors raised by the wire itself, as opposed to the device refusing or the payload being
    /// garbage. Only these count towards the restart threshold.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::TransportFailure(_) | Error::Timeout(_) | Error::HttpStatus(_)
        )
    }
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = match self {
            Error::AuthFailure(_) | Error::AccessDenied => Status::Forbidden,
            Error::Timeout(_) => Status::GatewayTimeout,
            Error::TransportFailure(_) | Error::HttpStatus(_) => Status::BadGateway,
            _ => Status::InternalServerError,
        };
        let body = self.to_string();

        Response::build()
            .status(status)
            .sized_body(body.len(), Cursor::new(body))
            .header(ContentType::Plain)
            .ok()
    }
}
