//! Routes a device response to the decoder for the request that produced it.

use crate::api::request::RequestKind;
use crate::api::response::device_info::DeviceInfo;
use crate::api::response::fast_poll::FastPoll;
use crate::api::response::historic::Historic;
use crate::api::response::periodic::PeriodicPoll;
use crate::api::response::startup::Startup;
use crate::api::Error;
use crate::processor::{self, Processor};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    /// The device refused access; the bridge has to restart.
    AccessDenied,
    /// The response did not have the shape of its request and was dropped.
    Ignored,
}

fn decode<T: DeserializeOwned>(kind: &RequestKind, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(data) => Some(data),
        Err(e) => {
            log::warn!("Ignoring malformed {} response: {}", kind.label(), e);
            None
        }
    }
}

/// Decode `payload` as the response to `kind`. The processor is held for the whole decode pass.
pub fn dispatch(shared: &Mutex<Processor>, kind: &RequestKind, payload: Value) -> Outcome {
    log::trace!("Dispatching {} response", kind.label());

    if kind.static_path().is_none() && !payload.is_object() {
        log::warn!("Ignoring {} response that is not a JSON object", kind.label());
        return Outcome::Ignored;
    }

    match kind {
        RequestKind::Startup | RequestKind::BasicInfo => decode::<Startup>(kind, payload)
            .map(|data| processor::lock(shared).process_startup(data)),
        RequestKind::DeviceInfo(_) => decode::<DeviceInfo>(kind, payload)
            .map(|data| processor::lock(shared).process_device_info(data)),
        RequestKind::Fast => match decode::<FastPoll>(kind, payload) {
            Some(data) => {
                return match processor::lock(shared).process_fast(data) {
                    Err(Error::AccessDenied) => Outcome::AccessDenied,
                    Err(e) => {
                        log::warn!("Fast poll rejected: {}", e);
                        Outcome::Ignored
                    }
                    Ok(()) => Outcome::Processed,
                }
            }
            None => None,
        },
        RequestKind::Periodic | RequestKind::Summary => decode::<PeriodicPoll>(kind, payload)
            .map(|data| processor::lock(shared).process_periodic(data)),
        RequestKind::Historic(_) => decode::<Historic>(kind, payload)
            .map(|data| processor::lock(shared).process_historic(data)),
        RequestKind::MonthsJson => decode::<Vec<Value>>(kind, payload)
            .map(|rows| processor::lock(shared).process_months_json(&rows)),
        RequestKind::YearsJson => decode::<Vec<Value>>(kind, payload)
            .map(|rows| processor::lock(shared).process_years_json(&rows)),
    }
    .map_or(Outcome::Ignored, |()| Outcome::Processed)
}
