//! Stateful decoding of device payloads into published values.
//!
//! One [`Processor`] owns everything learned from the device: the discovered topology, the
//! classification tables, the switch group names and the values carried between polls. Each
//! decode pass runs to completion under the processor lock and publishes as it goes.

mod classify;
mod fast;
mod historic;
mod periodic;
mod startup;
mod switch_groups;

pub use fast::is_access_denied;
pub use periodic::ratio;
pub use startup::count_devices;

use crate::model::{
    ClassificationTables, DeviceTopology, RunningMetricCache, SwitchGroupTable,
};
use crate::publisher::{Payload, Publish};
use std::sync::{Arc, Mutex, MutexGuard};

/// Date format of the device's day rows, e.g. `19.10.26`.
pub const DAY_FORMAT: &str = "%d.%m.%y";
/// Rows of a rolling day window searched for a given date.
pub const DAYS_TO_CHECK_HISTORY: usize = 31;

pub type SharedProcessor = Arc<Mutex<Processor>>;

pub struct Processor {
    publisher: Arc<dyn Publish>,
    pub topology: DeviceTopology,
    pub tables: ClassificationTables,
    pub switch_groups: SwitchGroupTable,
    pub cache: RunningMetricCache,
    /// Model number reported at startup (800/100)
    pub model: Option<i64>,
    /// Battery block (858) seen at startup
    pub battery_present: bool,
    /// Devices listed in the latest fast poll status table
    pub observed_devices: usize,
}

impl Processor {
    pub fn new(publisher: Arc<dyn Publish>) -> Processor {
        Processor {
            publisher,
            topology: DeviceTopology::default(),
            tables: ClassificationTables::default(),
            switch_groups: SwitchGroupTable::default(),
            cache: RunningMetricCache::default(),
            model: None,
            battery_present: false,
            observed_devices: 0,
        }
    }

    pub fn shared(publisher: Arc<dyn Publish>) -> SharedProcessor {
        Arc::new(Mutex::new(Processor::new(publisher)))
    }

    fn publish<P: Into<Payload>>(&self, topic: &str, payload: P) {
        self.publisher.publish(topic, payload.into());
    }

    fn battery_device_present(&self) -> bool {
        !self.topology.battery_index.is_empty()
    }
}

/// Lock the processor, recovering the state if a previous holder panicked.
pub fn lock(processor: &Mutex<Processor>) -> MutexGuard<'_, Processor> {
    match processor.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::error!("Processor lock poisoned, continuing with last state");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::publisher::test::RecordingPublisher;

    pub(crate) fn processor() -> (Processor, Arc<RecordingPublisher>) {
        let publisher = RecordingPublisher::new();
        (Processor::new(publisher.clone()), publisher)
    }
}
