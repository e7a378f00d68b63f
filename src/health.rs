use crate::api::{endpoint, Transport};
use crate::publisher::Publish;
use crate::session::Session;

/// Publish bus, session and device reachability plus their conjunction. Never fails.
pub async fn check_health<T: Transport>(publisher: &dyn Publish, session: &Session<T>) -> bool {
    let mqtt_connected = publisher.is_connected();
    let solar_client_active = session.is_active();
    let device_accessible = match session.transport().probe(endpoint::ROOT).await {
        Ok(status) => status < 400,
        Err(e) => {
            log::debug!("Device probe failed: {}", e);
            false
        }
    };

    let checks = [
        ("health/mqtt_connected", mqtt_connected),
        ("health/solar_client_active", solar_client_active),
        ("health/device_accessible", device_accessible),
    ];
    for (topic, ok) in checks {
        publisher.publish(topic, ok.into());
    }

    let overall = checks.iter().all(|(_, ok)| *ok);
    publisher.publish("health/overall", overall.into());
    if overall {
        log::debug!("Health check passed");
    } else {
        log::warn!("Health check failed: {:?}", checks);
    }
    overall
}
