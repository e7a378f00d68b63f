#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket, State};
use solarlog2mqtt::api::{self, SolarLogClient};
use solarlog2mqtt::processor::{self, Processor, SharedProcessor};
use solarlog2mqtt::publisher::{MqttPublisher, Payload, Publish};
use solarlog2mqtt::scheduler::Bridge;
use solarlog2mqtt::session::Session;
use solarlog2mqtt::settings::read_settings;
use solarlog2mqtt::shutdown::{Shutdown, StopReason};
use solarlog2mqtt::{
    metrics, EXIT_CODE_INVALID_CONFIG, EXIT_CODE_OK, EXIT_CODE_RESTART_REQUIRED, HTTP_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;

/// Time given to the MQTT event loop to deliver the final messages.
const FLUSH_DELAY: Duration = Duration::from_secs(1);

/// Structure containing state for API handlers.
pub struct StateData {
    processor: SharedProcessor,
}

#[get("/metrics")]
async fn metrics_route() -> Result<String, api::Error> {
    metrics::read()
}

#[get("/topology")]
async fn topology_route(state: &State<StateData>) -> Result<String, api::Error> {
    let current = processor::lock(&state.processor);
    serde_json::to_string_pretty(&current.topology)
        .map_err(|e| api::Error::DecodeFailure(e.to_string()))
}

fn rocket(port: u16, processor: SharedProcessor) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .manage(StateData { processor })
        .mount("/", routes![metrics_route, topology_route])
}

/// Turn SIGINT/SIGTERM into a clean stop.
async fn watch_signals(shutdown: Shutdown) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
        _ = terminate => log::info!("Received SIGTERM"),
        _ = shutdown.stopped() => return,
    }
    shutdown.trigger(StopReason::Signal);
}

async fn run() -> i32 {
    let settings = match read_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            return EXIT_CODE_INVALID_CONFIG;
        }
    };
    log::info!(
        "Bridging Solar-Log at {}:{} to MQTT broker {}:{} under '{}'",
        settings.solarlog_host,
        settings.solarlog_port,
        settings.mqtt_host,
        settings.mqtt_port,
        settings.mqtt_topic
    );

    let client =
        match SolarLogClient::new(&settings.solarlog_host, settings.solarlog_port, HTTP_TIMEOUT) {
            Ok(client) => client,
            Err(e) => {
                log::error!("Unable to set up the Solar-Log client: {}", e);
                return EXIT_CODE_INVALID_CONFIG;
            }
        };
    let publisher = match MqttPublisher::start(&settings) {
        Ok(publisher) => publisher,
        Err(e) => {
            log::error!("Unable to set up the MQTT client: {}", e);
            return EXIT_CODE_INVALID_CONFIG;
        }
    };

    let processor = Processor::shared(publisher.clone());
    let session = Arc::new(Session::new(client, settings.solarlog_credentials()));
    let shutdown = Shutdown::new();

    if settings.metrics_port > 0 {
        let server = rocket(settings.metrics_port, processor.clone());
        tokio::spawn(async move {
            if let Err(e) = server.launch().await {
                log::error!("Metrics server failed: {}", e);
            }
        });
    }
    tokio::spawn(watch_signals(shutdown.clone()));

    let restart_delay = Duration::from_secs(settings.restart_delay);
    let bridge = Bridge::new(session, processor, publisher.clone(), settings, shutdown);
    let reason = bridge.run().await;

    publisher.publish("info/connection", Payload::Bool(false));
    let code = match reason {
        StopReason::Signal => {
            log::info!("Bridge stopped");
            EXIT_CODE_OK
        }
        StopReason::Restart(why) => {
            publisher.publish("info/restart_reason", Payload::from(why.as_str()));
            log::error!("Restart required ({}), exiting in {:?}", why, restart_delay);
            tokio::time::sleep(restart_delay).await;
            EXIT_CODE_RESTART_REQUIRED
        }
    };
    tokio::time::sleep(FLUSH_DELAY).await;
    code
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = run().await;
    std::process::exit(code);
}
