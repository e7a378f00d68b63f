use crate::api::Error;
use crate::metrics;
use crate::settings::Settings;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS, Transport};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Capacity of the client request queue. Publishing never waits for room.
const CLIENT_QUEUE_CAPACITY: usize = 256;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A single value published on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Str(s) => write!(f, "{}", s),
            Payload::Int(i) => write!(f, "{}", i),
            Payload::Float(x) => write!(f, "{}", x),
            Payload::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Str(s)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Int(i)
    }
}

impl From<i32> for Payload {
    fn from(i: i32) -> Self {
        Payload::Int(i64::from(i))
    }
}

impl From<usize> for Payload {
    fn from(i: usize) -> Self {
        Payload::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Payload {
    fn from(x: f64) -> Self {
        Payload::Float(x)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

/// Device values are forwarded with their JSON type; `null` publishes as the empty string.
impl From<&Value> for Payload {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Payload::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Payload::Int(i),
                None => Payload::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Payload::Str(s.clone()),
            Value::Null => Payload::Str(String::new()),
            other => Payload::Str(other.to_string()),
        }
    }
}

/// Topic-based bus. Publishing is fire-and-forget and never fails towards the caller.
pub trait Publish: Send + Sync {
    /// Publish `payload` under `topic`, relative to the configured base topic.
    fn publish(&self, topic: &str, payload: Payload);

    fn is_connected(&self) -> bool;
}

pub struct MqttPublisher {
    client: AsyncClient,
    base_topic: String,
    timestamps: bool,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Configure the client and spawn its event loop. The broker connection itself is
    /// established (and re-established) by the event loop.
    pub fn start(settings: &Settings) -> Result<Arc<MqttPublisher>, Error> {
        let base_topic = settings.mqtt_topic.trim_end_matches('/').to_string();
        let mut options = MqttOptions::new(
            settings.mqtt_clientid.to_owned(),
            settings.mqtt_host.to_owned(),
            settings.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(settings.mqtt_keepalive));
        options.set_last_will(LastWill::new(
            format!("{}/info/connection", base_topic),
            "false",
            QoS::AtLeastOnce,
            true,
        ));

        if let (Some(user), Some(password)) = (&settings.mqtt_user, &settings.mqtt_password) {
            options.set_credentials(user.to_owned(), password.to_owned());
        }

        if settings.mqtt_tls {
            let ca_path = settings.mqtt_ca_path.as_deref().ok_or_else(|| {
                Error::ValidationFailure("mqtt_tls requires mqtt_ca_path".to_string())
            })?;
            let ca = std::fs::read(ca_path)
                .map_err(|e| Error::Mqtt(format!("Unable to read CA file {}: {}", ca_path, e)))?;
            options.set_transport(Transport::tls(ca, None, None));
        }

        let (client, eventloop) = AsyncClient::new(options, CLIENT_QUEUE_CAPACITY);
        let publisher = Arc::new(MqttPublisher {
            client,
            base_topic,
            timestamps: settings.timestamp,
            connected: Arc::new(AtomicBool::new(false)),
        });

        tokio::spawn(drive(publisher.clone(), eventloop));
        Ok(publisher)
    }

    fn send(&self, topic: String, payload: String, retain: bool) {
        log::debug!("Publishing to MQTT - Topic: {}, Value: {}", topic, payload);
        match self.client.try_publish(topic, QoS::AtMostOnce, retain, payload) {
            Ok(()) => metrics::PUBLISHED_MESSAGES.inc(),
            Err(e) => log::warn!("MQTT publish error: {}", e),
        }
    }
}

impl Publish for MqttPublisher {
    fn publish(&self, topic: &str, payload: Payload) {
        let full_topic = format!("{}/{}", self.base_topic, topic);

        if self.timestamps {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            self.send(format!("{}/timestamp", full_topic), now.to_string(), true);
        }
        self.send(full_topic, payload.to_string(), false);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Poll the connection for the lifetime of the process; rumqttc reconnects on the next poll
/// after an error.
async fn drive(publisher: Arc<MqttPublisher>, mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                log::info!("Connected to MQTT broker: {:?}", ack.code);
                publisher.connected.store(true, Ordering::SeqCst);
                publisher.publish("info/connection", Payload::Bool(true));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                log::info!("Disconnected from MQTT broker");
                publisher.connected.store(false, Ordering::SeqCst);
            }
            Ok(event) => log::trace!("MQTT event: {:?}", event),
            Err(e) => {
                if publisher.connected.swap(false, Ordering::SeqCst) {
                    log::warn!("MQTT connection lost: {}", e);
                } else {
                    log::debug!("MQTT connection attempt failed: {}", e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
