use crate::models::{ConnectOptions, Message};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use uuid::Uuid;

/// Failure reported by a session, with a numeric code. Code 0 is a clean
/// disconnect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct SessionError {
    pub code: u32,
    pub message: String,
}

impl SessionError {
    pub const CLEAN: u32 = 0;
    pub const TIMEOUT: u32 = 1;
    pub const INTERNAL: u32 = 5;
    pub const REFUSED: u32 = 6;
    pub const SOCKET: u32 = 7;
    pub const CONNECTION: u32 = 8;

    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn clean() -> Self {
        Self::new(Self::CLEAN, "disconnected")
    }

    pub fn not_connected() -> Self {
        Self::new(Self::INTERNAL, "not connected")
    }

    pub fn is_clean(&self) -> bool {
        self.code == Self::CLEAN
    }
}

impl From<&ConnectionError> for SessionError {
    fn from(err: &ConnectionError) -> Self {
        let code = match err {
            ConnectionError::ConnectionRefused(_) => Self::REFUSED,
            ConnectionError::NetworkTimeout => Self::TIMEOUT,
            ConnectionError::Io(_) => Self::SOCKET,
            ConnectionError::MqttState(_) => Self::INTERNAL,
            _ => Self::CONNECTION,
        };
        Self::new(code, err.to_string())
    }
}

impl From<rumqttc::ClientError> for SessionError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::new(Self::INTERNAL, err.to_string())
    }
}

/// Callbacks a session delivers to its owner.
pub trait SessionEvents {
    fn on_connect(&mut self);
    fn on_connection_lost(&mut self, error: SessionError);
    fn on_message_arrived(&mut self, message: Message);
    fn on_failure(&mut self, error: SessionError);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    ConnectionLost(SessionError),
    MessageArrived(Message),
    Failed(SessionError),
}

impl SessionEvent {
    pub fn dispatch(self, handler: &mut impl SessionEvents) {
        match self {
            SessionEvent::Connected => handler.on_connect(),
            SessionEvent::ConnectionLost(error) => handler.on_connection_lost(error),
            SessionEvent::MessageArrived(message) => handler.on_message_arrived(message),
            SessionEvent::Failed(error) => handler.on_failure(error),
        }
    }
}

/// A connection to the broker. None of the calls block; outcomes of
/// `connect` arrive later as [`SessionEvent`]s.
pub trait Session {
    fn connect(&mut self, options: &ConnectOptions);
    fn subscribe(&mut self, filter: &str) -> Result<(), SessionError>;
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError>;
    fn disconnect(&mut self);
}

/// MQTT over WebSocket, backed by rumqttc.
pub struct MqttSession {
    client: Option<AsyncClient>,
    driver: Option<JoinHandle<()>>,
    events: UnboundedSender<SessionEvent>,
    client_id: String,
    keep_alive: Duration,
}

impl MqttSession {
    pub fn new(client_id_prefix: &str, keep_alive: Duration, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            client: None,
            driver: None,
            events,
            client_id: format!("{}-{}", client_id_prefix, Uuid::new_v4()),
            keep_alive,
        }
    }

    fn teardown(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.client = None;
    }
}

impl Session for MqttSession {
    fn connect(&mut self, options: &ConnectOptions) {
        self.teardown();
        debug!("Configuring MQTT broker at {}...", options.url());

        let mqtt_options = mqtt_options(&self.client_id, self.keep_alive, options);
        let (client, eventloop) = AsyncClient::new(mqtt_options, 10);
        self.client = Some(client);

        let events = self.events.clone();
        self.driver = Some(tokio::spawn(drive(eventloop, events)));
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or_else(SessionError::not_connected)?;
        client.try_subscribe(filter, QoS::AtMostOnce)?;
        info!("Subscribed to topic '{}'.", filter);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or_else(SessionError::not_connected)?;
        client.try_publish(topic, QoS::AtMostOnce, false, payload.to_string())?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.as_ref() {
            if let Err(e) = client.try_disconnect() {
                warn!("Failed to request disconnect: {}", e);
            }
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn mqtt_options(client_id: &str, keep_alive: Duration, options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(client_id, options.url(), options.port);
    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_session(true);

    if let Some(user) = &options.user {
        mqtt_options.set_credentials(user, options.password.clone().unwrap_or_default());
    }

    if options.use_ssl {
        mqtt_options.set_transport(Transport::wss_with_default_config());
    } else {
        mqtt_options.set_transport(Transport::Ws);
    }

    mqtt_options
}

/// Tracks where a single session stands so that errors can be told apart:
/// before the CONNACK they are connect failures, afterwards connection losses.
#[derive(Debug, Default)]
struct Driver {
    connected: bool,
    disconnecting: bool,
}

impl Driver {
    fn on_event(&mut self, event: Event) -> Option<SessionEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                self.connected = true;
                Some(SessionEvent::Connected)
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                Some(SessionEvent::MessageArrived(Message::new(publish.topic, payload)))
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                self.disconnecting = true;
                None
            }
            other => {
                debug!("Unhandled event: {:?}", other);
                None
            }
        }
    }

    fn on_error(&self, err: &ConnectionError) -> SessionEvent {
        if self.disconnecting {
            SessionEvent::ConnectionLost(SessionError::clean())
        } else if self.connected {
            SessionEvent::ConnectionLost(SessionError::from(err))
        } else {
            SessionEvent::Failed(SessionError::from(err))
        }
    }
}

async fn drive(mut eventloop: EventLoop, events: UnboundedSender<SessionEvent>) {
    let mut driver = Driver::default();
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                if let Some(event) = driver.on_event(event) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                if !driver.disconnecting {
                    error!("Error in MQTT event loop: {:?}", e);
                }
                let _ = events.send(driver.on_error(&e));
                // The session is over; a new one is opened on the next connect.
                break;
            }
        }
    }
}
