//! The dashboard controller.
//!
//! Owns the broker session and the display, reacts to session callbacks and
//! turns user actions into device-scoped publishes. Reconnects are not run
//! here: a failed or lost session leaves a pending retry that the event loop
//! picks up with [`Dashboard::take_scheduled_retry`].

use crate::config::{ConfigError, ConnectionParams};
use crate::display::StatusView;
use crate::homie::{self, DeviceDirectory, SharedDevices};
use crate::models::{Direction, Message, UserAction};
use crate::session::{Session, SessionError, SessionEvents};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed delay before a failed or lost session is replaced.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

pub struct Dashboard<S, D> {
    params: ConnectionParams,
    session: S,
    display: D,
    devices: SharedDevices,
    scheduled_retry: Option<Duration>,
}

impl<S: Session, D: StatusView> Dashboard<S, D> {
    /// Read the connection parameters from the dashboard URL. When the broker
    /// address is missing the error is shown on the display and no session is
    /// ever opened.
    pub fn initialize(url: &str, session: S, mut display: D) -> Result<Self, ConfigError> {
        match ConnectionParams::from_url(url) {
            Ok(params) => Ok(Self {
                params,
                session,
                display,
                devices: DeviceDirectory::shared(),
                scheduled_retry: None,
            }),
            Err(e) => {
                display.set_state(&e.to_string());
                Err(e)
            }
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn devices(&self) -> SharedDevices {
        self.devices.clone()
    }

    pub fn connect(&mut self) {
        let options = self.params.connect_options();
        info!(
            "Connecting to {}:{} (ssl: {}, auth: {})",
            options.host,
            options.port,
            options.use_ssl,
            options.user.is_some()
        );
        self.session.connect(&options);
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    pub fn take_scheduled_retry(&mut self) -> Option<Duration> {
        self.scheduled_retry.take()
    }

    pub fn perform(&mut self, action: UserAction) {
        match action {
            UserAction::SetMonitors(direction) => self.set_monitors(direction),
            UserAction::SetSeat(direction) => self.set_seat(direction),
            UserAction::ToggleLed(checked) => self.toggle_led(checked),
        }
    }

    pub fn set_monitors(&mut self, direction: Direction) {
        self.send_device_message(homie::MONITORS_DIRECTION_SET, direction.as_str());
    }

    pub fn set_seat(&mut self, direction: Direction) {
        self.send_device_message(homie::SEAT_DIRECTION_SET, direction.as_str());
    }

    pub fn toggle_led(&mut self, checked: bool) {
        self.send_device_message(homie::LED_ON_SET, if checked { "true" } else { "false" });
    }

    fn send_device_message(&mut self, suffix: &str, payload: &str) {
        let Some(device) = self.params.device.as_deref() else {
            debug!("No device configured, dropping {} = {}", suffix, payload);
            return;
        };
        let topic = homie::device_topic(device, suffix);
        match self.session.publish(&topic, payload) {
            Ok(()) => info!("Sent: {}: {}", topic, payload),
            Err(e) => warn!("Failed to publish to '{}': {}", topic, e),
        }
    }

    fn schedule_retry(&mut self) {
        self.scheduled_retry = Some(RETRY_DELAY);
    }
}

impl<S: Session, D: StatusView> SessionEvents for Dashboard<S, D> {
    fn on_connect(&mut self) {
        let state = format!("Connected to {}:{}", self.params.host, self.params.port);
        self.display.set_state(&state);
        for filter in self.params.subscriptions() {
            if let Err(e) = self.session.subscribe(filter) {
                warn!("Failed to subscribe to '{}': {}", filter, e);
            }
        }
    }

    fn on_connection_lost(&mut self, error: SessionError) {
        if error.is_clean() {
            return;
        }
        let state = format!("Connection lost({}): {}", error.code, error.message);
        self.display.set_state(&state);
        self.schedule_retry();
    }

    fn on_message_arrived(&mut self, message: Message) {
        homie::record_shared(&self.devices, &message);
        self.display.append_message(&message);
    }

    fn on_failure(&mut self, error: SessionError) {
        let state = format!("Connection failure({}): {}", error.code, error.message);
        self.display.set_state(&state);
        self.schedule_retry();
    }
}
