use crate::models::Message;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Where the dashboard shows its status line and message log.
pub trait StatusView {
    fn set_state(&mut self, text: &str);
    fn append_message(&mut self, message: &Message);
}

/// Status text plus the append-only message log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisplaySurface {
    pub state: String,
    pub messages: String,
}

impl StatusView for DisplaySurface {
    fn set_state(&mut self, text: &str) {
        self.state = text.to_string();
    }

    fn append_message(&mut self, message: &Message) {
        self.messages.push_str(&message.to_string());
        self.messages.push('\n');
    }
}

/// Display surface shared between the controller and the REST server.
/// Every change is mirrored to the log.
#[derive(Debug, Clone, Default)]
pub struct SharedDisplay(Arc<Mutex<DisplaySurface>>);

impl SharedDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn surface(&self) -> MutexGuard<'_, DisplaySurface> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DisplaySurface {
        self.surface().clone()
    }
}

impl StatusView for SharedDisplay {
    fn set_state(&mut self, text: &str) {
        info!("{}", text);
        self.surface().set_state(text);
    }

    fn append_message(&mut self, message: &Message) {
        info!("Received: {}", message);
        self.surface().append_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_append_one_line_per_message() {
        let mut surface = DisplaySurface::default();
        surface.append_message(&Message::new("homie/a/led/on", "true"));
        surface.append_message(&Message::new("homie/b/$localip", "10.0.0.2"));
        assert_eq!(surface.messages, "homie/a/led/on: true\nhomie/b/$localip: 10.0.0.2\n");
    }

    #[test]
    fn should_replace_state() {
        let mut surface = DisplaySurface::default();
        surface.set_state("first");
        surface.set_state("second");
        assert_eq!(surface.state, "second");
    }

    #[test]
    fn should_share_surface_between_clones() {
        let display = SharedDisplay::new();
        let mut writer = display.clone();
        writer.set_state("Connected to broker:9001");
        writer.append_message(&Message::new("t", "p"));
        let snapshot = display.snapshot();
        assert_eq!(snapshot.state, "Connected to broker:9001");
        assert_eq!(snapshot.messages, "t: p\n");
    }
}
