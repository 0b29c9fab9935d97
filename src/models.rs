use std::fmt;
use std::str::FromStr;

/// A (topic, payload) pair, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.topic, self.payload)
    }
}

/// What a session is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
}

impl ConnectOptions {
    /// WebSocket endpoint of the broker, served at the root path. IPv6
    /// literals are bracketed.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{}://[{}]:{}/", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/", scheme, self.host, self.port)
        }
    }
}

/// Direction accepted by the actuator nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "stop" => Ok(Direction::Stop),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Controls the user can operate from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    SetMonitors(Direction),
    SetSeat(Direction),
    /// Checkbox state of the LED control.
    ToggleLed(bool),
}
