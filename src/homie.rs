//! Homie topic layout: `homie/<device>/<node>/<property>`.

use crate::models::Message;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

pub const ROOT: &str = "homie";
pub const WILDCARD_FILTER: &str = "#";
pub const DEFAULT_FILTERS: [&str; 4] = [
    "homie/+/$localip",
    "homie/+/+/on",
    "homie/+/+/pwm",
    "homie/+/+/freq",
];

pub const MONITORS_DIRECTION_SET: &str = "monitors/direction/set";
pub const SEAT_DIRECTION_SET: &str = "seat/direction/set";
pub const LED_ON_SET: &str = "led/on/set";

const LOCAL_IP: &str = "$localip";

pub fn device_topic(device: &str, suffix: &str) -> String {
    format!("{}/{}/{}", ROOT, device, suffix)
}

/// A topic split into its device id and the remaining levels.
#[derive(Debug, PartialEq, Eq)]
pub struct HomieTopic<'a> {
    pub device: &'a str,
    pub path: Vec<&'a str>,
}

impl<'a> HomieTopic<'a> {
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut levels = topic.split('/');
        if levels.next() != Some(ROOT) {
            return None;
        }
        let device = levels.next().filter(|d| !d.is_empty())?;
        let path: Vec<&str> = levels.collect();
        if path.is_empty() || path.iter().any(|level| level.is_empty()) {
            return None;
        }
        Some(Self { device, path })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub local_ip: Option<String>,
    /// Last value per `<node>/<property>`.
    pub properties: BTreeMap<String, String>,
}

/// Devices seen on the broker, keyed by device id.
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: BTreeMap<String, DeviceInfo>,
}

pub type SharedDevices = Arc<Mutex<DeviceDirectory>>;

impl DeviceDirectory {
    pub fn shared() -> SharedDevices {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Returns `false` when the topic is not a Homie device topic.
    pub fn record(&mut self, message: &Message) -> bool {
        let Some(topic) = HomieTopic::parse(&message.topic) else {
            return false;
        };
        let info = self.devices.entry(topic.device.to_string()).or_default();
        match topic.path.as_slice() {
            [LOCAL_IP] => info.local_ip = Some(message.payload.clone()),
            [attribute] if attribute.starts_with('$') => {}
            path => {
                info.properties.insert(path.join("/"), message.payload.clone());
            }
        }
        true
    }

    pub fn get(&self, device: &str) -> Option<&DeviceInfo> {
        self.devices.get(device)
    }

    pub fn snapshot(&self) -> BTreeMap<String, DeviceInfo> {
        self.devices.clone()
    }
}

pub fn record_shared(devices: &SharedDevices, message: &Message) -> bool {
    devices
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .record(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_device_topics() {
        assert_eq!(
            device_topic("chair1", MONITORS_DIRECTION_SET),
            "homie/chair1/monitors/direction/set"
        );
        assert_eq!(device_topic("chair1", SEAT_DIRECTION_SET), "homie/chair1/seat/direction/set");
        assert_eq!(device_topic("chair1", LED_ON_SET), "homie/chair1/led/on/set");
    }

    #[test]
    fn should_parse_homie_topic() {
        let topic = HomieTopic::parse("homie/chair1/led/on").unwrap();
        assert_eq!(topic.device, "chair1");
        assert_eq!(topic.path, vec!["led", "on"]);
    }

    #[test]
    fn should_reject_foreign_topics() {
        assert_eq!(HomieTopic::parse("zigbee/chair1/led/on"), None);
        assert_eq!(HomieTopic::parse("homie/chair1"), None);
        assert_eq!(HomieTopic::parse("homie//led/on"), None);
        assert_eq!(HomieTopic::parse("homie/chair1/led/"), None);
    }

    #[test]
    fn should_record_local_ip_announcement() {
        let mut directory = DeviceDirectory::default();
        assert!(directory.record(&Message::new("homie/chair1/$localip", "192.168.1.20")));
        let info = directory.get("chair1").unwrap();
        assert_eq!(info.local_ip.as_deref(), Some("192.168.1.20"));
        assert!(info.properties.is_empty());
    }

    #[test]
    fn should_keep_last_property_value() {
        let mut directory = DeviceDirectory::default();
        directory.record(&Message::new("homie/chair1/led/on", "false"));
        directory.record(&Message::new("homie/chair1/led/on", "true"));
        directory.record(&Message::new("homie/chair1/buzzer/freq", "440"));
        let info = directory.get("chair1").unwrap();
        assert_eq!(info.properties.get("led/on").map(String::as_str), Some("true"));
        assert_eq!(info.properties.get("buzzer/freq").map(String::as_str), Some("440"));
    }

    #[test]
    fn should_ignore_non_homie_messages() {
        let mut directory = DeviceDirectory::default();
        assert!(!directory.record(&Message::new("other/topic", "x")));
        assert!(directory.snapshot().is_empty());
    }
}
