use crate::messages::MotorCommand;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoverId(u32);

impl RoverId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Topic layout is `<prefix>/rover<id>/motors` and `<prefix>/rover<id>/sensors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
}

impl TopicScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn motor_topic(&self, rover: RoverId) -> String {
        format!("{}/rover{}/motors", self.prefix, rover)
    }

    pub fn sensor_topic(&self, rover: RoverId) -> String {
        format!("{}/rover{}/sensors", self.prefix, rover)
    }

    pub fn is_sensor_topic(topic: &str) -> bool {
        topic.contains("/sensors")
    }
}

/// State of one operator session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionContext {
    selected_rover: Option<RoverId>,
    connected: bool,
    joystick_active: bool,
    motors: MotorCommand,
}

impl SessionContext {
    pub fn selected_rover(&self) -> Option<RoverId> {
        self.selected_rover
    }

    pub fn select_rover(&mut self, rover: RoverId) {
        self.selected_rover = Some(rover);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn joystick_active(&self) -> bool {
        self.joystick_active
    }

    pub fn set_joystick_active(&mut self, active: bool) {
        self.joystick_active = active;
    }

    pub fn motors(&self) -> MotorCommand {
        self.motors
    }

    pub fn record_motor_command(&mut self, command: MotorCommand) {
        self.motors = command;
    }

    /// Rover that motor commands should go to right now, if any.
    pub fn publish_target(&self) -> Option<RoverId> {
        if self.connected {
            self.selected_rover
        } else {
            None
        }
    }
}
