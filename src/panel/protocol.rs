use serde::{Deserialize, Serialize};

use crate::{
    configuration::JoystickConfig,
    console::ConsoleEntry,
    joystick::StickView,
    messages::{MotorCommand, SensorReading},
    session::RoverId,
};

/// Messages the browser sends over the websocket.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelRequest {
    Begin { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    End,
    SelectRover { rover: u32 },
    Connect,
    Disconnect,
}

/// Messages pushed to the browser.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelEvent {
    Stick {
        x: f32,
        y: f32,
        dragging: bool,
    },
    Motors(MotorCommand),
    Sensors {
        left: Option<f64>,
        right: Option<f64>,
        left_percent: Option<f64>,
        right_percent: Option<f64>,
    },
    Connection {
        connected: bool,
    },
    RoverSelected {
        rover: RoverId,
    },
    Console(ConsoleEntry),
}

impl From<StickView> for PanelEvent {
    fn from(stick: StickView) -> Self {
        PanelEvent::Stick {
            x: stick.position.x,
            y: stick.position.y,
            dragging: stick.dragging,
        }
    }
}

impl From<SensorReading> for PanelEvent {
    fn from(reading: SensorReading) -> Self {
        PanelEvent::Sensors {
            left: reading.left,
            right: reading.right,
            left_percent: reading.left_bar_percent(),
            right_percent: reading.right_bar_percent(),
        }
    }
}

/// Everything a freshly loaded page needs to render.
#[derive(Debug, Serialize, Clone)]
pub struct PanelSnapshot {
    pub joystick: JoystickConfig,
    pub rovers: Vec<RoverId>,
    pub connected: bool,
    pub selected_rover: Option<RoverId>,
    pub motors: MotorCommand,
    pub console: Vec<ConsoleEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra as na;

    #[test]
    fn parse_pointer_requests() {
        let begin: PanelRequest = serde_json::from_str(r#"{"type":"begin","x":150,"y":150.5}"#).unwrap();
        assert_eq!(begin, PanelRequest::Begin { x: 150.0, y: 150.5 });
        let end: PanelRequest = serde_json::from_str(r#"{"type":"end"}"#).unwrap();
        assert_eq!(end, PanelRequest::End);
    }

    #[test]
    fn parse_session_requests() {
        let select: PanelRequest =
            serde_json::from_str(r#"{"type":"select_rover","rover":3}"#).unwrap();
        assert_eq!(select, PanelRequest::SelectRover { rover: 3 });
        let connect: PanelRequest = serde_json::from_str(r#"{"type":"connect"}"#).unwrap();
        assert_eq!(connect, PanelRequest::Connect);
    }

    #[test]
    fn unknown_request_is_rejected() {
        assert!(serde_json::from_str::<PanelRequest>(r#"{"type":"launch"}"#).is_err());
    }

    #[test]
    fn motors_event_is_flat() {
        let json = serde_json::to_value(PanelEvent::Motors(MotorCommand::new(10, -20))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "motors", "l": 10, "r": -20}));
    }

    #[test]
    fn stick_event_from_view() {
        let event = PanelEvent::from(StickView {
            position: na::Point2::new(10.0, 20.0),
            dragging: true,
        });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "stick", "x": 10.0, "y": 20.0, "dragging": true})
        );
    }

    #[test]
    fn sensors_event_carries_bar_percent() {
        let event = PanelEvent::from(SensorReading {
            left: Some(250.0),
            right: None,
        });
        assert_eq!(
            event,
            PanelEvent::Sensors {
                left: Some(250.0),
                right: None,
                left_percent: Some(100.0),
                right_percent: None,
            }
        );
    }
}
