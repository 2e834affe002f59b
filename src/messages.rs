use crate::joystick::MAX_MOTOR_VALUE;
use serde::{Deserialize, Serialize};

/// Differential drive command as sent to the rover.
///
/// Serialized as `{"l": left, "r": right}`.
#[derive(Debug, Serialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    #[serde(rename = "l")]
    left: i32,
    #[serde(rename = "r")]
    right: i32,
}

impl MotorCommand {
    pub fn new(left: i32, right: i32) -> Self {
        Self {
            left: left.clamp(-MAX_MOTOR_VALUE, MAX_MOTOR_VALUE),
            right: right.clamp(-MAX_MOTOR_VALUE, MAX_MOTOR_VALUE),
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Distance sensor telemetry in centimeters. Rovers may omit either side.
#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq)]
pub struct SensorReading {
    #[serde(rename = "l", default)]
    pub left: Option<f64>,
    #[serde(rename = "r", default)]
    pub right: Option<f64>,
}

/// Readout bars span 0 to 100 cm.
const SENSOR_BAR_RANGE_CM: f64 = 100.0;

impl SensorReading {
    pub fn left_bar_percent(&self) -> Option<f64> {
        self.left.map(bar_percent)
    }

    pub fn right_bar_percent(&self) -> Option<f64> {
        self.right.map(bar_percent)
    }
}

fn bar_percent(distance: f64) -> f64 {
    (distance / SENSOR_BAR_RANGE_CM * 100.0).clamp(0.0, 100.0)
}
