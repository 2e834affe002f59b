//! On screen joystick used to drive a two wheeled rover.
//!
//! The joystick is a circle of radius `radius` around `center`. A drag can only
//! start on the handle, a smaller circle of radius `stick_radius` that rests at
//! the center. While dragging, the handle follows the pointer but never leaves
//! the outer circle, and every move is mapped to a tank style motor command.
//!
//! Coordinates are in the drawing surface's space, y grows downward.

use crate::{error::RoverError, messages::MotorCommand};
use nalgebra as na;

/// Largest magnitude either motor can be commanded to.
pub const MAX_MOTOR_VALUE: i32 = 255;

const COORDINATE_LIMIT: f32 = 1.0e12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlGeometry {
    center: na::Point2<f32>,
    radius: f32,
    stick_radius: f32,
}

impl ControlGeometry {
    pub fn new(
        center: na::Point2<f32>,
        radius: f32,
        stick_radius: f32,
    ) -> Result<Self, RoverError> {
        let valid = center.x.is_finite()
            && center.y.is_finite()
            && radius.is_finite()
            && stick_radius > 0.0
            && radius > stick_radius;
        if !valid {
            return Err(RoverError::InvalidGeometry {
                radius,
                stick_radius,
            });
        }
        Ok(Self {
            center,
            radius,
            stick_radius,
        })
    }

    pub fn center(&self) -> na::Point2<f32> {
        self.center
    }

    /// Offset of `pointer` from the center, pulled back onto the outer circle
    /// when it lies outside of it. The angle is preserved.
    pub fn clamp_offset(&self, pointer: na::Point2<f32>) -> na::Vector2<f32> {
        let pointer = na::Point2::new(
            sanitize_coordinate(pointer.x, self.center.x),
            sanitize_coordinate(pointer.y, self.center.y),
        );
        let offset = pointer - self.center;
        if offset.x.hypot(offset.y) > self.radius {
            let angle = offset.y.atan2(offset.x);
            na::Vector2::new(self.radius * angle.cos(), self.radius * angle.sin())
        } else {
            offset
        }
    }
}

fn sanitize_coordinate(value: f32, center: f32) -> f32 {
    if value.is_nan() {
        center
    } else {
        value.clamp(center - COORDINATE_LIMIT, center + COORDINATE_LIMIT)
    }
}

/// What the drawing surface needs to render the handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickView {
    pub position: na::Point2<f32>,
    pub dragging: bool,
}

/// Receives everything the joystick produces.
pub trait JoystickObserver {
    fn redraw(&mut self, stick: StickView);
    fn motor_command(&mut self, command: MotorCommand);
}

#[derive(Debug, Clone)]
pub struct Joystick {
    geometry: ControlGeometry,
    dragging: bool,
    handle: na::Point2<f32>,
}

impl Joystick {
    pub fn new(geometry: ControlGeometry) -> Self {
        Self {
            geometry,
            dragging: false,
            handle: geometry.center,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn handle_position(&self) -> na::Point2<f32> {
        self.handle
    }

    pub fn view(&self) -> StickView {
        StickView {
            position: self.handle,
            dragging: self.dragging,
        }
    }

    /// Starts a drag if `pointer` is on the handle.
    /// Returns whether a drag is active afterwards.
    pub fn begin(
        &mut self,
        pointer: na::Point2<f32>,
        observer: &mut impl JoystickObserver,
    ) -> bool {
        let offset = pointer - self.handle;
        // NaN and infinite pointers fail this check and are ignored
        if offset.x.hypot(offset.y) <= self.geometry.stick_radius && !self.dragging {
            self.dragging = true;
            observer.redraw(self.view());
        }
        self.dragging
    }

    pub fn move_to(&mut self, pointer: na::Point2<f32>, observer: &mut impl JoystickObserver) {
        if !self.dragging {
            return;
        }
        let offset = self.geometry.clamp_offset(pointer);
        self.handle = self.geometry.center + offset;
        observer.redraw(self.view());
        observer.motor_command(motor_command_from_offset(offset, self.geometry.radius));
    }

    /// Releases the handle. Always commands a full stop, even when idle.
    pub fn end(&mut self, observer: &mut impl JoystickObserver) {
        if self.dragging {
            self.dragging = false;
            self.handle = self.geometry.center;
            observer.redraw(self.view());
        }
        observer.motor_command(MotorCommand::stop());
    }
}

/// Intermediate values of the stick to motor mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveVector {
    /// 0 at the center, 1 on the outer circle.
    pub intensity: f32,
    /// 0 is right, 90 up, 180 left, 270 down.
    pub degrees: f32,
    pub direction: i32,
    pub left_bias: f32,
    pub right_bias: f32,
}

impl DriveVector {
    pub fn from_offset(offset: na::Vector2<f32>, radius: f32) -> Self {
        let distance = offset.x.hypot(offset.y).min(radius);
        let intensity = (distance / radius).min(1.0);
        let degrees = heading_degrees(offset);
        let direction = if (0.0..=180.0).contains(&degrees) {
            1
        } else {
            -1
        };
        let (left_bias, right_bias) = turn_bias(degrees);
        Self {
            intensity,
            degrees,
            direction,
            left_bias,
            right_bias,
        }
    }

    /// Rounds half away from zero at both steps.
    pub fn motor_command(&self) -> MotorCommand {
        let base = (self.intensity * MAX_MOTOR_VALUE as f32 * self.direction as f32).round();
        let left = (base * self.left_bias).round() as i32;
        let right = (base * self.right_bias).round() as i32;
        MotorCommand::new(left, right)
    }
}

pub fn motor_command_from_offset(offset: na::Vector2<f32>, radius: f32) -> MotorCommand {
    DriveVector::from_offset(offset, radius).motor_command()
}

fn heading_degrees(offset: na::Vector2<f32>) -> f32 {
    // atan2(0, 0) is left to the platform, pin it to the idle heading
    if offset.x == 0.0 && offset.y == 0.0 {
        return 180.0;
    }
    let degrees = (-offset.y).atan2(offset.x).to_degrees();
    if degrees < 0.0 {
        degrees + 360.0
    } else {
        // folds -0.0 into 0.0
        degrees + 0.0
    }
}

fn turn_bias(degrees: f32) -> (f32, f32) {
    let (left, right) = if degrees < 90.0 {
        // forward, turning right
        (1.0, 1.0 - (90.0 - degrees) / 90.0)
    } else if degrees <= 180.0 {
        // forward, turning left
        (1.0 - (degrees - 90.0) / 90.0, 1.0)
    } else if degrees < 270.0 {
        // backward, turning left
        (1.0 - (degrees - 180.0) / 90.0, 1.0)
    } else {
        // backward, turning right
        (1.0, 1.0 - (360.0 - degrees) / 90.0)
    };
    (left.clamp(0.0, 1.0), right.clamp(0.0, 1.0))
}
