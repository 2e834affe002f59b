#![doc = include_str!("../README.md")]
pub mod configuration;
pub mod console;
pub mod control;
pub mod error;
pub mod joystick;
pub mod logging;
pub mod messages;
pub mod panel;
pub mod session;
pub mod transport;
