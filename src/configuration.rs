use config::Config;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf};
use tracing::*;

use crate::{
    console::DEFAULT_CONSOLE_CAPACITY,
    error::{ErrorWrapper, RoverError},
    joystick::ControlGeometry,
    session::{RoverId, TopicScheme},
};

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub zenoh: RoverZenohConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default = "default_rovers")]
    pub rovers: Vec<u32>,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
}

impl AppConfig {
    pub fn load_config(config: &Option<PathBuf>) -> anyhow::Result<Self> {
        let settings = if let Some(config) = config {
            info!("Using configuration from {:?}", config);
            Config::builder()
                .add_source(config::File::with_name(
                    config
                        .to_str()
                        .ok_or_else(|| anyhow::anyhow!("Failed to convert path"))?,
                ))
                .add_source(config::Environment::with_prefix("APP").separator("__"))
                .build()?
        } else {
            info!("Using dev configuration");
            Config::builder()
                .add_source(config::File::with_name("config/settings"))
                .add_source(config::File::with_name("config/dev_settings").required(false))
                .add_source(config::Environment::with_prefix("APP").separator("__"))
                .build()?
        };

        Ok(settings.try_deserialize()?)
    }

    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme::new(self.topics.prefix.clone())
    }

    pub fn rover_ids(&self) -> Vec<RoverId> {
        self.rovers.iter().copied().map(RoverId::new).collect()
    }
}

fn default_rovers() -> Vec<u32> {
    (1..=6).collect()
}

fn default_auto_connect() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RoverZenohConfig {
    #[serde(default)]
    pub connect: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub listen: Vec<zenoh_config::EndPoint>,
    #[serde(default)]
    pub config_path: Option<String>,
}

impl RoverZenohConfig {
    pub fn get_zenoh_config(&self) -> anyhow::Result<zenoh::config::Config> {
        let mut config = if let Some(conf_file) = &self.config_path {
            zenoh::config::Config::from_file(conf_file).map_err(ErrorWrapper::ZenohError)?
        } else {
            zenoh::config::Config::default()
        };
        if !self.connect.is_empty() {
            config.connect.endpoints.clone_from(&self.connect);
        }
        if !self.listen.is_empty() {
            config.listen.endpoints.clone_from(&self.listen);
        }
        Ok(config)
    }

    /// Human readable target for console messages.
    pub fn describe(&self) -> String {
        if self.connect.is_empty() {
            String::from("zenoh network (scouting)")
        } else {
            self.connect
                .iter()
                .map(|endpoint| endpoint.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TopicConfig {
    #[serde(default = "default_topic_prefix")]
    pub prefix: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            prefix: default_topic_prefix(),
        }
    }
}

fn default_topic_prefix() -> String {
    String::from("mae211L")
}

/// Size of the joystick canvas and its circles, in canvas pixels.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct JoystickConfig {
    #[serde(default = "default_canvas_size")]
    pub width: f32,
    #[serde(default = "default_canvas_size")]
    pub height: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default = "default_stick_radius")]
    pub stick_radius: f32,
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            width: default_canvas_size(),
            height: default_canvas_size(),
            radius: default_radius(),
            stick_radius: default_stick_radius(),
        }
    }
}

impl JoystickConfig {
    pub fn geometry(&self) -> Result<ControlGeometry, RoverError> {
        ControlGeometry::new(
            na::Point2::new(self.width / 2.0, self.height / 2.0),
            self.radius,
            self.stick_radius,
        )
    }
}

fn default_canvas_size() -> f32 {
    300.0
}

fn default_radius() -> f32 {
    120.0
}

fn default_stick_radius() -> f32 {
    40.0
}

#[derive(Deserialize, Debug, Clone)]
pub struct PanelConfig {
    #[serde(default = "default_panel_address")]
    pub address: SocketAddr,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            address: default_panel_address(),
        }
    }
}

fn default_panel_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_capacity")]
    pub capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            capacity: default_console_capacity(),
        }
    }
}

fn default_console_capacity() -> usize {
    DEFAULT_CONSOLE_CAPACITY
}
