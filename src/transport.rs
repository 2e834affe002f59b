use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::*;
use zenoh::{prelude::r#async::*, Session, SessionDeclarations};

use crate::{
    configuration::RoverZenohConfig,
    error::ErrorWrapper,
    messages::MotorCommand,
    session::{RoverId, TopicScheme},
};

const TELEMETRY_BUFFER: usize = 32;

/// Raw message received from a rover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySample {
    pub topic: String,
    pub payload: String,
}

/// An open link to the rovers.
#[async_trait]
pub trait RoverTransport: Send + Sync {
    async fn publish_motor_command(&self, rover: RoverId, command: MotorCommand) -> Result<()>;

    /// Samples arrive on the returned channel until it is dropped.
    async fn subscribe_telemetry(&self, rover: RoverId) -> Result<mpsc::Receiver<TelemetrySample>>;
}

#[async_trait]
pub trait TransportConnector: Send + Sync {
    fn describe(&self) -> String;

    async fn connect(&self) -> Result<Arc<dyn RoverTransport>>;
}

pub struct ZenohConnector {
    config: RoverZenohConfig,
    topics: TopicScheme,
}

impl ZenohConnector {
    pub fn new(config: RoverZenohConfig, topics: TopicScheme) -> Self {
        Self { config, topics }
    }
}

#[async_trait]
impl TransportConnector for ZenohConnector {
    fn describe(&self) -> String {
        self.config.describe()
    }

    async fn connect(&self) -> Result<Arc<dyn RoverTransport>> {
        let zenoh_config = self.config.get_zenoh_config()?;
        let zenoh_session = zenoh::open(zenoh_config)
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?
            .into_arc();
        info!("Opened zenoh session {}", zenoh_session.zid());
        Ok(Arc::new(ZenohTransport::new(
            zenoh_session,
            self.topics.clone(),
        )))
    }
}

/// Dropping the transport closes the zenoh session.
pub struct ZenohTransport {
    zenoh_session: Arc<Session>,
    topics: TopicScheme,
}

impl ZenohTransport {
    pub fn new(zenoh_session: Arc<Session>, topics: TopicScheme) -> Self {
        Self {
            zenoh_session,
            topics,
        }
    }
}

#[async_trait]
impl RoverTransport for ZenohTransport {
    async fn publish_motor_command(&self, rover: RoverId, command: MotorCommand) -> Result<()> {
        let topic = self.topics.motor_topic(rover);
        let payload = command.to_json()?;
        trace!(%topic, %payload, "Publishing motor command");
        self.zenoh_session
            .put(topic.as_str(), payload)
            .res_async()
            .await
            .map_err(ErrorWrapper::ZenohError)?;
        Ok(())
    }

    async fn subscribe_telemetry(&self, rover: RoverId) -> Result<mpsc::Receiver<TelemetrySample>> {
        let topic = self.topics.sensor_topic(rover);
        let subscriber = self
            .zenoh_session
            .declare_subscriber(topic.as_str())
            .res()
            .await
            .map_err(ErrorWrapper::ZenohError)?;

        let (tx, rx) = mpsc::channel(TELEMETRY_BUFFER);
        tokio::spawn(async move {
            loop {
                // the subscriber holds the session, so leave as soon as nobody listens
                let sample = tokio::select! {
                    sample = subscriber.recv_async() => sample,
                    _ = tx.closed() => {
                        debug!("Telemetry receiver dropped");
                        break;
                    }
                };
                let Ok(sample) = sample else {
                    break;
                };
                let topic = sample.key_expr.to_string();
                let payload: String = match sample.value.try_into() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!("Dropping non text sample on {}: {:?}", topic, err);
                        continue;
                    }
                };
                if tx.send(TelemetrySample { topic, payload }).await.is_err() {
                    debug!("Telemetry receiver dropped");
                    break;
                }
            }
        });
        Ok(rx)
    }
}
