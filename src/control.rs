//! Operator session: connection, rover selection, motor command routing and
//! telemetry handling. Everything the operator should see goes to the console
//! and out as [`PanelEvent`]s.

use std::sync::{Arc, Weak};

use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::*;

use crate::{
    configuration::AppConfig,
    console::{Console, ConsoleEntry, ConsoleLevel},
    error::RoverError,
    messages::{MotorCommand, SensorReading},
    panel::PanelEvent,
    session::{RoverId, SessionContext, TopicScheme},
    transport::{RoverTransport, TelemetrySample, TransportConnector},
};

const EVENT_BUFFER: usize = 256;

pub type SharedRoverControl = Arc<RoverControl>;

pub struct RoverControl {
    connector: Box<dyn TransportConnector>,
    transport: Mutex<Option<Arc<dyn RoverTransport>>>,
    session: Mutex<SessionContext>,
    console: Mutex<Console>,
    telemetry_task: Mutex<Option<JoinHandle<()>>>,
    connection_lock: Mutex<()>,
    rovers: Vec<RoverId>,
    topics: TopicScheme,
    events: broadcast::Sender<PanelEvent>,
}

impl RoverControl {
    pub fn new(config: &AppConfig, connector: Box<dyn TransportConnector>) -> SharedRoverControl {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Arc::new(Self {
            connector,
            transport: Mutex::new(None),
            session: Mutex::new(SessionContext::default()),
            console: Mutex::new(Console::new(config.console.capacity)),
            telemetry_task: Mutex::new(None),
            connection_lock: Mutex::new(()),
            rovers: config.rover_ids(),
            topics: config.topic_scheme(),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub fn rovers(&self) -> &[RoverId] {
        &self.rovers
    }

    pub async fn session(&self) -> SessionContext {
        self.session.lock().await.clone()
    }

    pub async fn console_entries(&self) -> Vec<ConsoleEntry> {
        self.console.lock().await.entries()
    }

    pub async fn log(&self, level: ConsoleLevel, message: impl Into<String>) {
        let entry = self.console.lock().await.push(level, message);
        self.broadcast(PanelEvent::Console(entry));
    }

    fn broadcast(&self, event: PanelEvent) {
        // no open panels is fine
        let _ = self.events.send(event);
    }

    pub async fn connect(self: &Arc<Self>) {
        let _guard = self.connection_lock.lock().await;
        if self.session.lock().await.is_connected() {
            debug!("Already connected");
            return;
        }

        self.log(
            ConsoleLevel::Info,
            format!("Connecting to {}...", self.connector.describe()),
        )
        .await;

        match self.connector.connect().await {
            Ok(transport) => {
                *self.transport.lock().await = Some(transport.clone());
                let selected_rover = {
                    let mut session = self.session.lock().await;
                    session.set_connected(true);
                    session.selected_rover()
                };
                self.broadcast(PanelEvent::Connection { connected: true });
                self.log(ConsoleLevel::Info, "Connected to broker").await;
                if let Some(rover) = selected_rover {
                    self.subscribe_to_rover(transport, rover).await;
                }
            }
            Err(err) => {
                self.log(ConsoleLevel::Error, format!("Connection failed: {}", err))
                    .await;
            }
        }
    }

    pub async fn disconnect(&self) {
        let _guard = self.connection_lock.lock().await;
        let Some(transport) = self.transport.lock().await.take() else {
            debug!("Disconnect requested while not connected");
            return;
        };
        if let Some(task) = self.telemetry_task.lock().await.take() {
            task.abort();
        }
        drop(transport);
        self.session.lock().await.set_connected(false);
        self.broadcast(PanelEvent::Connection { connected: false });
        self.log(ConsoleLevel::Warning, "Disconnected from broker").await;
    }

    pub async fn select_rover(self: &Arc<Self>, id: u32) -> Result<RoverId, RoverError> {
        let rover = RoverId::new(id);
        if !self.rovers.contains(&rover) {
            self.log(ConsoleLevel::Error, format!("Unknown rover {}", id))
                .await;
            return Err(RoverError::UnknownRover(id));
        }

        // serialized with connect/disconnect so a subscription never outlives the transport
        let _guard = self.connection_lock.lock().await;
        self.session.lock().await.select_rover(rover);
        self.broadcast(PanelEvent::RoverSelected { rover });
        self.log(ConsoleLevel::Info, format!("Selected Rover {}", rover))
            .await;

        let transport = self.transport.lock().await.clone();
        if let Some(transport) = transport {
            self.subscribe_to_rover(transport, rover).await;
        }
        Ok(rover)
    }

    async fn subscribe_to_rover(self: &Arc<Self>, transport: Arc<dyn RoverTransport>, rover: RoverId) {
        let topic = self.topics.sensor_topic(rover);
        match transport.subscribe_telemetry(rover).await {
            Ok(mut receiver) => {
                let control: Weak<Self> = Arc::downgrade(self);
                let task = tokio::spawn(async move {
                    while let Some(sample) = receiver.recv().await {
                        let Some(control) = control.upgrade() else {
                            break;
                        };
                        control.handle_telemetry(sample).await;
                    }
                });
                if let Some(previous) = self.telemetry_task.lock().await.replace(task) {
                    previous.abort();
                }
                self.log(ConsoleLevel::Info, format!("Subscribed to {}", topic))
                    .await;
            }
            Err(err) => {
                error!("Subscribing to {} failed with {:?}", topic, err);
                self.log(ConsoleLevel::Error, format!("Failed to subscribe to {}", topic))
                    .await;
            }
        }
    }

    pub async fn set_joystick_active(&self, active: bool) {
        self.session.lock().await.set_joystick_active(active);
    }

    /// Records the command for the readout and sends it to the selected rover
    /// when connected. Publish failures are only logged.
    pub async fn apply_motor_command(&self, command: MotorCommand) {
        let target = {
            let mut session = self.session.lock().await;
            session.record_motor_command(command);
            session.publish_target()
        };
        self.broadcast(PanelEvent::Motors(command));

        let Some(rover) = target else {
            trace!(?command, "No rover to send motor command to");
            return;
        };
        let transport = self.transport.lock().await.clone();
        if let Some(transport) = transport {
            if let Err(err) = transport.publish_motor_command(rover, command).await {
                error!("Motor command publish failed with {:?}", err);
                self.log(
                    ConsoleLevel::Error,
                    format!("Failed to publish to {}", self.topics.motor_topic(rover)),
                )
                .await;
            }
        }
    }

    pub async fn handle_telemetry(&self, sample: TelemetrySample) {
        let data: serde_json::Value = match serde_json::from_str(&sample.payload) {
            Ok(data) => data,
            Err(err) => {
                self.log(
                    ConsoleLevel::Error,
                    format!("Failed to parse message: {}", err),
                )
                .await;
                return;
            }
        };
        self.log(
            ConsoleLevel::Info,
            format!("Received from {}: {}", sample.topic, sample.payload),
        )
        .await;

        if TopicScheme::is_sensor_topic(&sample.topic) {
            match serde_json::from_value::<SensorReading>(data) {
                Ok(reading) => self.broadcast(reading.into()),
                Err(err) => warn!("Unexpected sensor payload on {}: {}", sample.topic, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockTransport {
        published: StdMutex<Vec<(RoverId, MotorCommand)>>,
        subscriptions: StdMutex<Vec<RoverId>>,
        telemetry: StdMutex<Option<mpsc::Sender<TelemetrySample>>>,
        fail_publish: bool,
        yield_on_subscribe: bool,
    }

    impl MockTransport {
        fn published(&self) -> Vec<(RoverId, MotorCommand)> {
            self.published.lock().unwrap().clone()
        }

        fn telemetry_sender(&self) -> mpsc::Sender<TelemetrySample> {
            self.telemetry.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl RoverTransport for MockTransport {
        async fn publish_motor_command(&self, rover: RoverId, command: MotorCommand) -> Result<()> {
            if self.fail_publish {
                return Err(anyhow!("broker unreachable"));
            }
            self.published.lock().unwrap().push((rover, command));
            Ok(())
        }

        async fn subscribe_telemetry(
            &self,
            rover: RoverId,
        ) -> Result<mpsc::Receiver<TelemetrySample>> {
            if self.yield_on_subscribe {
                tokio::task::yield_now().await;
            }
            self.subscriptions.lock().unwrap().push(rover);
            let (tx, rx) = mpsc::channel(8);
            *self.telemetry.lock().unwrap() = Some(tx);
            Ok(rx)
        }
    }

    struct MockConnector {
        transport: Option<Arc<MockTransport>>,
    }

    #[async_trait]
    impl TransportConnector for MockConnector {
        fn describe(&self) -> String {
            String::from("mock broker")
        }

        async fn connect(&self) -> Result<Arc<dyn RoverTransport>> {
            match &self.transport {
                Some(transport) => Ok(transport.clone()),
                None => Err(anyhow!("connection refused")),
            }
        }
    }

    fn control_with(transport: Option<Arc<MockTransport>>) -> SharedRoverControl {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str("{}", config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        RoverControl::new(&config, Box::new(MockConnector { transport }))
    }

    async fn messages(control: &RoverControl) -> Vec<String> {
        control
            .console_entries()
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    #[tokio::test]
    async fn connect_logs_and_marks_connected() {
        let control = control_with(Some(Arc::new(MockTransport::default())));
        let mut events = control.subscribe_events();
        control.connect().await;

        assert!(control.session().await.is_connected());
        assert_eq!(
            messages(&control).await,
            vec!["Connecting to mock broker...", "Connected to broker"]
        );
        let mut saw_connection = false;
        while let Ok(event) = events.try_recv() {
            if event == (PanelEvent::Connection { connected: true }) {
                saw_connection = true;
            }
        }
        assert!(saw_connection);
    }

    #[tokio::test]
    async fn failed_connect_stays_disconnected() {
        let control = control_with(None);
        control.connect().await;
        assert!(!control.session().await.is_connected());
        let entries = control.console_entries().await;
        let last = entries.last().unwrap();
        assert_eq!(last.level, ConsoleLevel::Error);
        assert_eq!(last.message, "Connection failed: connection refused");
    }

    #[tokio::test]
    async fn commands_are_published_to_selected_rover() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.connect().await;
        control.select_rover(2).await.unwrap();
        control.apply_motor_command(MotorCommand::new(128, 128)).await;

        assert_eq!(
            transport.published(),
            vec![(RoverId::new(2), MotorCommand::new(128, 128))]
        );
        assert_eq!(control.session().await.motors(), MotorCommand::new(128, 128));
        assert_eq!(*transport.subscriptions.lock().unwrap(), vec![RoverId::new(2)]);
    }

    #[tokio::test]
    async fn commands_without_rover_are_only_recorded() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.connect().await;
        control.apply_motor_command(MotorCommand::new(50, 60)).await;

        assert!(transport.published().is_empty());
        assert_eq!(control.session().await.motors(), MotorCommand::new(50, 60));
    }

    #[tokio::test]
    async fn commands_while_disconnected_are_not_sent() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.select_rover(1).await.unwrap();
        control.apply_motor_command(MotorCommand::new(50, 60)).await;
        assert!(transport.published().is_empty());
        assert!(transport.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn selection_before_connect_subscribes_on_connect() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.select_rover(4).await.unwrap();
        control.connect().await;
        assert_eq!(*transport.subscriptions.lock().unwrap(), vec![RoverId::new(4)]);
        assert!(messages(&control)
            .await
            .contains(&String::from("Subscribed to mae211L/rover4/sensors")));
    }

    #[tokio::test]
    async fn unknown_rover_is_rejected() {
        let control = control_with(None);
        assert!(matches!(
            control.select_rover(42).await,
            Err(RoverError::UnknownRover(42))
        ));
        assert_eq!(control.session().await.selected_rover(), None);
    }

    #[tokio::test]
    async fn publish_failure_is_logged() {
        let transport = Arc::new(MockTransport {
            fail_publish: true,
            ..Default::default()
        });
        let control = control_with(Some(transport));
        control.connect().await;
        control.select_rover(1).await.unwrap();
        control.apply_motor_command(MotorCommand::stop()).await;

        let entries = control.console_entries().await;
        let last = entries.last().unwrap();
        assert_eq!(last.level, ConsoleLevel::Error);
        assert_eq!(last.message, "Failed to publish to mae211L/rover1/motors");
        assert_eq!(control.session().await.motors(), MotorCommand::stop());
    }

    #[tokio::test]
    async fn disconnect_stops_publishing() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.connect().await;
        control.select_rover(1).await.unwrap();
        control.disconnect().await;
        control.apply_motor_command(MotorCommand::new(10, 10)).await;

        assert!(!control.session().await.is_connected());
        assert!(transport.published().is_empty());
        assert_eq!(
            messages(&control).await.last().unwrap(),
            "Disconnected from broker"
        );
    }

    #[tokio::test]
    async fn disconnect_during_selection_leaves_no_telemetry_task() {
        let transport = Arc::new(MockTransport {
            yield_on_subscribe: true,
            ..Default::default()
        });
        let control = control_with(Some(transport.clone()));
        control.connect().await;

        let (selected, ()) = tokio::join!(control.select_rover(5), control.disconnect());
        assert_eq!(selected.unwrap(), RoverId::new(5));
        assert!(!control.session().await.is_connected());
        assert!(control.telemetry_task.lock().await.is_none());
        assert_eq!(*transport.subscriptions.lock().unwrap(), vec![RoverId::new(5)]);
    }

    #[tokio::test]
    async fn sensor_telemetry_is_broadcast() {
        let control = control_with(None);
        let mut events = control.subscribe_events();
        control
            .handle_telemetry(TelemetrySample {
                topic: String::from("mae211L/rover1/sensors"),
                payload: String::from(r#"{"l": 30, "r": 80}"#),
            })
            .await;

        let mut sensors = None;
        while let Ok(event) = events.try_recv() {
            if let PanelEvent::Sensors { .. } = event {
                sensors = Some(event);
            }
        }
        assert_eq!(
            sensors,
            Some(PanelEvent::Sensors {
                left: Some(30.0),
                right: Some(80.0),
                left_percent: Some(30.0),
                right_percent: Some(80.0),
            })
        );
        assert_eq!(
            messages(&control).await,
            vec![r#"Received from mae211L/rover1/sensors: {"l": 30, "r": 80}"#]
        );
    }

    #[tokio::test]
    async fn malformed_telemetry_is_logged() {
        let control = control_with(None);
        control
            .handle_telemetry(TelemetrySample {
                topic: String::from("mae211L/rover1/sensors"),
                payload: String::from("not json"),
            })
            .await;
        let entries = control.console_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, ConsoleLevel::Error);
        assert!(entries[0].message.starts_with("Failed to parse message:"));
    }

    #[tokio::test]
    async fn subscribed_telemetry_reaches_console() {
        let transport = Arc::new(MockTransport::default());
        let control = control_with(Some(transport.clone()));
        control.connect().await;
        control.select_rover(3).await.unwrap();

        transport
            .telemetry_sender()
            .send(TelemetrySample {
                topic: String::from("mae211L/rover3/sensors"),
                payload: String::from(r#"{"l": 12}"#),
            })
            .await
            .unwrap();

        let expected = String::from(r#"Received from mae211L/rover3/sensors: {"l": 12}"#);
        for _ in 0..100 {
            if messages(&control).await.contains(&expected) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("telemetry never reached the console");
    }
}
