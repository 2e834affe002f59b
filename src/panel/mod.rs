mod protocol;

pub use protocol::*;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use nalgebra as na;
use std::{net::SocketAddr, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{interval, timeout},
};
use tracing::*;
use warp::{
    ws::{Message, WebSocket},
    Filter,
};

use crate::{
    configuration::JoystickConfig,
    control::SharedRoverControl,
    joystick::{ControlGeometry, Joystick, JoystickObserver, StickView},
    messages::MotorCommand,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_BUFFER: usize = 64;

static INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn start_panel_server(
    address: SocketAddr,
    control: SharedRoverControl,
    joystick: JoystickConfig,
) -> Result<JoinHandle<()>> {
    let routes = panel_routes(control, joystick)?;
    Ok(tokio::task::spawn(async move {
        warp::serve(routes).run(address).await;
    }))
}

pub fn panel_routes(
    control: SharedRoverControl,
    joystick: JoystickConfig,
) -> Result<impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone> {
    let geometry = joystick.geometry()?;

    let control_wrapper = warp::any().map(move || control.clone());

    let ws = warp::path("ws")
        .and(warp::ws())
        .and(control_wrapper.clone())
        .map(move |ws: warp::ws::Ws, control| {
            ws.on_upgrade(move |socket| handle_websocket(socket, control, geometry))
        });

    let snapshot_endpoint = warp::path("panel")
        .and(warp::path::end())
        .and(control_wrapper)
        .then(move |control: SharedRoverControl| {
            let joystick = joystick.clone();
            async move { warp::reply::json(&panel_snapshot(&control, joystick).await) }
        });

    let index = warp::path::end().map(|| warp::reply::html(INDEX_HTML));

    Ok(index.or(ws).or(snapshot_endpoint))
}

pub async fn panel_snapshot(control: &SharedRoverControl, joystick: JoystickConfig) -> PanelSnapshot {
    let session = control.session().await;
    PanelSnapshot {
        joystick,
        rovers: control.rovers().to_vec(),
        connected: session.is_connected(),
        selected_rover: session.selected_rover(),
        motors: session.motors(),
        console: control.console_entries().await,
    }
}

/// Collects joystick output during a synchronous transition.
#[derive(Debug, Default)]
struct PendingOutput {
    stick: Option<StickView>,
    commands: Vec<MotorCommand>,
}

impl JoystickObserver for PendingOutput {
    fn redraw(&mut self, stick: StickView) {
        self.stick = Some(stick);
    }

    fn motor_command(&mut self, command: MotorCommand) {
        self.commands.push(command);
    }
}

impl PendingOutput {
    async fn flush(self, control: &SharedRoverControl, outbound: &mpsc::Sender<Message>) {
        if let Some(stick) = self.stick {
            control.set_joystick_active(stick.dragging).await;
            send_event(outbound, &stick.into()).await;
        }
        for command in self.commands {
            control.apply_motor_command(command).await;
        }
    }
}

fn encode_event(event: &PanelEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::text(text)),
        Err(err) => {
            error!("Failed to serialize panel event {:?}: {}", event, err);
            None
        }
    }
}

async fn send_event(outbound: &mpsc::Sender<Message>, event: &PanelEvent) {
    if let Some(message) = encode_event(event) {
        if outbound.send(message).await.is_err() {
            trace!("Panel client already gone");
        }
    }
}

async fn send_initial_state(
    outbound: &mpsc::Sender<Message>,
    control: &SharedRoverControl,
    joystick: &Joystick,
) {
    let session = control.session().await;
    send_event(
        outbound,
        &PanelEvent::Connection {
            connected: session.is_connected(),
        },
    )
    .await;
    if let Some(rover) = session.selected_rover() {
        send_event(outbound, &PanelEvent::RoverSelected { rover }).await;
    }
    send_event(outbound, &PanelEvent::Motors(session.motors())).await;
    send_event(outbound, &joystick.view().into()).await;
}

async fn handle_websocket(ws: WebSocket, control: SharedRoverControl, geometry: ControlGeometry) {
    debug!("new panel connection");
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let mut events = control.subscribe_events();

    let writer = tokio::task::spawn(async move {
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        loop {
            let message = tokio::select! {
                message = outbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                event = events.recv() => match event {
                    Ok(event) => match encode_event(&event) {
                        Some(message) => message,
                        None => continue,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Panel client lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = heartbeat.tick() => Message::ping(""),
            };
            if ws_tx.send(message).await.is_err() {
                error!("Failed to send to panel client");
                break;
            }
        }
    });

    let mut joystick = Joystick::new(geometry);
    send_initial_state(&outbound_tx, &control, &joystick).await;

    while let Ok(Some(result)) = timeout(CLIENT_TIMEOUT, ws_rx.next()).await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    match serde_json::from_str(text) {
                        Ok(request) => {
                            handle_request(request, &mut joystick, &control, &outbound_tx).await
                        }
                        Err(err) => error!("Failed to parse json {} {}", text, err),
                    }
                } else if msg.is_pong() {
                    trace!("Pong received");
                } else if msg.is_close() {
                    trace!("Got closing message. Closing connection");
                } else {
                    error!("Unknown message type {:?}", msg);
                }
            }
            Err(e) => {
                error!("websocket error: {}", e);
                break;
            }
        }
    }

    release_joystick(&mut joystick, &control, &outbound_tx).await;
    drop(outbound_tx);
    writer.abort();
    debug!("Panel connection ended");
}

/// A vanished operator must not leave the rover driving.
async fn release_joystick(
    joystick: &mut Joystick,
    control: &SharedRoverControl,
    outbound: &mpsc::Sender<Message>,
) {
    if joystick.is_dragging() {
        warn!("Panel connection lost mid drag, stopping rover");
        let mut output = PendingOutput::default();
        joystick.end(&mut output);
        output.flush(control, outbound).await;
    }
}

async fn handle_request(
    request: PanelRequest,
    joystick: &mut Joystick,
    control: &SharedRoverControl,
    outbound: &mpsc::Sender<Message>,
) {
    let mut output = PendingOutput::default();
    match request {
        PanelRequest::Begin { x, y } => {
            joystick.begin(na::Point2::new(x, y), &mut output);
        }
        PanelRequest::Move { x, y } => joystick.move_to(na::Point2::new(x, y), &mut output),
        PanelRequest::End => joystick.end(&mut output),
        PanelRequest::SelectRover { rover } => {
            if let Err(err) = control.select_rover(rover).await {
                warn!("Rejected rover selection: {}", err);
            }
        }
        PanelRequest::Connect => control.connect().await,
        PanelRequest::Disconnect => control.disconnect().await,
    }
    output.flush(control, outbound).await;
}
