use anyhow::Result;
use clap::Parser;
use rover_control::{
    configuration::AppConfig, console::ConsoleLevel, control::RoverControl, logging,
    messages::MotorCommand, panel::start_panel_server, transport::ZenohConnector,
};
use std::path::PathBuf;
use tracing::*;

#[derive(Parser, Debug)]
#[command(
    version,
    author = "David M. Weis <dweis7@gmail.com>",
    about = "Rover control panel"
)]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// rover to select on start
    #[arg(long)]
    rover: Option<u32>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let app_config = AppConfig::load_config(&args.config)?;

    let connector = ZenohConnector::new(app_config.zenoh.clone(), app_config.topic_scheme());
    let control = RoverControl::new(&app_config, Box::new(connector));
    control
        .log(ConsoleLevel::Info, "Application started")
        .await;

    if let Some(rover) = args.rover {
        control.select_rover(rover).await?;
    }
    if app_config.auto_connect {
        control.connect().await;
    }

    let address = app_config.panel.address;
    let server = start_panel_server(address, control.clone(), app_config.joystick.clone())?;
    info!("Control panel started at http://{}", address);

    tokio::signal::ctrl_c().await?;
    info!("Caught interrupt, stopping rover");

    control.apply_motor_command(MotorCommand::stop()).await;
    control.disconnect().await;
    server.abort();
    Ok(())
}
