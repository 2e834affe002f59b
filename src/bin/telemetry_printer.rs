use anyhow::Result;
use clap::Parser;
use rover_control::{
    configuration::AppConfig,
    logging,
    messages::SensorReading,
    session::RoverId,
    transport::{TransportConnector, ZenohConnector},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    version,
    author = "David M. Weis <dweis7@gmail.com>",
    about = "Print sensor telemetry of one rover"
)]
struct Args {
    /// rover to listen to
    #[arg(long)]
    rover: u32,

    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

fn format_distance(distance: Option<f64>) -> String {
    distance
        .map(|distance| format!("{:.1} cm", distance))
        .unwrap_or_else(|| String::from("--"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity);

    let app_config = AppConfig::load_config(&args.config)?;
    let connector = ZenohConnector::new(app_config.zenoh.clone(), app_config.topic_scheme());
    let transport = connector.connect().await?;

    let mut telemetry = transport.subscribe_telemetry(RoverId::new(args.rover)).await?;
    while let Some(sample) = telemetry.recv().await {
        match serde_json::from_str::<SensorReading>(&sample.payload) {
            Ok(reading) => println!(
                "left: {} right: {}",
                format_distance(reading.left),
                format_distance(reading.right)
            ),
            Err(_) => println!("{}: {}", sample.topic, sample.payload),
        }
    }
    Ok(())
}
