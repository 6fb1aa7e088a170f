//! Print live temperatures from a telemetry server.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example live_temperature --features tracing -- http://raspberrypi.local:8000 /raspberry1
//! ```

use futures::StreamExt as _;
use rpi_telemetry_client::Client;
use rpi_telemetry_client::endpoint::Deployment;
use rpi_telemetry_client::ws::{Config, Event};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let client = match args.next() {
        Some(base_url) => {
            Client::from_location(&base_url, Deployment::Production, Config::default())?
        }
        None => Client::default(),
    };
    let path = args.next().unwrap_or_else(|| "/raspberry1".to_owned());

    info!(url = %client.url(&path)?, "Subscribing");

    let (_subscription, stream) = client.stream(&path)?;
    let mut stream = Box::pin(stream);

    while let Some(event) = stream.next().await {
        match event {
            Event::Connected => info!(%path, "connected"),
            Event::Disconnected => warn!(%path, "disconnected, retrying"),
            Event::Data(celsius) => info!(%path, celsius),
            Event::Error(error) => warn!(%path, %error),
            _ => {}
        }
    }

    Ok(())
}
