use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use wattsim::{BrokerConnection, Credentials};
use wattsim_common::DeviceIdentity;

mod controller;
mod listener;
mod mode;
mod publisher;
mod readings;
mod store;

use self::{
    controller::{DeviceController, Options},
    readings::Profile,
    store::ConfigStore,
};

type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("state directory error: {0}")]
    Store(#[from] std::io::Error),
    #[error("wattsim error: {0}")]
    Wattsim(#[from] wattsim::Error),
}

/// Simulated metering device speaking the prop/config/data handshake.
#[derive(Parser)]
struct Args {
    /// Device identifier
    #[arg(long, default_value = "ESP32_ENGR_LAB_001")]
    device_id: String,

    /// Faculty the device reports under
    #[arg(long, default_value = "engineering")]
    faculty: String,

    /// MQTT broker address
    #[arg(long, default_value = "127.0.0.1:1883")]
    broker: String,

    /// Broker username
    #[arg(long)]
    username: Option<String>,

    /// Broker password
    #[arg(long)]
    password: Option<String>,

    /// Directory the device persists its state into
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// Hardware profile to simulate
    #[arg(long, value_enum, default_value = "meter")]
    profile: Profile,

    /// Seconds between property announcements while unregistered
    #[arg(long, default_value_t = 30)]
    announce_interval: u64,

    /// Default seconds between telemetry emissions
    #[arg(long, default_value_t = 15)]
    data_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    wattsim::log::init();

    let args = Args::parse();

    let identity = DeviceIdentity::new(args.device_id.as_str(), args.faculty.as_str());

    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let store = Arc::new(ConfigStore::open(&args.state_dir, identity.device_id.clone())?);

    let client_id = format!("wattsim-{}", identity.device_id);
    let conn = BrokerConnection::connect(&client_id, &args.broker, credentials.as_ref()).await?;

    let controller = DeviceController::new(conn, store, identity, Options {
        profile: args.profile,
        announce_interval: args.announce_interval,
        data_interval: args.data_interval,
    });

    tokio::select! {
        res = controller.run() => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("stop requested, shutting down");
            controller.shutdown();
        }
    }

    Ok(())
}
