use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use wattsim::{BrokerConnection, Credentials};

mod report;

use self::report::{Stats, format_event};

/// Live view of fleet traffic on a wattsim broker.
#[derive(Parser)]
struct Args {
    /// MQTT broker address
    #[arg(long, default_value = "127.0.0.1:1883")]
    broker: String,

    /// Broker username
    #[arg(long)]
    username: Option<String>,

    /// Broker password
    #[arg(long)]
    password: Option<String>,

    /// Seconds between summary reports
    #[arg(long, default_value_t = 30)]
    summary_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wattsim::log::init();

    let args = Args::parse();

    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    };

    let conn = BrokerConnection::connect("wattsim-monitor", &args.broker, credentials.as_ref())
        .await
        .context("failed to connect to mqtt broker")?;

    for topic in [
        wattsim_common::Topic::PROPERTY_WILDCARD,
        wattsim_common::Topic::CONFIG_WILDCARD,
        wattsim_common::Topic::DATA_WILDCARD,
    ] {
        conn.subscribe(topic)
            .await
            .context("failed to subscribe to device topics")?;
    }

    let mut stats = Stats::default();
    let mut summary = tokio::time::interval(Duration::from_secs(args.summary_interval));
    summary.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            event = conn.recv() => match event {
                Ok(event) => {
                    stats.record(&event.topic);
                    println!("{}", format_event(&event));
                }
                Err(wattsim::Error::BadTopic(err)) => {
                    tracing::debug!("ignoring message on unrecognized topic: {err}");
                }
                Err(wattsim::Error::SerdeJson(err)) => {
                    tracing::warn!("discarding message with invalid json: {err}");
                }
                Err(err) => {
                    return Err(err).context("mqtt receive loop failed");
                }
            },
            _ = summary.tick() => {
                if stats.messages() > 0 {
                    println!("{}", stats.summary());
                }
            }
        }
    }
}
