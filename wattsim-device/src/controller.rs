use std::{sync::Arc, time::Duration};

use wattsim::BrokerConnection;
use wattsim_common::{AssignedConfiguration, DeviceIdentity, DeviceMode, SubmissionStatus};

use crate::{
    listener::RegistrationListener,
    mode::{ReportingInterval, SharedMode},
    publisher::{DataPublisher, PropertyPublisher},
    readings::Profile,
    store::ConfigStore,
};

/// The handshake state shared between both publishers and the
/// registration path: persisted records, the mode flag, and the
/// effective reporting interval.
pub struct RegistrationState {
    store: Arc<ConfigStore>,
    pub mode: SharedMode,
    pub interval: ReportingInterval,
}

impl RegistrationState {
    /// Restores mode and interval from persisted state.
    ///
    /// A submission previously marked approved puts the device straight
    /// into `Registered`; a persisted configuration re-applies its
    /// interval override.
    pub fn restore(store: Arc<ConfigStore>, default_interval: u64) -> Self {
        let mode = match store.load_submission() {
            Some(record) if record.status == SubmissionStatus::Approved => {
                tracing::info!(
                    "submission #{} already approved; resuming as registered",
                    record.submission_count
                );
                DeviceMode::Registered
            }
            Some(record) => {
                tracing::info!(
                    "found submission #{} with status {:?}",
                    record.submission_count,
                    record.status
                );
                DeviceMode::Unregistered
            }
            None => DeviceMode::Unregistered,
        };

        let interval = ReportingInterval::new(default_interval);

        if let Some(record) = store.load_configuration() {
            tracing::info!("loaded configuration saved at {}", record.saved_timestamp);

            if let Some(secs) = record.config.reporting_interval() {
                interval.set(secs);
            }
        }

        Self { store, mode: SharedMode::new(mode), interval }
    }

    /// Parses and applies an inbound configuration payload. Returns
    /// whether this payload performed the registration transition.
    ///
    /// A payload that fails to parse leaves mode, interval and disk
    /// untouched.
    pub fn apply_payload(&self, payload: serde_json::Value) -> Result<bool, serde_json::Error> {
        let config: AssignedConfiguration = serde_json::from_value(payload)?;
        Ok(self.apply(&config))
    }

    /// The registration transition, in order: persist the configuration
    /// wholesale, mark the submission approved, flip the mode, apply
    /// the interval override. On a repeat receipt the middle two are
    /// no-ops and the message acts as a configuration update.
    pub fn apply(&self, config: &AssignedConfiguration) -> bool {
        self.store.save_configuration(config);
        self.store.update_submission_status(SubmissionStatus::Approved);

        let newly_registered = self.mode.register();

        if let Some(secs) = config.reporting_interval() {
            tracing::info!("reporting interval set to {secs}s");
            self.interval.set(secs);
        }

        newly_registered
    }
}

pub struct Options {
    pub profile: Profile,
    /// Seconds between property announcements while unregistered.
    pub announce_interval: u64,
    /// Default seconds between telemetry emissions, unless the assigned
    /// configuration overrides it.
    pub data_interval: u64,
}

/// Owns the device lifecycle: restores persisted state, decides the
/// starting phase, and drives the registration transition exactly once.
pub struct DeviceController {
    conn: Arc<BrokerConnection>,
    identity: DeviceIdentity,
    state: RegistrationState,
    prop: Arc<PropertyPublisher>,
    data: Arc<DataPublisher>,
}

impl DeviceController {
    pub fn new(
        conn: Arc<BrokerConnection>,
        store: Arc<ConfigStore>,
        identity: DeviceIdentity,
        options: Options,
    ) -> Self {
        let state = RegistrationState::restore(store.clone(), options.data_interval);

        let prop = Arc::new(PropertyPublisher::new(
            conn.clone(),
            store,
            identity.clone(),
            state.mode.clone(),
            Duration::from_secs(options.announce_interval),
            options.profile,
            state.interval.clone(),
        ));

        let data = Arc::new(DataPublisher::new(
            conn.clone(),
            identity.clone(),
            state.mode.clone(),
            state.interval.clone(),
            options.profile.readings(identity.clone()),
        ));

        Self { conn, identity, state, prop, data }
    }

    /// Runs the device until the transport drops the config channel.
    pub async fn run(&self) -> wattsim::Result<()> {
        let mut listener = RegistrationListener::subscribe(&self.conn, &self.identity).await?;

        tokio::spawn({
            let conn = self.conn.clone();

            async move {
                if let Err(err) = conn.handle().await {
                    tracing::error!("mqtt receive loop ended: {err}");
                }
            }
        });

        match self.state.mode.get() {
            DeviceMode::Registered => {
                tracing::info!("starting directly in data phase");
                self.data.start();
            }
            DeviceMode::Unregistered => {
                tracing::info!("starting in announcement phase, waiting for approval");
                self.prop.start();
            }
        }

        while let Some(payload) = listener.next().await {
            match self.state.apply_payload(payload) {
                Ok(true) => {
                    tracing::info!("device registered; switching to data phase");
                    self.prop.stop();
                    self.data.start();
                }
                Ok(false) => {
                    tracing::info!("configuration update applied");
                }
                Err(err) => {
                    tracing::warn!(
                        "discarding malformed payload on '{}': {err}",
                        self.identity.config_topic()
                    );
                }
            }
        }

        Ok(())
    }

    pub fn shutdown(&self) {
        self.prop.stop();
        self.data.stop();
    }
}
