use core::sync::atomic::{AtomicBool, Ordering};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use compact_str::CompactString;
use wattsim::{BrokerConnection, PublishOpts};
use wattsim_common::{DeviceIdentity, PropertyAnnouncement};

use crate::{
    mode::{ReportingInterval, SharedMode},
    readings::{Profile, Readings},
    store::ConfigStore,
};

/// Periodically announces the device's properties on its `prop`
/// channel while the device is unregistered.
///
/// Announcements are always persisted before they are sent.
pub struct PropertyPublisher {
    conn: Arc<BrokerConnection>,
    store: Arc<ConfigStore>,
    identity: DeviceIdentity,
    mode: SharedMode,
    period: Duration,
    device_name: CompactString,
    device_prop: BTreeMap<CompactString, serde_json::Value>,
    declared_interval: ReportingInterval,
    running: AtomicBool,
}

impl PropertyPublisher {
    pub fn new(
        conn: Arc<BrokerConnection>,
        store: Arc<ConfigStore>,
        identity: DeviceIdentity,
        mode: SharedMode,
        period: Duration,
        profile: Profile,
        declared_interval: ReportingInterval,
    ) -> Self {
        Self {
            conn,
            store,
            identity,
            mode,
            period,
            device_name: profile.device_name().into(),
            device_prop: profile.properties(),
            declared_interval,
            running: AtomicBool::new(false),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn({
            let publisher = self.clone();
            async move { publisher.run().await }
        });
    }

    /// Requests cessation before the next tick; an in-flight emission
    /// completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run(&self) {
        let topic = self.identity.property_topic();
        tracing::info!("announcing properties on '{topic}' every {:?}", self.period);

        while self.running.load(Ordering::SeqCst) && !self.mode.is_registered() {
            let announcement = self.announcement();

            self.store.save_submission(&announcement);

            if let Err(err) = self
                .conn
                .publish(topic.clone(), &announcement, PublishOpts::announcement())
                .await
            {
                tracing::error!("failed to publish property announcement: {err}");
            }

            tokio::time::sleep(self.period).await;
        }

        tracing::info!("property announcements stopped");
    }

    fn announcement(&self) -> PropertyAnnouncement {
        PropertyAnnouncement {
            device_id: self.identity.device_id.clone(),
            device_name: self.device_name.clone(),
            data_collection_interval: self.declared_interval.secs(),
            status: "online".into(),
            timestamp: Utc::now(),
            device_prop: self.device_prop.clone(),
        }
    }
}

/// Periodically emits synthetic telemetry on the device's `data`
/// channel while the device is registered.
///
/// The period is re-read at every tick boundary, so an operator
/// override takes effect on the following cycle.
pub struct DataPublisher {
    conn: Arc<BrokerConnection>,
    identity: DeviceIdentity,
    mode: SharedMode,
    interval: ReportingInterval,
    readings: Mutex<Box<dyn Readings>>,
    running: AtomicBool,
}

impl DataPublisher {
    pub fn new(
        conn: Arc<BrokerConnection>,
        identity: DeviceIdentity,
        mode: SharedMode,
        interval: ReportingInterval,
        readings: Box<dyn Readings>,
    ) -> Self {
        Self {
            conn,
            identity,
            mode,
            interval,
            readings: Mutex::new(readings),
            running: AtomicBool::new(false),
        }
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        tokio::spawn({
            let publisher = self.clone();
            async move { publisher.run().await }
        });
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn run(&self) {
        let topic = self.identity.data_topic();
        tracing::info!(
            "publishing telemetry on '{topic}' every {}s",
            self.interval.secs()
        );

        while self.running.load(Ordering::SeqCst) && self.mode.is_registered() {
            let period = self.interval.duration();

            let record = {
                let mut readings = self.readings.lock().unwrap_or_else(|e| e.into_inner());
                readings.generate(self.interval.secs())
            };

            if let Err(err) = self
                .conn
                .publish(topic.clone(), &record, PublishOpts::telemetry())
                .await
            {
                tracing::error!("failed to publish telemetry: {err}");
            }

            tokio::time::sleep(period).await;
        }

        tracing::info!("telemetry publishing stopped");
    }
}
