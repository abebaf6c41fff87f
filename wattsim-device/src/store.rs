use std::{
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use wattsim_common::{
    AssignedConfiguration, ConfigRecord, DeviceId, PropertyAnnouncement, SubmissionRecord,
    SubmissionStatus,
};

/// Durable per-device state: the submission record and the assigned
/// configuration, each a small JSON document in the state directory.
///
/// Loads treat a missing or malformed file as absent. Saves are atomic
/// (write-then-rename) and failures are logged and ignored; the device
/// keeps running on its in-memory state.
pub struct ConfigStore {
    device_id: DeviceId,
    submission_path: PathBuf,
    config_path: PathBuf,
    // serializes writers so concurrent saves cannot interleave
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn open(dir: impl AsRef<Path>, device_id: DeviceId) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            submission_path: dir.join(format!("{device_id}_prop.json")),
            config_path: dir.join(format!("{device_id}_config.json")),
            device_id,
            write_lock: Mutex::new(()),
        })
    }

    pub fn load_submission(&self) -> Option<SubmissionRecord> {
        read_json(&self.submission_path)
    }

    /// Persists the latest announcement, carrying the submission counter
    /// forward from any previous record.
    pub fn save_submission(&self, properties: &PropertyAnnouncement) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let submission_count = self
            .load_submission()
            .map(|record| record.submission_count)
            .unwrap_or(0)
            + 1;

        let record = SubmissionRecord {
            saved_timestamp: Utc::now(),
            device_id: self.device_id.clone(),
            status: SubmissionStatus::Pending,
            submission_count,
            status_updated_at: None,
            properties: properties.clone(),
        };

        if let Err(err) = write_json_atomic(&self.submission_path, &record) {
            tracing::warn!(
                "failed to save submission record {}: {err}",
                self.submission_path.display()
            );
        }
    }

    /// Rewrites the persisted submission with the given status. No-op
    /// when no record exists or it already carries that status.
    pub fn update_submission_status(&self, status: SubmissionStatus) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let Some(mut record) = self.load_submission() else {
            return;
        };

        if record.status == status {
            return;
        }

        record.status = status;
        record.status_updated_at = Some(Utc::now());

        if let Err(err) = write_json_atomic(&self.submission_path, &record) {
            tracing::warn!(
                "failed to update submission status in {}: {err}",
                self.submission_path.display()
            );
        }
    }

    pub fn load_configuration(&self) -> Option<ConfigRecord> {
        read_json(&self.config_path)
    }

    /// Persists an assigned configuration wholesale, replacing any
    /// previous record.
    pub fn save_configuration(&self, config: &AssignedConfiguration) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let record = ConfigRecord {
            saved_timestamp: Utc::now(),
            device_id: self.device_id.clone(),
            config: config.clone(),
        };

        if let Err(err) = write_json_atomic(&self.config_path, &record) {
            tracing::warn!(
                "failed to save configuration record {}: {err}",
                self.config_path.display()
            );
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!("failed to read {}: {err}", path.display());
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("ignoring malformed {}: {err}", path.display());
            None
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, record: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(record)?;

    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;
    use wattsim_common::DeviceSettings;

    use super::*;

    fn announcement(device_id: &str, interval: u64) -> PropertyAnnouncement {
        PropertyAnnouncement {
            device_id: DeviceId::from(device_id),
            device_name: "Engineering Lab Meter".into(),
            data_collection_interval: interval,
            status: "online".into(),
            timestamp: Utc::now(),
            device_prop: [("firmware_version".into(), serde_json::json!("2.1.3"))]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn submission_round_trip() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        let properties = announcement("DEV_001", 15);
        store.save_submission(&properties);

        let record = store.load_submission().unwrap();
        assert_eq!(record.device_id, DeviceId::from("DEV_001"));
        assert_eq!(record.status, SubmissionStatus::Pending);
        assert_eq!(record.submission_count, 1);
        assert_eq!(record.properties, properties);
    }

    #[test]
    fn submission_counter_survives_rewrites() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        let properties = announcement("DEV_001", 15);
        store.save_submission(&properties);
        store.save_submission(&properties);

        // A fresh store handle over the same directory sees the count.
        let reopened = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();
        reopened.save_submission(&properties);

        assert_eq!(reopened.load_submission().unwrap().submission_count, 3);
    }

    #[test]
    fn status_update_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        store.save_submission(&announcement("DEV_001", 15));

        store.update_submission_status(SubmissionStatus::Approved);
        let first = store.load_submission().unwrap();
        assert_eq!(first.status, SubmissionStatus::Approved);
        assert!(first.status_updated_at.is_some());

        store.update_submission_status(SubmissionStatus::Approved);
        let second = store.load_submission().unwrap();

        // No duplicate side effects: the record is untouched.
        assert_eq!(second, first);
    }

    #[test]
    fn status_update_without_record_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        store.update_submission_status(SubmissionStatus::Approved);
        assert!(store.load_submission().is_none());
    }

    #[test]
    fn configuration_round_trip() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        let config = AssignedConfiguration {
            device_configuration: Some(DeviceSettings { data_collection_interval: Some(20) }),
            ..Default::default()
        };
        store.save_configuration(&config);

        let record = store.load_configuration().unwrap();
        assert_eq!(record.device_id, DeviceId::from("DEV_001"));
        assert_eq!(record.config, config);
        assert_eq!(record.config.reporting_interval(), Some(20));
    }

    #[test]
    fn absent_files_load_as_none() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        assert!(store.load_submission().is_none());
        assert!(store.load_configuration().is_none());
    }

    #[test]
    fn malformed_files_load_as_none() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path(), DeviceId::from("DEV_001")).unwrap();

        fs::write(dir.path().join("DEV_001_prop.json"), b"{ not json").unwrap();
        fs::write(dir.path().join("DEV_001_config.json"), b"[]").unwrap();

        assert!(store.load_submission().is_none());
        assert!(store.load_configuration().is_none());
    }
}
