use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::{DeviceId, Faculty, Topic};

/// Fixed identity of a device process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub faculty: Faculty,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<DeviceId>, faculty: impl Into<Faculty>) -> Self {
        Self { device_id: device_id.into(), faculty: faculty.into() }
    }

    pub fn property_topic(&self) -> Topic {
        Topic::Property { faculty: self.faculty.clone(), device: self.device_id.clone() }
    }

    pub fn config_topic(&self) -> Topic {
        Topic::Config { faculty: self.faculty.clone(), device: self.device_id.clone() }
    }

    pub fn data_topic(&self) -> Topic {
        Topic::Data { faculty: self.faculty.clone(), device: self.device_id.clone() }
    }
}

/// Review status of a property submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Self-declared announcement a device publishes on its `prop` channel
/// while waiting for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAnnouncement {
    pub device_id: DeviceId,
    pub device_name: CompactString,
    pub data_collection_interval: u64,
    pub status: CompactString,
    pub timestamp: DateTime<Utc>,
    /// Capability/metadata bag: firmware version, connection type, and
    /// whatever else the device knows about itself.
    #[serde(default)]
    pub device_prop: BTreeMap<CompactString, serde_json::Value>,
}

/// Persisted submission state, written next to the device on every
/// announcement so a restarted process knows whether it was approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub saved_timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub status: SubmissionStatus,
    pub submission_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_updated_at: Option<DateTime<Utc>>,
    pub properties: PropertyAnnouncement,
}

/// Operator-assigned configuration received on the `config` channel.
///
/// Replaced wholesale on every receipt, never merged. Unknown keys are
/// kept in `extra` so the persisted record round-trips the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignedConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_location: Option<AssignedLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_meter: Option<MeterSpecification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_configuration: Option<DeviceSettings>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AssignedConfiguration {
    /// Reporting-interval override in seconds, if the operator set one.
    pub fn reporting_interval(&self) -> Option<u64> {
        self.device_configuration
            .as_ref()
            .and_then(|settings| settings.data_collection_interval)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignedLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<CompactString>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterSpecification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_model: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_specifications: Option<PowerSpecifications>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerSpecifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_power: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated_voltage: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_collection_interval: Option<u64>,
}

/// Persisted configuration state (`<device>_config.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub saved_timestamp: DateTime<Utc>,
    pub device_id: DeviceId,
    pub config: AssignedConfiguration,
}

/// Registration phase of a running device. Monotonic: once
/// `Registered`, a process never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Unregistered,
    Registered,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_status_serde() {
        assert_eq!(
            serde_json::to_value(SubmissionStatus::Approved).unwrap(),
            serde_json::json!("approved")
        );

        assert_eq!(
            serde_json::from_value::<SubmissionStatus>(serde_json::json!("pending")).unwrap(),
            SubmissionStatus::Pending
        );
    }

    #[test]
    fn assigned_configuration_from_message() {
        let config: AssignedConfiguration = serde_json::from_value(serde_json::json!({
            "assigned_location": {
                "building": "Engineering Building A",
                "floor": "2",
                "room": "Lab 201",
            },
            "assigned_meter": {
                "meter_model": "SM-3500-3P",
                "power_specifications": { "rated_power": 30000.0 },
            },
            "device_configuration": { "data_collection_interval": 10 },
            "registration_status": "approved",
        }))
        .unwrap();

        assert_eq!(config.reporting_interval(), Some(10));
        assert_eq!(
            config.assigned_location.as_ref().unwrap().building.as_deref(),
            Some("Engineering Building A")
        );

        // Unknown keys survive a round trip.
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["registration_status"], serde_json::json!("approved"));
        assert_eq!(
            serde_json::from_value::<AssignedConfiguration>(value).unwrap(),
            config
        );
    }

    #[test]
    fn assigned_configuration_without_override() {
        let config: AssignedConfiguration = serde_json::from_value(serde_json::json!({
            "assigned_location": { "building": "Library Building" },
        }))
        .unwrap();

        assert_eq!(config.reporting_interval(), None);
    }

    #[test]
    fn non_object_payloads_are_rejected() {
        assert!(serde_json::from_value::<AssignedConfiguration>(serde_json::json!(42)).is_err());
        assert!(
            serde_json::from_value::<AssignedConfiguration>(serde_json::json!("approved")).is_err()
        );
        assert!(
            serde_json::from_value::<AssignedConfiguration>(serde_json::json!({
                "device_configuration": { "data_collection_interval": "soon" },
            }))
            .is_err()
        );
    }

    #[test]
    fn identity_topics() {
        let identity = DeviceIdentity::new("DEV_001", "engineering");

        assert_eq!(
            identity.property_topic().to_string(),
            "devices/engineering/DEV_001/prop"
        );
        assert_eq!(
            identity.config_topic().to_string(),
            "devices/engineering/DEV_001/config"
        );
        assert_eq!(
            identity.data_topic().to_string(),
            "devices/engineering/DEV_001/data"
        );
    }
}
