use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// One telemetry emission on the `data` channel.
///
/// Only the sections a device actually measures are present: a smart
/// meter fills the electrical blocks, an environmental sensor the
/// environmental one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    /// Seconds between emissions at the time this record was produced.
    pub measurement_interval: u64,
    pub sequence_number: u64,
    pub network_status: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical_measurements: Option<ElectricalMeasurements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_phase_measurements: Option<ThreePhaseMeasurements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_monitoring: Option<EnvironmentalReadings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_health: Option<DeviceHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectricalMeasurements {
    pub voltage: f64,
    pub current_amperage: f64,
    pub power_factor: f64,
    pub frequency: f64,
    pub active_power: f64,
    pub reactive_power: f64,
    pub apparent_power: f64,
    /// Lifetime import in kWh; grows monotonically between emissions.
    pub total_energy: f64,
    pub daily_energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreePhaseMeasurements {
    pub voltage_phase_b: f64,
    pub voltage_phase_c: f64,
    pub current_phase_b: f64,
    pub current_phase_c: f64,
    pub active_power_phase_a: f64,
    pub active_power_phase_b: f64,
    pub active_power_phase_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalReadings {
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supply_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_current: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHealth {
    pub uptime_hours: u64,
    pub data_collection_count: u64,
    pub error_count_today: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<CompactString>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn telemetry_record_format() {
        let record = TelemetryRecord {
            device_id: DeviceId::from("ARC_ENV_STUDIO_01"),
            timestamp: Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap(),
            measurement_interval: 10,
            sequence_number: 7,
            network_status: "online".into(),
            electrical_measurements: None,
            three_phase_measurements: None,
            environmental_monitoring: Some(EnvironmentalReadings {
                temperature: 27.5,
                supply_voltage: Some(12.1),
                sensor_current: None,
            }),
            device_health: None,
        };

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["device_id"], serde_json::json!("ARC_ENV_STUDIO_01"));
        assert_eq!(value["measurement_interval"], serde_json::json!(10));
        assert_eq!(
            value["environmental_monitoring"]["temperature"],
            serde_json::json!(27.5)
        );

        // Absent sections are dropped, not serialized as null.
        assert!(value.get("electrical_measurements").is_none());
        assert!(value["environmental_monitoring"].get("sensor_current").is_none());

        assert_eq!(
            serde_json::from_value::<TelemetryRecord>(value).unwrap(),
            record
        );
    }
}
