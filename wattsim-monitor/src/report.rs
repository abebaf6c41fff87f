use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use wattsim::PublishEvent;
use wattsim_common::{DeviceId, Faculty, PropertyAnnouncement, TelemetryRecord, Topic};

/// Running totals across everything the monitor has seen.
#[derive(Default)]
pub struct Stats {
    messages: u64,
    per_faculty: BTreeMap<Faculty, u64>,
    devices: BTreeSet<DeviceId>,
}

impl Stats {
    pub fn record(&mut self, topic: &Topic) {
        self.messages += 1;
        *self.per_faculty.entry(topic.faculty().clone()).or_default() += 1;
        self.devices.insert(topic.device().clone());
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "summary: {} messages from {} devices",
            self.messages,
            self.devices.len()
        );

        for (faculty, count) in &self.per_faculty {
            let share = if self.messages > 0 {
                *count as f64 / self.messages as f64 * 100.0
            } else {
                0.0
            };
            let _ = write!(out, "\n  {faculty}: {count} messages ({share:.1}%)");
        }

        if !self.devices.is_empty() {
            let devices: Vec<&str> = self.devices.iter().map(|d| d.as_str()).collect();
            let _ = write!(out, "\n  active: {}", devices.join(", "));
        }

        out
    }
}

/// One formatted line per inbound message, keyed on what the payload
/// turns out to be.
pub fn format_event(event: &PublishEvent) -> String {
    match &event.topic {
        Topic::Data { faculty, device } => {
            match serde_json::from_value::<TelemetryRecord>(event.payload.clone()) {
                Ok(record) => format_telemetry(faculty, device, &record),
                Err(_) => format!(
                    "{faculty}/{device} data: unrecognized payload (keys: {})",
                    object_keys(&event.payload)
                ),
            }
        }
        Topic::Property { faculty, device } => {
            match serde_json::from_value::<PropertyAnnouncement>(event.payload.clone()) {
                Ok(announcement) => format!(
                    "{faculty}/{device} announcement: '{}' interval={}s status={}",
                    announcement.device_name,
                    announcement.data_collection_interval,
                    announcement.status,
                ),
                Err(_) => format!(
                    "{faculty}/{device} announcement: unrecognized payload (keys: {})",
                    object_keys(&event.payload)
                ),
            }
        }
        Topic::Config { faculty, device } => {
            format!("{faculty}/{device} configuration assigned")
        }
    }
}

fn format_telemetry(faculty: &Faculty, device: &DeviceId, record: &TelemetryRecord) -> String {
    let time = record.timestamp.format("%H:%M:%S");

    if let Some(electrical) = &record.electrical_measurements {
        format!(
            "[{time}] {faculty}/{device} {:.1}V {:.1}A {:.1}kW pf={:.2} f={:.1}Hz",
            electrical.voltage,
            electrical.current_amperage,
            electrical.active_power / 1000.0,
            electrical.power_factor,
            electrical.frequency,
        )
    } else if let Some(environmental) = &record.environmental_monitoring {
        let mut line = format!(
            "[{time}] {faculty}/{device} {:.1}\u{b0}C",
            environmental.temperature
        );

        if let Some(voltage) = environmental.supply_voltage {
            let _ = write!(line, " supply={voltage:.1}V");
        }

        line
    } else {
        format!(
            "[{time}] {faculty}/{device} telemetry #{}",
            record.sequence_number
        )
    }
}

fn object_keys(payload: &serde_json::Value) -> String {
    match payload.as_object() {
        Some(map) => {
            let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            keys.join(", ")
        }
        None => "not an object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use wattsim_common::ElectricalMeasurements;

    use super::*;

    fn data_topic() -> Topic {
        Topic::Data {
            faculty: Faculty::from("engineering"),
            device: DeviceId::from("ENG_SM_LAB_01"),
        }
    }

    fn event(topic: Topic, payload: serde_json::Value) -> PublishEvent {
        PublishEvent { sub_id: None, topic, payload }
    }

    #[test]
    fn stats_track_faculties_and_devices() {
        let mut stats = Stats::default();

        stats.record(&data_topic());
        stats.record(&data_topic());
        stats.record(&Topic::Data {
            faculty: Faculty::from("architecture"),
            device: DeviceId::from("ARC_ENV_STUDIO_01"),
        });

        assert_eq!(stats.messages(), 3);

        let summary = stats.summary();
        assert!(summary.starts_with("summary: 3 messages from 2 devices"));
        assert!(summary.contains("engineering: 2 messages (66.7%)"));
        assert!(summary.contains("ARC_ENV_STUDIO_01"));
    }

    #[test]
    fn formats_electrical_telemetry() {
        let record = TelemetryRecord {
            device_id: DeviceId::from("ENG_SM_LAB_01"),
            timestamp: Utc.with_ymd_and_hms(2024, 4, 5, 12, 30, 0).unwrap(),
            measurement_interval: 15,
            sequence_number: 1,
            network_status: "online".into(),
            electrical_measurements: Some(ElectricalMeasurements {
                voltage: 380.2,
                current_amperage: 45.0,
                power_factor: 0.92,
                frequency: 50.0,
                active_power: 28_500.0,
                reactive_power: 11_000.0,
                apparent_power: 31_000.0,
                total_energy: 850_000.0,
                daily_energy: 250.0,
            }),
            three_phase_measurements: None,
            environmental_monitoring: None,
            device_health: None,
        };

        let line = format_event(&event(data_topic(), serde_json::to_value(&record).unwrap()));

        assert_eq!(
            line,
            "[12:30:00] engineering/ENG_SM_LAB_01 380.2V 45.0A 28.5kW pf=0.92 f=50.0Hz"
        );
    }

    #[test]
    fn formats_property_announcements() {
        let topic = Topic::Property {
            faculty: Faculty::from("engineering"),
            device: DeviceId::from("ENG_SM_LAB_01"),
        };

        let line = format_event(&event(topic, serde_json::json!({
            "device_id": "ENG_SM_LAB_01",
            "device_name": "Smart Meter",
            "data_collection_interval": 15,
            "status": "online",
            "timestamp": "2024-04-05T12:30:00Z",
        })));

        assert_eq!(
            line,
            "engineering/ENG_SM_LAB_01 announcement: 'Smart Meter' interval=15s status=online"
        );
    }

    #[test]
    fn unrecognized_payloads_fall_back_to_key_listing() {
        let line = format_event(&event(data_topic(), serde_json::json!({
            "power_quality": { "thd_voltage": 2.1 },
        })));

        assert!(line.contains("unrecognized payload"));
        assert!(line.contains("power_quality"));
    }
}
