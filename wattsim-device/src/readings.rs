use std::{collections::BTreeMap, time::Instant};

use chrono::Utc;
use rand::Rng;
use wattsim_common::{
    DeviceHealth, DeviceIdentity, ElectricalMeasurements, EnvironmentalReadings, TelemetryRecord,
    ThreePhaseMeasurements,
};

/// Source of synthetic telemetry. The data publisher only ever calls
/// this; what a record contains is entirely up to the generator.
pub trait Readings: Send {
    fn generate(&mut self, interval_secs: u64) -> TelemetryRecord;
}

/// What kind of hardware this process pretends to be.
#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum Profile {
    /// Three-phase digital smart meter
    Meter,
    /// Low-voltage environmental sensor
    Environment,
}

impl Profile {
    pub fn device_name(&self) -> &'static str {
        match self {
            Profile::Meter => "Smart Meter",
            Profile::Environment => "Environmental Sensor",
        }
    }

    /// The capability bag announced on the `prop` channel.
    pub fn properties(&self) -> BTreeMap<compact_str::CompactString, serde_json::Value> {
        let pairs = match self {
            Profile::Meter => vec![
                ("device_type", serde_json::json!("digital_meter")),
                ("meter_type", serde_json::json!("digital")),
                ("power_phase", serde_json::json!("three")),
                ("connection_type", serde_json::json!("wifi")),
                ("firmware_version", serde_json::json!("2.1.3")),
            ],
            Profile::Environment => vec![
                ("device_type", serde_json::json!("environmental_sensor")),
                ("connection_type", serde_json::json!("wifi")),
                ("firmware_version", serde_json::json!("1.0.8")),
            ],
        };

        pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect()
    }

    pub fn readings(&self, identity: DeviceIdentity) -> Box<dyn Readings> {
        match self {
            Profile::Meter => Box::new(MeterReadings::new(identity)),
            Profile::Environment => Box::new(EnvironmentReadings::new(identity)),
        }
    }
}

/// Three-phase smart-meter profile: electrical measurements around a
/// 380 V industrial feed, with a lifetime energy counter that grows by
/// the integrated power of the previous tick.
pub struct MeterReadings {
    identity: DeviceIdentity,
    total_energy: f64,
    last_power: f64,
    sequence: u64,
    started: Instant,
}

impl MeterReadings {
    pub fn new(identity: DeviceIdentity) -> Self {
        let mut rng = rand::thread_rng();

        Self {
            identity,
            total_energy: rng.gen_range(800_000.0..900_000.0),
            last_power: 0.0,
            sequence: 0,
            started: Instant::now(),
        }
    }
}

impl Readings for MeterReadings {
    fn generate(&mut self, interval_secs: u64) -> TelemetryRecord {
        let mut rng = rand::thread_rng();

        let variation = rng.gen_range(0.9..1.1);

        let voltage = rng.gen_range(375.0..385.0) * variation;
        let current = rng.gen_range(40.0..50.0) * variation;
        let power_factor = rng.gen_range(0.85..0.95);
        let frequency = rng.gen_range(49.8..50.2);

        let apparent_power: f64 = 3.0 * voltage * current;
        let active_power = apparent_power * power_factor;
        let reactive_power =
            (apparent_power * apparent_power - active_power * active_power).sqrt();

        // integrate the previous tick's power into the lifetime counter
        if self.last_power > 0.0 {
            self.total_energy += self.last_power * interval_secs as f64 / 3600.0 / 1000.0;
        }
        self.last_power = active_power;
        self.sequence += 1;

        TelemetryRecord {
            device_id: self.identity.device_id.clone(),
            timestamp: Utc::now(),
            measurement_interval: interval_secs,
            sequence_number: self.sequence,
            network_status: "online".into(),
            electrical_measurements: Some(ElectricalMeasurements {
                voltage,
                current_amperage: current,
                power_factor,
                frequency,
                active_power,
                reactive_power,
                apparent_power,
                total_energy: self.total_energy,
                daily_energy: rng.gen_range(200.0..300.0),
            }),
            three_phase_measurements: Some(ThreePhaseMeasurements {
                voltage_phase_b: voltage * rng.gen_range(0.95..1.05),
                voltage_phase_c: voltage * rng.gen_range(0.95..1.05),
                current_phase_b: current * rng.gen_range(0.95..1.05),
                current_phase_c: current * rng.gen_range(0.95..1.05),
                active_power_phase_a: active_power / 3.0 * rng.gen_range(0.95..1.05),
                active_power_phase_b: active_power / 3.0 * rng.gen_range(0.95..1.05),
                active_power_phase_c: active_power / 3.0 * rng.gen_range(0.95..1.05),
            }),
            environmental_monitoring: Some(EnvironmentalReadings {
                temperature: rng.gen_range(25.0..40.0),
                supply_voltage: None,
                sensor_current: None,
            }),
            device_health: Some(DeviceHealth {
                uptime_hours: self.started.elapsed().as_secs() / 3600,
                data_collection_count: self.sequence,
                error_count_today: 0,
                last_error_message: None,
            }),
        }
    }
}

/// Environmental-sensor profile: temperature plus the sensor's own DC
/// supply readings.
pub struct EnvironmentReadings {
    identity: DeviceIdentity,
    sequence: u64,
    started: Instant,
}

impl EnvironmentReadings {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self { identity, sequence: 0, started: Instant::now() }
    }
}

impl Readings for EnvironmentReadings {
    fn generate(&mut self, interval_secs: u64) -> TelemetryRecord {
        let mut rng = rand::thread_rng();

        self.sequence += 1;

        TelemetryRecord {
            device_id: self.identity.device_id.clone(),
            timestamp: Utc::now(),
            measurement_interval: interval_secs,
            sequence_number: self.sequence,
            network_status: "online".into(),
            electrical_measurements: None,
            three_phase_measurements: None,
            environmental_monitoring: Some(EnvironmentalReadings {
                temperature: rng.gen_range(20.0..35.0),
                supply_voltage: Some(rng.gen_range(12.0..24.0)),
                sensor_current: Some(rng.gen_range(0.1..2.0)),
            }),
            device_health: Some(DeviceHealth {
                uptime_hours: self.started.elapsed().as_secs() / 3600,
                data_collection_count: self.sequence,
                error_count_today: 0,
                last_error_message: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_generates_electrical_sections() {
        let mut readings = MeterReadings::new(DeviceIdentity::new("DEV_001", "engineering"));

        let record = readings.generate(15);

        assert_eq!(record.measurement_interval, 15);
        assert_eq!(record.sequence_number, 1);

        let electrical = record.electrical_measurements.unwrap();
        assert!(electrical.voltage > 0.0);
        assert!(electrical.apparent_power >= electrical.active_power);
        assert!(record.three_phase_measurements.is_some());
    }

    #[test]
    fn meter_energy_counter_is_monotonic() {
        let mut readings = MeterReadings::new(DeviceIdentity::new("DEV_001", "engineering"));

        let mut previous = readings.generate(15).electrical_measurements.unwrap().total_energy;
        for expected_sequence in 2..=5 {
            let record = readings.generate(15);
            assert_eq!(record.sequence_number, expected_sequence);

            let total = record.electrical_measurements.unwrap().total_energy;
            assert!(total > previous);
            previous = total;
        }
    }

    #[test]
    fn environment_generates_environmental_only() {
        let mut readings =
            EnvironmentReadings::new(DeviceIdentity::new("ARC_ENV_STUDIO_01", "architecture"));

        let record = readings.generate(10);

        assert!(record.electrical_measurements.is_none());
        assert!(record.three_phase_measurements.is_none());

        let environmental = record.environmental_monitoring.unwrap();
        assert!((20.0..35.0).contains(&environmental.temperature));
        assert!(environmental.supply_voltage.is_some());
    }

    #[test]
    fn profile_properties_declare_a_device_type() {
        for profile in [Profile::Meter, Profile::Environment] {
            let properties = profile.properties();
            assert!(properties.contains_key("device_type"));
            assert!(properties.contains_key("firmware_version"));
        }
    }
}
