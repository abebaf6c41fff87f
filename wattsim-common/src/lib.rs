use core::{fmt::Display, str::FromStr};

mod records;
mod string;
mod telemetry;

pub use records::*;
pub use string::*;
pub use telemetry::*;

/// The three per-device channels of the registration handshake.
///
/// `Property` and `Data` are outbound from the device; `Config` is the
/// inbound channel the operator assigns a configuration on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Property { faculty: Faculty, device: DeviceId },
    Config { faculty: Faculty, device: DeviceId },
    Data { faculty: Faculty, device: DeviceId },
}

impl Topic {
    pub const PROPERTY_WILDCARD: Self = Self::Property {
        faculty: Faculty::WILDCARD,
        device: DeviceId::WILDCARD,
    };

    pub const CONFIG_WILDCARD: Self = Self::Config {
        faculty: Faculty::WILDCARD,
        device: DeviceId::WILDCARD,
    };

    pub const DATA_WILDCARD: Self = Self::Data {
        faculty: Faculty::WILDCARD,
        device: DeviceId::WILDCARD,
    };

    pub fn faculty(&self) -> &Faculty {
        match self {
            Topic::Property { faculty, .. }
            | Topic::Config { faculty, .. }
            | Topic::Data { faculty, .. } => faculty,
        }
    }

    pub fn device(&self) -> &DeviceId {
        match self {
            Topic::Property { device, .. }
            | Topic::Config { device, .. }
            | Topic::Data { device, .. } => device,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Topic::Property { faculty, device } => {
                write!(f, "devices/{}/{}/prop", faculty, device)
            }
            Topic::Config { faculty, device } => {
                write!(f, "devices/{}/{}/config", faculty, device)
            }
            Topic::Data { faculty, device } => {
                write!(f, "devices/{}/{}/data", faculty, device)
            }
        }
    }
}

impl FromStr for Topic {
    type Err = &'static str;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let mut parts = s.split('/');
        if parts.next() != Some("devices") {
            return Err("does not start with devices/");
        }

        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(faculty), Some(device), Some(leaf), None) => {
                let faculty = Faculty::from(faculty);
                let device = DeviceId::from(device);

                match leaf {
                    "prop" => Ok(Topic::Property { faculty, device }),
                    "config" => Ok(Topic::Config { faculty, device }),
                    "data" => Ok(Topic::Data { faculty, device }),
                    _ => Err("devices/{faculty}/{id}/{prop|config|data}"),
                }
            }
            (Some(_), Some(_), Some(_), Some(_)) => Err("devices/{faculty}/{id}/{leaf}/..."),
            _ => Err("devices/{faculty}/{id}/{leaf}"),
        }
    }
}
