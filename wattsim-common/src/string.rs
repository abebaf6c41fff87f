use core::{fmt::Display, ops::Deref};

use compact_str::{CompactString, ToCompactString};
use serde::{Deserialize, Serialize};

/// Opaque device identifier, fixed at process start.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(CompactString);

impl DeviceId {
    pub const WILDCARD: Self = DeviceId(CompactString::const_new("+"));

    pub const fn const_new(s: &'static str) -> Self {
        Self(CompactString::const_new(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl<T: AsRef<str>> From<T> for DeviceId {
    fn from(value: T) -> Self {
        DeviceId(value.as_ref().to_compact_string())
    }
}

impl Deref for DeviceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Faculty or site label a device reports under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Faculty(CompactString);

impl Faculty {
    pub const WILDCARD: Self = Faculty(CompactString::const_new("+"));

    pub const fn const_new(s: &'static str) -> Self {
        Self(CompactString::const_new(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl<T: AsRef<str>> From<T> for Faculty {
    fn from(value: T) -> Self {
        Faculty(value.as_ref().to_compact_string())
    }
}

impl Deref for Faculty {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.as_str()
    }
}

impl Display for Faculty {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}
