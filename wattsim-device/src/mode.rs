use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::{sync::Arc, time::Duration};

use wattsim_common::DeviceMode;

/// The single authoritative registration flag.
///
/// Read by the publisher tasks at each tick boundary, written by the
/// registration path. The transition is monotonic: once registered, a
/// process never reverts.
#[derive(Debug, Clone)]
pub struct SharedMode(Arc<AtomicBool>);

impl SharedMode {
    pub fn new(mode: DeviceMode) -> Self {
        Self(Arc::new(AtomicBool::new(matches!(mode, DeviceMode::Registered))))
    }

    pub fn get(&self) -> DeviceMode {
        if self.is_registered() { DeviceMode::Registered } else { DeviceMode::Unregistered }
    }

    pub fn is_registered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Flips to `Registered`; returns whether this call performed the
    /// transition. There is no way back.
    pub fn register(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Effective reporting interval in seconds, shared between the data
/// publisher (reader) and the registration path (writer).
#[derive(Debug, Clone)]
pub struct ReportingInterval(Arc<AtomicU64>);

impl ReportingInterval {
    pub fn new(secs: u64) -> Self {
        Self(Arc::new(AtomicU64::new(secs)))
    }

    pub fn secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs())
    }

    /// Overrides the interval; takes effect at the next tick boundary.
    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_monotonic() {
        let mode = SharedMode::new(DeviceMode::Unregistered);
        assert_eq!(mode.get(), DeviceMode::Unregistered);

        assert!(mode.register());
        assert_eq!(mode.get(), DeviceMode::Registered);

        // Re-registering is a no-op and reports that nothing changed.
        assert!(!mode.register());
        assert_eq!(mode.get(), DeviceMode::Registered);
    }

    #[test]
    fn mode_shares_state_between_clones() {
        let mode = SharedMode::new(DeviceMode::Unregistered);
        let reader = mode.clone();

        assert!(mode.register());
        assert!(reader.is_registered());
    }

    #[test]
    fn interval_override() {
        let interval = ReportingInterval::new(15);
        assert_eq!(interval.secs(), 15);

        interval.set(20);
        assert_eq!(interval.secs(), 20);
        assert_eq!(interval.duration(), Duration::from_secs(20));
    }
}
