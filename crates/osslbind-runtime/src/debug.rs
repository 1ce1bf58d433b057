//! Process-wide debug flag
//!
//! Controls how much detail the error channel renders and whether the native
//! allocator tracks allocations for leak reports. Reads and writes are plain
//! relaxed atomics: the flag is configuration, not synchronization.

use crate::native::MemoryDebug;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Debug/instrumentation toggle
#[derive(Debug, Default)]
pub struct DebugFlag {
    enabled: AtomicBool,
}

impl DebugFlag {
    /// Create a flag in the "off" state
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
        }
    }

    /// Current value
    pub fn get(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Set the flag, returning the value set
    ///
    /// Only a real transition touches the allocator: off→on enables leak
    /// checking, on→off disables it. Setting the current value again is a no-op.
    pub fn set(&self, value: bool, allocator: &dyn MemoryDebug) -> bool {
        let previous = self.enabled.swap(value, Ordering::Relaxed);
        if previous != value {
            allocator.set_leak_checking(value);
            if value {
                tracing::info!(target: "osslbind::debug", "debug mode is now on");
            } else {
                tracing::info!(target: "osslbind::debug", "debug mode is now off");
            }
        }
        value
    }

    /// Emit a diagnostic line, only while the flag is set
    pub fn diagnostic(&self, args: fmt::Arguments<'_>) {
        if self.get() {
            tracing::debug!(target: "osslbind::debug", "{}", args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingAllocator {
        calls: RefCell<Vec<bool>>,
    }

    impl MemoryDebug for RecordingAllocator {
        fn set_leak_checking(&self, enabled: bool) {
            self.calls.borrow_mut().push(enabled);
        }
    }

    #[test]
    fn test_repeated_set_enables_once() {
        let flag = DebugFlag::new();
        let allocator = RecordingAllocator::default();

        assert!(flag.set(true, &allocator));
        assert!(flag.set(true, &allocator));
        assert!(flag.get());
        assert_eq!(*allocator.calls.borrow(), vec![true]);
    }

    #[test]
    fn test_disable_without_enable_is_noop() {
        let flag = DebugFlag::new();
        let allocator = RecordingAllocator::default();

        assert!(!flag.set(false, &allocator));
        assert!(allocator.calls.borrow().is_empty());
    }

    #[test]
    fn test_round_trip_transitions() {
        let flag = DebugFlag::new();
        let allocator = RecordingAllocator::default();

        flag.set(true, &allocator);
        flag.set(false, &allocator);
        flag.set(false, &allocator);
        assert_eq!(*allocator.calls.borrow(), vec![true, false]);
        assert!(!flag.get());
    }
}
