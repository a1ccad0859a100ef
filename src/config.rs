//! Build-time capacities and runtime profiler configuration
//!
//! Table capacities size the fixed arrays embedded in every `Track` and
//! `Profiler`, so they are constants (and const generic defaults), not
//! runtime settings.

/// Maximum number of distinct blocks (call sites) per track
pub const BLOCK_CAPACITY: usize = 1024;

/// Maximum number of tracks per profiler
pub const TRACK_CAPACITY: usize = 4;

/// Byte capacity of a profiler name
pub const PROFILER_NAME_LEN: usize = 64;

/// Byte capacity of a track name
pub const TRACK_NAME_LEN: usize = 64;

/// Default busy-wait used to calibrate the CPU frequency estimate
pub const DEFAULT_CALIBRATION_MS: u64 = 100;

/// Runtime options of a profiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Read the OS page-fault counter on every block open/close
    pub track_page_faults: bool,
    /// Milliseconds spent calibrating the CPU frequency on first use
    pub calibration_ms: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        ProfilerConfig {
            track_page_faults: true,
            calibration_ms: DEFAULT_CALIBRATION_MS,
        }
    }
}

impl ProfilerConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable page-fault sampling
    pub fn with_page_faults(mut self, enabled: bool) -> Self {
        self.track_page_faults = enabled;
        self
    }

    /// Set the calibration busy-wait in milliseconds
    pub fn with_calibration_ms(mut self, ms: u64) -> Self {
        self.calibration_ms = ms;
        self
    }
}
